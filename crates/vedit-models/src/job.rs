//! Export job state for progress tracking and polling.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ClipId;

/// Export job processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for the worker
    #[default]
    Pending,
    /// Being rendered
    Processing,
    /// Rendered successfully
    Completed,
    /// Rendering failed; retriable
    Failed,
}

impl JobStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Allowed transitions. `Failed -> Pending` is the retry edge.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
                | (JobStatus::Failed, JobStatus::Pending)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rejected status change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid job transition {from} -> {to}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Execution state of one clip, as exposed to pollers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExportJob {
    /// Same as the clip id
    pub id: ClipId,
    pub status: JobStatus,
    /// 0-100
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Number of times processing started
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExportJob {
    /// New pending job for a clip.
    pub fn new(clip_id: ClipId) -> Self {
        let now = Utc::now();
        Self {
            id: clip_id,
            status: JobStatus::Pending,
            progress: 0.0,
            output_url: None,
            error: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn clip_id(&self) -> &ClipId {
        &self.id
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// `pending -> processing`.
    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.transition(JobStatus::Processing)?;
        self.attempts += 1;
        self.progress = 0.0;
        Ok(())
    }

    /// Record progress; ignored unless processing, never decreases.
    pub fn set_progress(&mut self, progress: f64) {
        if self.status != JobStatus::Processing || !progress.is_finite() {
            return;
        }
        let progress = progress.clamp(0.0, 100.0);
        if progress > self.progress {
            self.progress = progress;
            self.updated_at = Utc::now();
        }
    }

    /// `processing -> completed`.
    pub fn complete(&mut self, output_url: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(JobStatus::Completed)?;
        self.progress = 100.0;
        self.output_url = Some(output_url.into());
        self.error = None;
        Ok(())
    }

    /// `processing -> failed`.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    /// `failed -> pending`.
    pub fn reset_for_retry(&mut self) -> Result<(), TransitionError> {
        self.transition(JobStatus::Pending)?;
        self.progress = 0.0;
        self.error = None;
        Ok(())
    }

    /// Contribution to aggregate progress; failed jobs contribute nothing.
    pub fn effective_progress(&self) -> f64 {
        match self.status {
            JobStatus::Failed => 0.0,
            JobStatus::Completed => 100.0,
            _ => self.progress,
        }
    }
}
