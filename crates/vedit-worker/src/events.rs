//! Job lifecycle events.
//!
//! The orchestrator publishes every state change on a broadcast channel.
//! Pollers that only need the current state read `jobs()` instead.

use serde::Serialize;

use vedit_models::ClipId;

/// Default broadcast capacity; slow subscribers lag rather than block.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// One job state change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    Queued {
        #[serde(rename = "clipId")]
        clip_id: ClipId,
    },

    Started {
        #[serde(rename = "clipId")]
        clip_id: ClipId,
        attempt: u32,
    },

    /// Whole-percent progress step (0-100)
    Progress {
        #[serde(rename = "clipId")]
        clip_id: ClipId,
        value: u8,
    },

    Completed {
        #[serde(rename = "clipId")]
        clip_id: ClipId,
        #[serde(rename = "outputUrl")]
        output_url: String,
    },

    Failed {
        #[serde(rename = "clipId")]
        clip_id: ClipId,
        error: String,
        retryable: bool,
    },

    /// Pending job withdrawn
    Cancelled {
        #[serde(rename = "clipId")]
        clip_id: ClipId,
    },

    /// Failed job put back to pending
    Retried {
        #[serde(rename = "clipId")]
        clip_id: ClipId,
    },

    /// Completed job dropped from the batch
    Removed {
        #[serde(rename = "clipId")]
        clip_id: ClipId,
    },
}

impl JobEvent {
    pub fn clip_id(&self) -> &ClipId {
        match self {
            JobEvent::Queued { clip_id }
            | JobEvent::Started { clip_id, .. }
            | JobEvent::Progress { clip_id, .. }
            | JobEvent::Completed { clip_id, .. }
            | JobEvent::Failed { clip_id, .. }
            | JobEvent::Cancelled { clip_id }
            | JobEvent::Retried { clip_id }
            | JobEvent::Removed { clip_id } => clip_id,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobEvent::Queued { .. } => "queued",
            JobEvent::Started { .. } => "started",
            JobEvent::Progress { .. } => "progress",
            JobEvent::Completed { .. } => "completed",
            JobEvent::Failed { .. } => "failed",
            JobEvent::Cancelled { .. } => "cancelled",
            JobEvent::Retried { .. } => "retried",
            JobEvent::Removed { .. } => "removed",
        }
    }
}
