//! Worker error types.

use thiserror::Error;

use vedit_models::{ClipId, JobStatus, TransitionError};

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Duplicate clip id in batch: {0}")]
    DuplicateClip(ClipId),

    #[error("Job not found: {0}")]
    JobNotFound(ClipId),

    #[error("Job {id} is {status}, expected {expected}")]
    InvalidJobState {
        id: ClipId,
        status: JobStatus,
        expected: JobStatus,
    },

    #[error("Invalid job transition: {0}")]
    Transition(#[from] TransitionError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Media error: {0}")]
    Media(#[from] vedit_media::MediaError),

    #[error("Segmentation error: {0}")]
    Segment(#[from] vedit_segment::SegmentError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn manifest(msg: impl Into<String>) -> Self {
        Self::Manifest(msg.into())
    }

    pub fn invalid_state(id: &ClipId, status: JobStatus, expected: JobStatus) -> Self {
        Self::InvalidJobState {
            id: id.clone(),
            status,
            expected,
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Media(e) => e.is_retryable(),
            WorkerError::Segment(e) => e.is_retryable(),
            WorkerError::Io(_) => true,
            _ => false,
        }
    }

    /// Errors caused by the request rather than the environment.
    pub fn is_caller_error(&self) -> bool {
        match self {
            WorkerError::DuplicateClip(_)
            | WorkerError::JobNotFound(_)
            | WorkerError::InvalidJobState { .. }
            | WorkerError::Manifest(_) => true,
            WorkerError::Media(e) => e.is_caller_error(),
            WorkerError::Segment(e) => e.is_caller_error(),
            _ => false,
        }
    }
}
