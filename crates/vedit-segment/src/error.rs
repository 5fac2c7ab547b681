//! Segmentation errors.

use thiserror::Error;
use vedit_detect_client::DetectError;

pub type SegmentResult<T> = Result<T, SegmentError>;

#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("source of {source_duration}s cannot hold {count} segments of {target_duration}s")]
    InsufficientSourceDuration {
        source_duration: f64,
        count: usize,
        target_duration: f64,
    },

    #[error("invalid segment constraints: {0}")]
    InvalidSegmentConstraints(String),

    #[error("presence detector unavailable: {0}")]
    DetectorUnavailable(String),

    #[error("presence detection failed: {0}")]
    Detection(#[from] DetectError),
}

impl SegmentError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidSegmentConstraints(message.into())
    }

    /// Input errors the caller has to fix.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            SegmentError::InsufficientSourceDuration { .. } | SegmentError::InvalidSegmentConstraints(_)
        )
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            SegmentError::DetectorUnavailable(_) => true,
            SegmentError::Detection(e) => e.is_retryable(),
            _ => false,
        }
    }
}
