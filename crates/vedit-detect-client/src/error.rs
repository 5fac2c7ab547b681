//! Detection client error types.

use thiserror::Error;

pub type DetectResult<T> = Result<T, DetectError>;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("Detection service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Detection request failed with {status}: {body}")]
    RequestFailed { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DetectError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            DetectError::ServiceUnavailable(_) | DetectError::Timeout(_) | DetectError::Network(_) => true,
            DetectError::RequestFailed { status, .. } => *status >= 500,
            DetectError::InvalidResponse(_) | DetectError::Json(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(DetectError::ServiceUnavailable("down".into()).is_retryable());
        assert!(DetectError::Timeout(30).is_retryable());
        assert!(DetectError::RequestFailed {
            status: 502,
            body: String::new()
        }
        .is_retryable());
        assert!(!DetectError::RequestFailed {
            status: 422,
            body: "bad query".into()
        }
        .is_retryable());
        assert!(!DetectError::InvalidResponse("missing segments".into()).is_retryable());
    }
}
