//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Result type for edit compilation.
pub type CompileResult<T> = Result<T, CompileError>;

/// Malformed or contradictory edit request. Caller error, never retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("speed must be a positive finite number, got {0}")]
    InvalidSpeed(f64),

    #[error("trim end ({end}) must be greater than trim start ({start})")]
    InvalidTrimRange { start: f64, end: f64 },

    #[error("trim bound must be finite and non-negative, got {0}")]
    InvalidTrimBound(f64),

    #[error("{field} must be a finite number, got {value}")]
    InvalidColorValue { field: &'static str, value: f64 },

    #[error("text overlay content is empty")]
    EmptyText,

    #[error("text overlay font size must be positive")]
    InvalidFontSize,

    #[error("image overlay size must be positive, got {width}x{height}")]
    InvalidOverlaySize { width: u32, height: u32 },

    #[error("output format must have positive dimensions, got {width}x{height}")]
    InvalidOutputFormat { width: u32, height: u32 },

    #[error("source geometry must have positive dimensions, got {width}x{height}")]
    InvalidSourceGeometry { width: u32, height: u32 },

    #[error("end card duration must be positive, got {0}")]
    InvalidEndCardDuration(f64),

    #[error("end card needs a known content duration (trim window or source duration)")]
    EndCardNeedsDuration,
}

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Codec engine unavailable: {reason}")]
    EngineUnavailable { reason: String },

    #[error("Codec engine failed: {message}")]
    EngineFailed {
        message: String,
        /// Engine diagnostics, verbatim
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Fetch failed for {source_desc}: {message}")]
    FetchFailed { source_desc: String, message: String },

    #[error("Invalid edit: {0}")]
    Compile(#[from] CompileError),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),
}

impl MediaError {
    /// Create an engine-unavailable error.
    pub fn engine_unavailable(reason: impl Into<String>) -> Self {
        Self::EngineUnavailable {
            reason: reason.into(),
        }
    }

    /// Create an engine failure error.
    pub fn engine_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::EngineFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create a fetch failure error.
    pub fn fetch_failed(source_desc: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FetchFailed {
            source_desc: source_desc.into(),
            message: message.into(),
        }
    }

    /// Engine diagnostics, when the engine produced any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            MediaError::EngineFailed { stderr, .. } | MediaError::FfprobeFailed { stderr, .. } => {
                stderr.as_deref()
            }
            _ => None,
        }
    }

    /// Caller errors that must not be retried automatically.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, MediaError::Compile(_))
    }

    /// Check if the error may go away on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MediaError::EngineFailed { .. }
                | MediaError::FetchFailed { .. }
                | MediaError::Timeout(_)
                | MediaError::Io(_)
        )
    }

    /// One-line message for job status surfaces, including the last
    /// diagnostic line when present.
    pub fn summary(&self) -> String {
        match self.diagnostics().and_then(|d| d.lines().rev().find(|l| !l.trim().is_empty())) {
            Some(last) => format!("{}: {}", self, last.trim()),
            None => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostics_kept_verbatim() {
        let stderr = "frame=1\n[Parsed_eq_0] Invalid argument\n".to_string();
        let err = MediaError::engine_failed("exit 1", Some(stderr.clone()), Some(1));
        assert_eq!(err.diagnostics(), Some(stderr.as_str()));
        assert_eq!(err.summary(), "Codec engine failed: exit 1: [Parsed_eq_0] Invalid argument");
    }

    #[test]
    fn test_classification() {
        assert!(MediaError::from(CompileError::EmptyText).is_caller_error());
        assert!(!MediaError::from(CompileError::EmptyText).is_retryable());
        assert!(MediaError::fetch_failed("u", "503").is_retryable());
        assert!(!MediaError::engine_unavailable("missing").is_retryable());
    }
}
