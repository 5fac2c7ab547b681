//! Worker metrics.
//!
//! Job outcome counters and render latency.

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Jobs rendered successfully.
    pub const JOBS_COMPLETED_TOTAL: &str = "vedit_jobs_completed_total";

    /// Jobs that ended in `failed`, by error kind.
    pub const JOBS_FAILED_TOTAL: &str = "vedit_jobs_failed_total";

    /// Failed jobs put back to pending.
    pub const JOBS_RETRIED_TOTAL: &str = "vedit_jobs_retried_total";

    /// Wall time of one job attempt in seconds, by outcome.
    pub const JOB_DURATION_SECONDS: &str = "vedit_job_duration_seconds";
}

pub fn record_job_completed(seconds: f64) {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "outcome" => "completed").record(seconds);
}

/// `kind` is `caller` for rejected requests, `engine` otherwise.
pub fn record_job_failed(kind: &'static str, seconds: f64) {
    counter!(names::JOBS_FAILED_TOTAL, "kind" => kind).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "outcome" => "failed").record(seconds);
}

pub fn record_job_retried() {
    counter!(names::JOBS_RETRIED_TOTAL).increment(1);
}
