//! Media metrics.
//!
//! - Scratch resource allocation/release counters
//! - Engine run latency histogram by outcome

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Scratch files handed out, by purpose.
    pub const TEMP_ALLOCATED_TOTAL: &str = "vedit_temp_resources_allocated_total";

    /// Scratch files released, by purpose.
    pub const TEMP_RELEASED_TOTAL: &str = "vedit_temp_resources_released_total";

    /// Engine run duration in seconds, by outcome.
    pub const ENGINE_DURATION_SECONDS: &str = "vedit_engine_duration_seconds";
}

pub fn record_allocated(purpose: &'static str) {
    counter!(names::TEMP_ALLOCATED_TOTAL, "purpose" => purpose).increment(1);
}

pub fn record_released(purpose: &'static str) {
    counter!(names::TEMP_RELEASED_TOTAL, "purpose" => purpose).increment(1);
}

/// Record one engine run.
pub fn record_engine_run(outcome: &'static str, seconds: f64) {
    histogram!(names::ENGINE_DURATION_SECONDS, "outcome" => outcome).record(seconds);
}
