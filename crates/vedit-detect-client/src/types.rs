//! Detection service request/response types (camelCase on the wire).

use serde::{Deserialize, Serialize};

/// How the service turns presence runs into segments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitStrategy {
    /// One segment per contiguous presence run, bounded by min/max duration
    #[default]
    Continuous,
    /// Presence runs cut into `maxSegmentDuration` chunks
    Fixed,
}

/// Request for object-presence segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionRequest {
    pub video_url: String,
    pub object_queries: Vec<String>,
    pub split_strategy: SplitStrategy,
    pub min_segment_duration: f64,
    pub max_segment_duration: f64,
    /// 0.0..=1.0
    pub confidence_threshold: f64,
}

/// One candidate time range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedSegment {
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Response from the segments endpoint, in the service's order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResponse {
    pub segments: Vec<DetectedSegment>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: Option<String>,
}
