//! Strategy and constraint types.

use serde::{Deserialize, Serialize};
use vedit_detect_client::SplitStrategy;

use crate::error::{SegmentError, SegmentResult};

/// How many windows to produce, and how long.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentConstraints {
    pub count: usize,
    /// Seconds per window (even and heuristic strategies)
    pub target_duration: f64,
}

impl SegmentConstraints {
    pub fn new(count: usize, target_duration: f64) -> Self {
        Self {
            count,
            target_duration,
        }
    }

    pub(crate) fn validate_count(&self) -> SegmentResult<()> {
        if self.count == 0 {
            return Err(SegmentError::invalid("count must be at least 1"));
        }
        Ok(())
    }

    pub(crate) fn validate(&self) -> SegmentResult<()> {
        self.validate_count()?;
        if !self.target_duration.is_finite() || self.target_duration <= 0.0 {
            return Err(SegmentError::invalid(format!(
                "target duration must be positive, got {}",
                self.target_duration
            )));
        }
        Ok(())
    }
}

/// What to look for when delegating to the detection service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceQuery {
    /// Where the service can read the source
    pub video_url: String,
    pub object_queries: Vec<String>,
    #[serde(default)]
    pub split_strategy: SplitStrategy,
    pub min_segment_duration: f64,
    pub max_segment_duration: f64,
    pub confidence_threshold: f64,
}

impl PresenceQuery {
    pub fn new(video_url: impl Into<String>, object_queries: Vec<String>) -> Self {
        Self {
            video_url: video_url.into(),
            object_queries,
            split_strategy: SplitStrategy::default(),
            min_segment_duration: 2.0,
            max_segment_duration: 30.0,
            confidence_threshold: 0.5,
        }
    }

    pub fn with_duration_bounds(mut self, min: f64, max: f64) -> Self {
        self.min_segment_duration = min;
        self.max_segment_duration = max;
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub(crate) fn validate(&self) -> SegmentResult<()> {
        if self.video_url.trim().is_empty() {
            return Err(SegmentError::invalid("video URL is empty"));
        }
        if self.object_queries.iter().all(|q| q.trim().is_empty()) {
            return Err(SegmentError::invalid("at least one object query is required"));
        }
        let (min, max) = (self.min_segment_duration, self.max_segment_duration);
        if !min.is_finite() || !max.is_finite() || min <= 0.0 || max <= 0.0 {
            return Err(SegmentError::invalid(format!(
                "segment duration bounds must be positive, got {}..{}",
                min, max
            )));
        }
        if min > max {
            return Err(SegmentError::invalid(format!(
                "minimum segment duration {} exceeds maximum {}",
                min, max
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(SegmentError::invalid(format!(
                "confidence threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        Ok(())
    }
}

/// Interchangeable segmentation strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SegmentStrategy {
    Even,
    /// Fixed anchors (exposed to users as the "ai" option)
    #[serde(alias = "ai")]
    Heuristic,
    ObjectPresence(PresenceQuery),
}

impl SegmentStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentStrategy::Even => "even",
            SegmentStrategy::Heuristic => "heuristic",
            SegmentStrategy::ObjectPresence(_) => "object_presence",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strategy_wire_format() {
        let strategy: SegmentStrategy = serde_json::from_value(json!({"type": "ai"})).unwrap();
        assert_eq!(strategy, SegmentStrategy::Heuristic);

        let strategy: SegmentStrategy = serde_json::from_value(json!({
            "type": "object_presence",
            "videoUrl": "https://cdn.example.com/v.mp4",
            "objectQueries": ["car"],
            "minSegmentDuration": 2.0,
            "maxSegmentDuration": 8.0,
            "confidenceThreshold": 0.7
        }))
        .unwrap();
        match strategy {
            SegmentStrategy::ObjectPresence(query) => {
                assert_eq!(query.split_strategy, SplitStrategy::Continuous);
                assert!(query.validate().is_ok());
            }
            other => panic!("unexpected strategy {:?}", other),
        }
    }

    #[test]
    fn test_query_validation() {
        let base = PresenceQuery::new("https://v", vec!["dog".to_string()]);
        assert!(base.validate().is_ok());
        assert!(base.clone().with_duration_bounds(10.0, 5.0).validate().is_err());
        assert!(base.clone().with_duration_bounds(0.0, 5.0).validate().is_err());
        assert!(base.clone().with_confidence_threshold(1.5).validate().is_err());
        assert!(PresenceQuery::new("https://v", vec![" ".to_string()]).validate().is_err());
    }

    #[test]
    fn test_constraint_validation() {
        assert!(SegmentConstraints::new(0, 5.0).validate().is_err());
        assert!(SegmentConstraints::new(3, 0.0).validate().is_err());
        assert!(SegmentConstraints::new(3, f64::NAN).validate().is_err());
        assert!(SegmentConstraints::new(3, 5.0).validate().is_ok());
    }
}
