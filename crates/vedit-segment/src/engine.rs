//! Segmentation engine.

use std::sync::Arc;

use tracing::{debug, info, warn};
use vedit_detect_client::DetectionRequest;
use vedit_models::Segment;

use crate::detector::PresenceDetector;
use crate::error::{SegmentError, SegmentResult};
use crate::strategy::{PresenceQuery, SegmentConstraints, SegmentStrategy};

/// Default anchors (seconds) for the heuristic strategy, ascending.
pub const HEURISTIC_ANCHORS: [f64; 8] = [5.0, 15.0, 30.0, 45.0, 60.0, 90.0, 120.0, 180.0];

/// Produces ordered, in-bounds segments for a source.
#[derive(Clone)]
pub struct SegmentationEngine {
    anchors: Vec<f64>,
    detector: Option<Arc<dyn PresenceDetector>>,
}

impl Default for SegmentationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentationEngine {
    pub fn new() -> Self {
        Self {
            anchors: HEURISTIC_ANCHORS.to_vec(),
            detector: None,
        }
    }

    /// Replace the heuristic anchors. Non-finite and negative values are
    /// dropped; the rest are sorted ascending.
    pub fn with_anchors(mut self, anchors: impl IntoIterator<Item = f64>) -> Self {
        let mut anchors: Vec<f64> = anchors.into_iter().filter(|a| a.is_finite() && *a >= 0.0).collect();
        anchors.sort_by(f64::total_cmp);
        anchors.dedup();
        self.anchors = anchors;
        self
    }

    pub fn with_detector(mut self, detector: Arc<dyn PresenceDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn anchors(&self) -> &[f64] {
        &self.anchors
    }

    /// Segment a source of `source_duration` seconds.
    ///
    /// Every returned segment satisfies `0 <= start < end <= source_duration`.
    pub async fn segment(
        &self,
        source_duration: f64,
        strategy: &SegmentStrategy,
        constraints: &SegmentConstraints,
    ) -> SegmentResult<Vec<Segment>> {
        if !source_duration.is_finite() || source_duration <= 0.0 {
            return Err(SegmentError::invalid(format!(
                "source duration must be positive, got {}",
                source_duration
            )));
        }

        let segments = match strategy {
            SegmentStrategy::Even => even(source_duration, constraints)?,
            SegmentStrategy::Heuristic => self.heuristic(source_duration, constraints)?,
            SegmentStrategy::ObjectPresence(query) => {
                self.object_presence(source_duration, query, constraints).await?
            }
        };

        info!(
            strategy = strategy.as_str(),
            source_duration,
            requested = constraints.count,
            produced = segments.len(),
            "Segmented source"
        );
        Ok(segments)
    }

    fn heuristic(&self, source_duration: f64, constraints: &SegmentConstraints) -> SegmentResult<Vec<Segment>> {
        constraints.validate()?;
        ensure_fits(source_duration, constraints)?;

        let t = constraints.target_duration;
        let segments = self
            .anchors
            .iter()
            .take(constraints.count)
            .filter_map(|&anchor| window(anchor, anchor + t, source_duration))
            .collect();
        Ok(segments)
    }

    async fn object_presence(
        &self,
        source_duration: f64,
        query: &PresenceQuery,
        constraints: &SegmentConstraints,
    ) -> SegmentResult<Vec<Segment>> {
        constraints.validate_count()?;
        query.validate()?;

        let detector = self
            .detector
            .as_ref()
            .ok_or_else(|| SegmentError::DetectorUnavailable("no presence detector configured".to_string()))?;

        let request = DetectionRequest {
            video_url: query.video_url.clone(),
            object_queries: query
                .object_queries
                .iter()
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty())
                .collect(),
            split_strategy: query.split_strategy,
            min_segment_duration: query.min_segment_duration,
            max_segment_duration: query.max_segment_duration,
            confidence_threshold: query.confidence_threshold,
        };
        debug!(queries = ?request.object_queries, "Delegating segmentation to presence detector");

        let response = detector.detect(&request).await?;
        let received = response.segments.len();

        let segments: Vec<Segment> = response
            .segments
            .into_iter()
            .filter_map(|candidate| {
                let segment = window(candidate.start_time, candidate.end_time, source_duration);
                if segment.is_none() {
                    warn!(
                        start = candidate.start_time,
                        end = candidate.end_time,
                        source_duration,
                        "Dropping detected segment outside the source"
                    );
                }
                segment.map(|s| match candidate.confidence {
                    Some(c) => s.with_confidence(c),
                    None => s,
                })
            })
            .take(constraints.count)
            .collect();

        debug!(received, kept = segments.len(), "Presence detection finished");
        Ok(segments)
    }
}

fn even(source_duration: f64, constraints: &SegmentConstraints) -> SegmentResult<Vec<Segment>> {
    constraints.validate()?;
    ensure_fits(source_duration, constraints)?;

    let t = constraints.target_duration;
    let interval = if constraints.count == 1 {
        0.0
    } else {
        (source_duration - t) / (constraints.count - 1) as f64
    };

    let segments = (0..constraints.count)
        .filter_map(|i| {
            let start = i as f64 * interval;
            window(start, start + t, source_duration)
        })
        .collect();
    Ok(segments)
}

fn ensure_fits(source_duration: f64, constraints: &SegmentConstraints) -> SegmentResult<()> {
    if constraints.count as f64 * constraints.target_duration > source_duration {
        return Err(SegmentError::InsufficientSourceDuration {
            source_duration,
            count: constraints.count,
            target_duration: constraints.target_duration,
        });
    }
    Ok(())
}

/// `[start, end)` clipped to the source; `None` when nothing remains.
fn window(start: f64, end: f64, source_duration: f64) -> Option<Segment> {
    Segment::new(start, end).ok()?.clipped_to(source_duration)
}
