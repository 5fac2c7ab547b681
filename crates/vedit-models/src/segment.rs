//! Time windows within a source video.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Invalid segment bounds.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SegmentBoundsError {
    #[error("segment start {start} must be finite and non-negative")]
    InvalidStart { start: f64 },

    #[error("segment end {end} must be greater than start {start}")]
    EmptyWindow { start: f64, end: f64 },
}

/// A time window `[start_time, end_time)` in the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
    /// Confidence reported by a detector, when one chose this window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_confidence: Option<f64>,
}

impl Segment {
    /// Create a segment, computing its duration.
    pub fn new(start_time: f64, end_time: f64) -> Result<Self, SegmentBoundsError> {
        if !start_time.is_finite() || start_time < 0.0 {
            return Err(SegmentBoundsError::InvalidStart { start: start_time });
        }
        if !end_time.is_finite() || end_time <= start_time {
            return Err(SegmentBoundsError::EmptyWindow {
                start: start_time,
                end: end_time,
            });
        }
        Ok(Self {
            start_time,
            end_time,
            duration: end_time - start_time,
            source_confidence: None,
        })
    }

    /// Attach a detector confidence.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.source_confidence = Some(confidence);
        self
    }

    /// Clip the end to `source_duration`.
    ///
    /// Returns `None` when nothing of the window remains inside the source.
    pub fn clipped_to(&self, source_duration: f64) -> Option<Segment> {
        let end = self.end_time.min(source_duration);
        let mut clipped = Segment::new(self.start_time, end).ok()?;
        clipped.source_confidence = self.source_confidence;
        Some(clipped)
    }

    /// Whether the window lies within `[0, source_duration]`.
    pub fn fits_within(&self, source_duration: f64) -> bool {
        self.start_time >= 0.0 && self.start_time < self.end_time && self.end_time <= source_duration
    }
}

/// Trailing call-to-action card appended to a clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EndCard {
    pub text: String,
    pub background_color: String,
    pub text_color: String,
    /// Seconds, must be positive
    pub duration: f64,
}

impl EndCard {
    pub fn new(
        text: impl Into<String>,
        background_color: impl Into<String>,
        text_color: impl Into<String>,
        duration: f64,
    ) -> Self {
        Self {
            text: text.into(),
            background_color: background_color.into(),
            text_color: text_color.into(),
            duration,
        }
    }
}
