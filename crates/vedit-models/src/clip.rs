//! Clips: segments bound to export parameters.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{EditSpec, EndCard, OutputFormat, Segment};

/// Clip identifier, unique within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ClipId(String);

impl ClipId {
    /// Random identifier.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClipId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ClipId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A segment ready for export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Clip {
    pub id: ClipId,
    pub segment: Segment,
    pub target_format: OutputFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_card: Option<EndCard>,
    /// Extra edits applied on top of the segment window (color, overlays)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edits: Option<EditSpec>,
}

impl Clip {
    pub fn new(id: impl Into<ClipId>, segment: Segment, target_format: OutputFormat) -> Self {
        Self {
            id: id.into(),
            segment,
            target_format,
            end_card: None,
            edits: None,
        }
    }

    pub fn with_end_card(mut self, end_card: EndCard) -> Self {
        self.end_card = Some(end_card);
        self
    }

    pub fn with_edits(mut self, edits: EditSpec) -> Self {
        self.edits = Some(edits);
        self
    }

    /// The edit spec that renders this clip: the segment window as a trim,
    /// with any extra edits layered on top (their own trim is ignored).
    pub fn edit_spec(&self) -> EditSpec {
        let window = EditSpec::new().with_trim(self.segment.start_time, self.segment.end_time);
        match &self.edits {
            Some(extra) => {
                let mut merged = window.overlay_with(extra);
                merged.trim_start = Some(self.segment.start_time);
                merged.trim_end = Some(self.segment.end_time);
                merged
            }
            None => window,
        }
    }

    /// Output file name for this clip.
    pub fn output_filename(&self) -> String {
        format!("clip_{}_{}.mp4", self.id, self.target_format.aspect_ratio_label.replace(':', "x"))
    }
}
