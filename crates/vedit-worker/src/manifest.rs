//! Batch manifests: a source plus the clips to export from it.
//!
//! Clips are either listed explicitly or generated by a segmentation plan.
//!
//! ```json
//! {
//!   "source": {"kind": "path", "value": "/media/talk.mp4"},
//!   "segmentation": {
//!     "strategy": {"type": "even"},
//!     "count": 5,
//!     "targetDuration": 7.0,
//!     "sourceDuration": 150.0
//!   }
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use vedit_models::{Clip, ClipId, EndCard, MediaSource, OutputFormat};
use vedit_segment::{SegmentConstraints, SegmentStrategy, SegmentationEngine};

use crate::error::{WorkerError, WorkerResult};

/// Generate clips by segmenting the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentationPlan {
    pub strategy: SegmentStrategy,
    pub count: usize,
    pub target_duration: f64,
    /// Seconds; the source is not inspected before segmenting
    pub source_duration: f64,
    #[serde(default = "OutputFormat::portrait")]
    pub format: OutputFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_card: Option<EndCard>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchManifest {
    pub source: MediaSource,
    #[serde(default)]
    pub clips: Vec<Clip>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segmentation: Option<SegmentationPlan>,
}

impl BatchManifest {
    /// Read a JSON manifest from disk.
    pub async fn load(path: impl AsRef<Path>) -> WorkerResult<Self> {
        let raw = tokio::fs::read(path.as_ref()).await?;
        let manifest: Self = serde_json::from_slice(&raw)?;
        if manifest.clips.is_empty() && manifest.segmentation.is_none() {
            return Err(WorkerError::manifest("manifest lists no clips and no segmentation plan"));
        }
        Ok(manifest)
    }

    /// Explicit clips followed by the generated ones (`seg-1`, `seg-2`, ...).
    pub async fn resolve_clips(&self, engine: &SegmentationEngine) -> WorkerResult<Vec<Clip>> {
        let mut clips = self.clips.clone();

        if let Some(plan) = &self.segmentation {
            let constraints = SegmentConstraints::new(plan.count, plan.target_duration);
            let segments = engine
                .segment(plan.source_duration, &plan.strategy, &constraints)
                .await?;
            info!(
                strategy = plan.strategy.as_str(),
                segments = segments.len(),
                "Generated clips from segmentation plan"
            );

            clips.extend(segments.into_iter().enumerate().map(|(i, segment)| {
                let clip = Clip::new(ClipId::from_string(format!("seg-{}", i + 1)), segment, plan.format.clone());
                match &plan.end_card {
                    Some(card) => clip.with_end_card(card.clone()),
                    None => clip,
                }
            }));
        }

        Ok(clips)
    }
}
