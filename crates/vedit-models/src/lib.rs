//! Shared data models for the VEdit pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Edit requests (trim, color, speed, overlays)
//! - Output formats and encoding configuration
//! - Segments, end cards and clips
//! - Export job state exposed to pollers

pub mod clip;
pub mod edit;
pub mod encoding;
pub mod format;
pub mod job;
pub mod segment;

// Re-export common types
pub use clip::{Clip, ClipId};
pub use edit::{EditSpec, ImageOverlay, MediaSource, TextOverlay};
pub use encoding::EncodingConfig;
pub use format::{aspect_label, FormatError, OutputFormat};
pub use job::{ExportJob, JobStatus, TransitionError};
pub use segment::{EndCard, Segment, SegmentBoundsError};
