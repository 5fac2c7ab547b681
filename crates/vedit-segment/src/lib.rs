//! Segmentation: which time ranges of a source become clips.
//!
//! Three interchangeable strategies:
//! - `Even`: evenly spaced windows covering the whole source
//! - `Heuristic`: fixed anchor timestamps, a deterministic stand-in for a
//!   content-aware picker
//! - `ObjectPresence`: delegated to an external detection service

pub mod detector;
pub mod engine;
pub mod error;
pub mod strategy;

pub use detector::PresenceDetector;
pub use engine::{SegmentationEngine, HEURISTIC_ANCHORS};
pub use error::{SegmentError, SegmentResult};
pub use strategy::{PresenceQuery, SegmentConstraints, SegmentStrategy};
