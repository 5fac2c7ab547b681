//! Client for the external object-presence detection service.
//!
//! The service receives a video URL and a set of object queries and answers
//! with candidate time ranges where those objects are visible. Confidence
//! thresholding and segment length bounds are the service's job; this crate
//! only builds requests, retries transient failures and decodes responses.

pub mod client;
pub mod error;
pub mod types;

pub use client::{DetectClient, DetectClientConfig};
pub use error::{DetectError, DetectResult};
pub use types::{DetectedSegment, DetectionRequest, DetectionResponse, HealthResponse, SplitStrategy};
