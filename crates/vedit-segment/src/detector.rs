//! The object-presence detector seam.

use async_trait::async_trait;
use vedit_detect_client::{DetectClient, DetectError, DetectionRequest, DetectionResponse};

use crate::error::{SegmentError, SegmentResult};

/// Something that finds time ranges where objects are visible.
#[async_trait]
pub trait PresenceDetector: Send + Sync {
    async fn detect(&self, request: &DetectionRequest) -> SegmentResult<DetectionResponse>;
}

#[async_trait]
impl PresenceDetector for DetectClient {
    async fn detect(&self, request: &DetectionRequest) -> SegmentResult<DetectionResponse> {
        self.detect_segments(request).await.map_err(|e| match e {
            DetectError::ServiceUnavailable(reason) => SegmentError::DetectorUnavailable(reason),
            DetectError::Network(err) if err.is_connect() => SegmentError::DetectorUnavailable(err.to_string()),
            other => SegmentError::Detection(other),
        })
    }
}
