//! Detection service HTTP client.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use crate::error::{DetectError, DetectResult};
use crate::types::{DetectionRequest, DetectionResponse, HealthResponse};

/// Configuration for the detection client.
#[derive(Debug, Clone)]
pub struct DetectClientConfig {
    /// Base URL of the detection service
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Max retries
    pub max_retries: u32,
    /// First retry delay, doubled per attempt
    pub retry_base_delay: Duration,
}

impl Default for DetectClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8002".to_string(),
            timeout: Duration::from_secs(120),
            max_retries: 2,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

impl DetectClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("DETECT_SERVICE_URL").unwrap_or(defaults.base_url),
            timeout: std::env::var("DETECT_SERVICE_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_retries: std::env::var("DETECT_SERVICE_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            retry_base_delay: defaults.retry_base_delay,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_base_delay = base_delay;
        self
    }
}

/// Client for the detection service.
#[derive(Debug, Clone)]
pub struct DetectClient {
    http: Client,
    config: DetectClientConfig,
}

impl DetectClient {
    pub fn new(config: DetectClientConfig) -> DetectResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(DetectError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> DetectResult<Self> {
        Self::new(DetectClientConfig::from_env())
    }

    pub fn config(&self) -> &DetectClientConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Whether the service reports itself healthy. Transport errors count
    /// as unhealthy.
    pub async fn health_check(&self) -> DetectResult<bool> {
        let url = self.endpoint("health");

        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                let health: HealthResponse = response
                    .json()
                    .await
                    .map_err(|e| DetectError::InvalidResponse(e.to_string()))?;
                Ok(health.status == "healthy" || health.status == "ok")
            }
            Ok(response) => {
                warn!(status = %response.status(), "Detection service health check failed");
                Ok(false)
            }
            Err(e) => {
                warn!(error = %e, "Detection service health check error");
                Ok(false)
            }
        }
    }

    /// Ask the service for segments matching `request`.
    pub async fn detect_segments(&self, request: &DetectionRequest) -> DetectResult<DetectionResponse> {
        let url = self.endpoint("segments");
        debug!(url = %url, queries = ?request.object_queries, "Sending detection request");

        let response = self.with_retry(|| self.post_segments(&url, request)).await?;

        let detection: DetectionResponse = response
            .json()
            .await
            .map_err(|e| DetectError::InvalidResponse(e.to_string()))?;

        info!(segments = detection.segments.len(), "Detection service returned segments");
        Ok(detection)
    }

    async fn post_segments(&self, url: &str, request: &DetectionRequest) -> DetectResult<reqwest::Response> {
        let response = self
            .http
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            return Err(DetectError::ServiceUnavailable(body));
        }
        Err(DetectError::RequestFailed {
            status: status.as_u16(),
            body,
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> DetectError {
        if e.is_timeout() {
            DetectError::Timeout(self.config.timeout.as_secs())
        } else {
            DetectError::Network(e)
        }
    }

    /// Execute with retry and exponential backoff.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> DetectResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = DetectResult<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.config.retry_base_delay * 2u32.pow(attempt);
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Detection request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
