//! Materialize media sources as local files.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use vedit_models::MediaSource;

use crate::error::{MediaError, MediaResult};
use crate::scratch::{ResourcePurpose, ResourceScope};

/// Default request timeout for remote sources.
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(300);

/// Turns [`MediaSource`]s into paths the engine can read.
#[derive(Debug, Clone)]
pub struct Fetcher {
    http: Client,
}

impl Fetcher {
    pub fn new() -> MediaResult<Self> {
        Self::with_timeout(DEFAULT_FETCH_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> MediaResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MediaError::fetch_failed("http client", e.to_string()))?;
        Ok(Self { http })
    }

    /// Return a local path for `source`.
    ///
    /// Local paths are used in place. Bytes and URLs are written to a
    /// scratch resource owned by `scope`, so they are cleaned up with it.
    pub async fn materialize(
        &self,
        source: &MediaSource,
        purpose: ResourcePurpose,
        scope: &mut ResourceScope,
    ) -> MediaResult<PathBuf> {
        match source {
            MediaSource::Path(path) => {
                if !path.exists() {
                    return Err(MediaError::FileNotFound(path.clone()));
                }
                Ok(path.clone())
            }
            MediaSource::Bytes(bytes) => {
                let path = scope.allocate(purpose, &extension_for(source, purpose))?;
                tokio::fs::write(&path, bytes).await?;
                debug!(path = %path.display(), bytes = bytes.len(), "Wrote in-memory source");
                Ok(path)
            }
            MediaSource::Url(url) => {
                let path = scope.allocate(purpose, &extension_for(source, purpose))?;
                let written = self.download(url, &path).await?;
                info!(url = %url, bytes = written, path = %path.display(), "Fetched remote source");
                Ok(path)
            }
        }
    }

    async fn download(&self, url: &str, path: &PathBuf) -> MediaResult<u64> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(MediaError::fetch_failed(url, "unsupported URL scheme"));
        }

        let mut response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| MediaError::fetch_failed(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::fetch_failed(url, format!("HTTP {}", status)));
        }

        let mut file = tokio::fs::File::create(path).await?;
        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| MediaError::fetch_failed(url, e.to_string()))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        if written == 0 {
            return Err(MediaError::fetch_failed(url, "empty response body"));
        }
        Ok(written)
    }
}

fn extension_for(source: &MediaSource, purpose: ResourcePurpose) -> String {
    source.extension_hint().unwrap_or_else(|| match purpose {
        ResourcePurpose::Overlay => "png".to_string(),
        _ => "mp4".to_string(),
    })
}
