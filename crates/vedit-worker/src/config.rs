//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use vedit_models::EncodingConfig;

use crate::logging::LogFormat;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Root for scratch files; each render gets its own scope under it
    pub scratch_dir: PathBuf,
    /// Where finished artifacts are published
    pub output_dir: PathBuf,
    /// How often the worker checks for pending jobs
    pub poll_interval: Duration,
    /// Per-invocation engine timeout in seconds
    pub engine_timeout_secs: u64,
    /// Explicit ffmpeg binary; `PATH` lookup when unset
    pub ffmpeg_path: Option<PathBuf>,
    /// Batch manifest to enqueue at startup
    pub batch_manifest: Option<PathBuf>,
    /// x264 preset and CRF overrides on top of the encoding defaults
    pub encoding: EncodingConfig,
    pub log_format: LogFormat,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            scratch_dir: std::env::temp_dir().join("vedit-scratch"),
            output_dir: PathBuf::from("exports"),
            poll_interval: Duration::from_millis(1000),
            engine_timeout_secs: 3600, // 1 hour
            ffmpeg_path: None,
            batch_manifest: None,
            encoding: EncodingConfig::default(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            scratch_dir: std::env::var("VEDIT_SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.scratch_dir),
            output_dir: std::env::var("VEDIT_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            poll_interval: std::env::var("VEDIT_POLL_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            engine_timeout_secs: std::env::var("VEDIT_ENGINE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.engine_timeout_secs),
            ffmpeg_path: std::env::var("FFMPEG_PATH").ok().map(PathBuf::from),
            batch_manifest: std::env::var("VEDIT_BATCH_MANIFEST").ok().map(PathBuf::from),
            encoding: encoding_from(
                std::env::var("VEDIT_ENCODING_PRESET").ok(),
                std::env::var("VEDIT_ENCODING_CRF").ok().and_then(|s| s.parse().ok()),
            ),
            log_format: std::env::var("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.log_format),
        }
    }

    /// Load `.env` (if any) and read the environment.
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Self::from_env()
    }
}

fn encoding_from(preset: Option<String>, crf: Option<u8>) -> EncodingConfig {
    let mut encoding = EncodingConfig::default();
    if let Some(preset) = preset.filter(|p| !p.trim().is_empty()) {
        encoding = encoding.with_preset(preset.trim());
    }
    if let Some(crf) = crf.filter(|c| *c <= 51) {
        encoding = encoding.with_crf(crf);
    }
    encoding
}
