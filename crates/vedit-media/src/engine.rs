//! Codec engine abstraction and the FFmpeg implementation.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use vedit_models::EncodingConfig;

use crate::command::{resolve_ffmpeg, resolve_ffprobe, FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::filters::FilterProgram;
use crate::metrics;
use crate::probe::{probe_video, VideoInfo};
use crate::progress::ProgressCallback;

/// Result of probing the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EngineCapability {
    Available {
        version: String,
        filters: BTreeSet<String>,
    },
    Unavailable {
        reason: String,
    },
}

impl EngineCapability {
    /// Capability with the given filters, for engines that don't list them.
    pub fn available<I, S>(version: impl Into<String>, filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Available {
            version: version.into(),
            filters: filters.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, EngineCapability::Available { .. })
    }

    /// Required filters the engine does not provide. Empty when unavailable
    /// (the unavailability itself is the problem then).
    pub fn missing_filters<'a>(&self, required: &[&'a str]) -> Vec<&'a str> {
        match self {
            EngineCapability::Available { filters, .. } => required
                .iter()
                .copied()
                .filter(|f| !filters.contains(*f))
                .collect(),
            EngineCapability::Unavailable { .. } => Vec::new(),
        }
    }
}

/// One engine run: inputs, program, output and encoding.
#[derive(Debug, Clone)]
pub struct EngineInvocation {
    /// Input 0 is the primary video; the rest are overlay inputs
    pub inputs: Vec<PathBuf>,
    pub program: FilterProgram,
    pub output: PathBuf,
    pub encoding: EncodingConfig,
    /// Expected output duration, for progress percentages
    pub expected_duration: Option<Duration>,
}

impl EngineInvocation {
    /// Assemble the FFmpeg command line for this invocation.
    pub fn to_command(&self) -> FfmpegCommand {
        let mut cmd = FfmpegCommand::new(&self.output);
        for (index, input) in self.inputs.iter().enumerate() {
            cmd = if index == 0 {
                cmd.input_with_args(input, self.program.primary_input_args())
            } else {
                cmd.input(input)
            };
        }
        cmd.output_args(self.program.output_args())
            .output_args(self.encoding.to_ffmpeg_args())
    }
}

/// The external codec engine.
#[async_trait]
pub trait CodecEngine: Send + Sync {
    /// Report availability. Never errors: a missing binary is `Unavailable`.
    async fn probe(&self) -> EngineCapability;

    /// Read duration, geometry and streams of a media file.
    async fn inspect(&self, path: &Path) -> MediaResult<VideoInfo>;

    /// Execute one invocation. No retries.
    async fn run(&self, invocation: &EngineInvocation, progress: Option<ProgressCallback>) -> MediaResult<()>;
}

/// FFmpeg CLI engine.
#[derive(Debug, Clone, Default)]
pub struct FfmpegEngine {
    /// Explicit ffmpeg path; `PATH` lookup otherwise
    binary: Option<PathBuf>,
    timeout_secs: Option<u64>,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl FfmpegEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = Some(binary.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Kill running invocations when the channel flips to `true`.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    async fn capability(&self) -> MediaResult<EngineCapability> {
        let ffmpeg = resolve_ffmpeg(self.binary.as_deref())?;

        let version = Command::new(&ffmpeg)
            .args(["-hide_banner", "-version"])
            .output()
            .await?;
        if !version.status.success() {
            return Ok(EngineCapability::Unavailable {
                reason: format!("{} -version exited with {}", ffmpeg.display(), version.status),
            });
        }
        let version = parse_version(&String::from_utf8_lossy(&version.stdout));

        let filters = Command::new(&ffmpeg)
            .args(["-hide_banner", "-filters"])
            .output()
            .await?;
        let filters = parse_filters(&String::from_utf8_lossy(&filters.stdout));

        Ok(EngineCapability::Available { version, filters })
    }
}

#[async_trait]
impl CodecEngine for FfmpegEngine {
    async fn probe(&self) -> EngineCapability {
        match self.capability().await {
            Ok(capability) => {
                if let EngineCapability::Available { version, filters } = &capability {
                    info!(version = %version, filters = filters.len(), "Codec engine available");
                }
                capability
            }
            Err(e) => {
                warn!(error = %e, "Codec engine unavailable");
                EngineCapability::Unavailable { reason: e.to_string() }
            }
        }
    }

    async fn inspect(&self, path: &Path) -> MediaResult<VideoInfo> {
        let ffprobe = resolve_ffprobe(self.binary.as_deref())?;
        probe_video(&ffprobe, path).await
    }

    async fn run(&self, invocation: &EngineInvocation, progress: Option<ProgressCallback>) -> MediaResult<()> {
        let ffmpeg = resolve_ffmpeg(self.binary.as_deref())?;

        let mut runner = FfmpegRunner::new(ffmpeg).with_expected_duration(invocation.expected_duration);
        if let Some(secs) = self.timeout_secs {
            runner = runner.with_timeout(secs);
        }
        if let Some(rx) = &self.cancel_rx {
            runner = runner.with_cancel(rx.clone());
        }

        let cmd = invocation.to_command();
        debug!(
            inputs = invocation.inputs.len(),
            output = %invocation.output.display(),
            "Starting engine run"
        );

        let started = Instant::now();
        let result = match progress {
            Some(callback) => runner.run_with_progress(&cmd, callback).await,
            None => runner.run(&cmd).await,
        };
        let elapsed = started.elapsed().as_secs_f64();

        match &result {
            Ok(()) => {
                metrics::record_engine_run("success", elapsed);
                info!(elapsed_secs = elapsed, output = %invocation.output.display(), "Engine run completed");
            }
            Err(e) => {
                metrics::record_engine_run("failure", elapsed);
                warn!(elapsed_secs = elapsed, error = %e.summary(), "Engine run failed");
            }
        }
        result
    }
}

/// `ffmpeg version 6.1.1-3ubuntu5 Copyright ...` -> `6.1.1-3ubuntu5`
fn parse_version(stdout: &str) -> String {
    stdout
        .lines()
        .next()
        .and_then(|line| line.strip_prefix("ffmpeg version "))
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap_or("unknown")
        .to_string()
}

/// Filter names from `ffmpeg -filters`: rows look like
/// ` TSC eq                V->V       Adjust brightness...`.
fn parse_filters(stdout: &str) -> BTreeSet<String> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let _flags = parts.next()?;
            let name = parts.next()?;
            let io = parts.next()?;
            io.contains("->").then(|| name.to_string())
        })
        .collect()
}
