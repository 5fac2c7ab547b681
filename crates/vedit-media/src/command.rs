//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};
use crate::progress::{is_progress_line, EngineProgress, ProgressParser};

/// Upper bound on retained diagnostic text.
const MAX_DIAGNOSTIC_BYTES: usize = 64 * 1024;

/// One `-i` input with its input-side options.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandInput {
    pub path: PathBuf,
    /// Options placed before `-i` (seek, duration, loop)
    pub args: Vec<String>,
}

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    inputs: Vec<CommandInput>,
    output: PathBuf,
    output_args: Vec<String>,
    overwrite: bool,
    log_level: String,
}

impl FfmpegCommand {
    /// Create a command writing to `output`. Inputs are added in order;
    /// the first one is input 0.
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self {
            inputs: Vec::new(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Add an input without input-side options.
    pub fn input(self, path: impl AsRef<Path>) -> Self {
        self.input_with_args(path, Vec::<String>::new())
    }

    /// Add an input with input-side options.
    pub fn input_with_args<I, S>(mut self, path: impl AsRef<Path>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.push(CommandInput {
            path: path.as_ref().to_path_buf(),
            args: args.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn inputs(&self) -> &[CommandInput] {
        &self.inputs
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }
        args.push("-hide_banner".to_string());
        args.push("-nostdin".to_string());

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        // Progress blocks go to stderr alongside diagnostics
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());

        for input in &self.inputs {
            args.extend(input.args.iter().cloned());
            args.push("-i".to_string());
            args.push(input.path.to_string_lossy().to_string());
        }

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runner for FFmpeg commands with progress tracking, timeout and
/// cancellation.
pub struct FfmpegRunner {
    binary: PathBuf,
    cancel_rx: Option<watch::Receiver<bool>>,
    timeout_secs: Option<u64>,
    expected_duration: Option<Duration>,
}

impl FfmpegRunner {
    /// Create a runner for the given binary.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            cancel_rx: None,
            timeout_secs: None,
            expected_duration: None,
        }
    }

    /// Set cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Set timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Expected output duration, for progress percentages.
    pub fn with_expected_duration(mut self, duration: Option<Duration>) -> Self {
        self.expected_duration = duration;
        self
    }

    /// Run a command.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.run_with_progress(cmd, |_| {}).await
    }

    /// Run a command, reporting each progress block.
    ///
    /// On a non-zero exit the engine's diagnostic output is returned verbatim
    /// in [`MediaError::EngineFailed`].
    pub async fn run_with_progress<F>(&self, cmd: &FfmpegCommand, progress_callback: F) -> MediaResult<()>
    where
        F: Fn(EngineProgress) + Send + 'static,
    {
        let args = cmd.build_args();
        debug!(binary = %self.binary.display(), "Running: {}", args.join(" "));

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MediaError::engine_unavailable(format!("failed to spawn {}: {}", self.binary.display(), e)))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::engine_failed("stderr not captured", None, None))?;
        let mut reader = BufReader::new(stderr).lines();
        let expected = self.expected_duration;

        let stderr_handle = tokio::spawn(async move {
            let mut parser = ProgressParser::new(expected);
            let mut diagnostics = String::new();

            while let Ok(Some(line)) = reader.next_line().await {
                if is_progress_line(&line) {
                    if let Some(snapshot) = parser.feed(&line) {
                        progress_callback(snapshot);
                    }
                } else if diagnostics.len() < MAX_DIAGNOSTIC_BYTES {
                    diagnostics.push_str(&line);
                    diagnostics.push('\n');
                }
            }
            diagnostics
        });

        let result = self.wait_for_completion(&mut child).await;
        let diagnostics = stderr_handle.await.unwrap_or_default();

        match result? {
            Some(code) => Err(MediaError::engine_failed(
                format!("ffmpeg exited with status {}", code),
                (!diagnostics.trim().is_empty()).then_some(diagnostics),
                Some(code),
            )),
            None => Ok(()),
        }
    }

    /// Wait for the child; `Ok(Some(code))` on a non-zero exit.
    async fn wait_for_completion(&self, child: &mut Child) -> MediaResult<Option<i32>> {
        let mut cancel_rx = self.cancel_rx.clone();
        let timeout = async {
            match self.timeout_secs {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => std::future::pending().await,
            }
        };
        let cancelled = async {
            match cancel_rx.as_mut() {
                Some(rx) => {
                    while !*rx.borrow() {
                        if rx.changed().await.is_err() {
                            std::future::pending::<()>().await;
                        }
                    }
                }
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            status = child.wait() => {
                let status = status?;
                if status.success() {
                    Ok(None)
                } else {
                    Ok(Some(status.code().unwrap_or(-1)))
                }
            }
            _ = timeout => {
                let secs = self.timeout_secs.unwrap_or_default();
                warn!("ffmpeg timed out after {} seconds, killing process", secs);
                let _ = child.kill().await;
                Err(MediaError::Timeout(secs))
            }
            _ = cancelled => {
                info!("ffmpeg cancelled, killing process");
                let _ = child.kill().await;
                Err(MediaError::Cancelled)
            }
        }
    }
}

/// Resolve the ffmpeg binary: explicit path first, then `PATH`.
pub fn resolve_ffmpeg(explicit: Option<&Path>) -> MediaResult<PathBuf> {
    resolve_binary("ffmpeg", explicit)
}

/// Resolve the ffprobe binary next to ffmpeg, or on `PATH`.
pub fn resolve_ffprobe(ffmpeg: Option<&Path>) -> MediaResult<PathBuf> {
    if let Some(dir) = ffmpeg.and_then(Path::parent) {
        let sibling = dir.join("ffprobe");
        if sibling.is_file() {
            return Ok(sibling);
        }
    }
    resolve_binary("ffprobe", None)
}

fn resolve_binary(name: &str, explicit: Option<&Path>) -> MediaResult<PathBuf> {
    match explicit {
        Some(path) if path.is_file() => Ok(path.to_path_buf()),
        Some(path) => Err(MediaError::engine_unavailable(format!(
            "{} not found at {}",
            name,
            path.display()
        ))),
        None => which::which(name).map_err(|_| MediaError::engine_unavailable(format!("{} not found on PATH", name))),
    }
}
