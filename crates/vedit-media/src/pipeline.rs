//! Render pipeline: fetch inputs, compile edits, run the engine, publish.
//!
//! A [`Pipeline`] is built from an already-probed [`EngineCapability`], so
//! an unavailable engine is reported before any scratch resource is
//! allocated or any input fetched.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use serde::Serialize;
use tracing::{debug, info, warn};

use vedit_models::{EditSpec, EncodingConfig, EndCard, MediaSource, OutputFormat};

use crate::compiler::EditCompiler;
use crate::engine::{CodecEngine, EngineCapability, EngineInvocation};
use crate::error::{MediaError, MediaResult};
use crate::fetch::Fetcher;
use crate::filters::FilterProgram;
use crate::fs_utils::publish_artifact;
use crate::probe::VideoInfo;
use crate::progress::ProgressCallback;
use crate::scratch::{ResourcePurpose, ResourceScope, ScratchSpace};

/// Where the rendered artifact goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// Final location on disk
    File(PathBuf),
    /// Return the bytes to the caller
    Memory,
}

/// One render.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub source: MediaSource,
    pub edits: EditSpec,
    pub format: Option<OutputFormat>,
    pub end_card: Option<EndCard>,
    pub output: OutputTarget,
}

impl RenderRequest {
    pub fn new(source: MediaSource, edits: EditSpec, output: OutputTarget) -> Self {
        Self {
            source,
            edits,
            format: None,
            end_card: None,
            output,
        }
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_end_card(mut self, end_card: EndCard) -> Self {
        self.end_card = Some(end_card);
        self
    }
}

/// A rendered artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderOutput {
    File { path: PathBuf, size_bytes: u64 },
    Memory { bytes: Vec<u8> },
}

impl RenderOutput {
    /// Base64 of the in-memory artifact.
    pub fn to_base64(&self) -> Option<String> {
        match self {
            RenderOutput::Memory { bytes } => Some(base64::engine::general_purpose::STANDARD.encode(bytes)),
            RenderOutput::File { .. } => None,
        }
    }

    /// `file://` URL for files, `data:` URL for in-memory artifacts.
    pub fn to_url(&self) -> String {
        match self {
            RenderOutput::File { path, .. } => format!("file://{}", path.display()),
            RenderOutput::Memory { bytes } => format!(
                "data:video/mp4;base64,{}",
                base64::engine::general_purpose::STANDARD.encode(bytes)
            ),
        }
    }
}

/// Compile-and-execute pipeline over one engine.
#[derive(Clone)]
pub struct Pipeline {
    engine: Arc<dyn CodecEngine>,
    capability: EngineCapability,
    scratch: ScratchSpace,
    fetcher: Fetcher,
    encoding: EncodingConfig,
}

impl Pipeline {
    pub fn new(
        engine: Arc<dyn CodecEngine>,
        capability: EngineCapability,
        scratch: ScratchSpace,
        fetcher: Fetcher,
        encoding: EncodingConfig,
    ) -> Self {
        Self {
            engine,
            capability,
            scratch,
            fetcher,
            encoding,
        }
    }

    /// Probe `engine` and build a pipeline around the result.
    pub async fn probe(engine: Arc<dyn CodecEngine>, scratch: ScratchSpace) -> MediaResult<Self> {
        let capability = engine.probe().await;
        Ok(Self::new(engine, capability, scratch, Fetcher::new()?, EncodingConfig::default()))
    }

    pub fn with_encoding(mut self, encoding: EncodingConfig) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn capability(&self) -> &EngineCapability {
        &self.capability
    }

    pub fn scratch(&self) -> &ScratchSpace {
        &self.scratch
    }

    /// Render one request. Every scratch resource allocated on the way is
    /// released before this returns, whatever the outcome.
    pub async fn render(&self, request: &RenderRequest, progress: Option<ProgressCallback>) -> MediaResult<RenderOutput> {
        if let EngineCapability::Unavailable { reason } = &self.capability {
            return Err(MediaError::engine_unavailable(reason.clone()));
        }

        // Caller errors and missing video filters fail before anything is
        // fetched. Audio filters wait until inspection says there is audio.
        let preflight = EditCompiler::new()
            .without_audio()
            .compile(&request.edits, request.format.as_ref())?;
        self.check_filters(&preflight)?;

        let mut scope = self.scratch.scope();
        let result = self.render_in_scope(request, &mut scope, progress).await;
        scope.finish();
        result
    }

    fn check_filters(&self, program: &FilterProgram) -> MediaResult<()> {
        let required = program.required_filters();
        let missing = self.capability.missing_filters(&required);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(MediaError::engine_unavailable(format!(
                "engine lacks required filters: {}",
                missing.join(", ")
            )))
        }
    }

    async fn render_in_scope(
        &self,
        request: &RenderRequest,
        scope: &mut ResourceScope,
        progress: Option<ProgressCallback>,
    ) -> MediaResult<RenderOutput> {
        let primary = self
            .fetcher
            .materialize(&request.source, ResourcePurpose::Input, scope)
            .await?;

        let info = match self.engine.inspect(&primary).await {
            Ok(info) => Some(info),
            Err(e) => {
                warn!(source = %request.source.describe(), error = %e, "Source inspection failed, compiling without geometry");
                None
            }
        };

        let program = compiler_for(info.as_ref()).compile_with_end_card(
            &request.edits,
            request.format.as_ref(),
            request.end_card.as_ref(),
        )?;
        self.check_filters(&program)?;

        let mut inputs = vec![primary];
        if let Some(overlay) = &request.edits.image_overlay {
            let path = self
                .fetcher
                .materialize(&overlay.source, ResourcePurpose::Overlay, scope)
                .await?;
            inputs.push(path);
        }

        let output = scope.allocate(ResourcePurpose::Output, "mp4")?;
        let expected_duration = program
            .expected_duration(info.as_ref().map(|i| i.duration).filter(|d| *d > 0.0))
            .filter(|d| d.is_finite() && *d > 0.0)
            .map(Duration::from_secs_f64);

        let invocation = EngineInvocation {
            inputs,
            program,
            output: output.clone(),
            encoding: self.encoding.clone(),
            expected_duration,
        };
        debug!(
            filter_graph = invocation.program.filter_graph().as_deref().unwrap_or("<passthrough>"),
            "Compiled filter program"
        );

        self.engine.run(&invocation, progress).await?;

        match &request.output {
            OutputTarget::File(path) => {
                let size_bytes = publish_artifact(&output, path).await?;
                info!(path = %path.display(), size_bytes, "Published rendered artifact");
                Ok(RenderOutput::File {
                    path: path.clone(),
                    size_bytes,
                })
            }
            OutputTarget::Memory => {
                let bytes = tokio::fs::read(&output).await?;
                Ok(RenderOutput::Memory { bytes })
            }
        }
    }
}

fn compiler_for(info: Option<&VideoInfo>) -> EditCompiler {
    let mut compiler = EditCompiler::new();
    if let Some(info) = info {
        if let Some(geometry) = info.geometry() {
            compiler = compiler.with_source(geometry);
        }
        if info.duration > 0.0 {
            compiler = compiler.with_source_duration(info.duration);
        }
        if !info.has_audio {
            compiler = compiler.without_audio();
        }
    }
    compiler
}
