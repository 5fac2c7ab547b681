//! Edit compilation and FFmpeg execution.
//!
//! This crate provides:
//! - The edit compiler turning an `EditSpec` into an ordered `FilterProgram`
//! - A single serialization step from `FilterProgram` to FFmpeg arguments
//! - The `CodecEngine` trait and its FFmpeg CLI implementation
//!   (`-progress pipe:2` parsing, timeout, cancellation)
//! - Scratch resources with scoped, guaranteed cleanup
//! - The `Pipeline` tying fetch, compile, run and publish together

pub mod command;
pub mod compiler;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod filters;
pub mod fs_utils;
pub mod geometry;
pub mod metrics;
pub mod pipeline;
pub mod probe;
pub mod progress;
pub mod scratch;

pub use command::{FfmpegCommand, FfmpegRunner};
pub use compiler::{compile, compile_for_source, EditCompiler};
pub use engine::{CodecEngine, EngineCapability, EngineInvocation, FfmpegEngine};
pub use error::{CompileError, CompileResult, MediaError, MediaResult};
pub use fetch::Fetcher;
pub use filters::{FilterProgram, FilterStage, TrimWindow};
pub use geometry::SourceGeometry;
pub use pipeline::{OutputTarget, Pipeline, RenderOutput, RenderRequest};
pub use probe::{probe_video, VideoInfo};
pub use progress::{EngineProgress, ProgressCallback};
pub use scratch::{ResourcePurpose, ResourceScope, ScratchSpace, ScratchStats, TempResource};
