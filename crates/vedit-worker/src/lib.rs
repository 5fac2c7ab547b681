//! Batch export worker.
//!
//! This crate provides:
//! - The batch export orchestrator (per-job state, progress, retry)
//! - Job lifecycle events
//! - The background worker loop with graceful shutdown
//! - Batch manifests, optionally segmented into clips
//! - Worker configuration, logging and metrics

pub mod batch;
pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod logging;
pub mod manifest;
pub mod metrics;

pub use batch::{ArtifactDestination, BatchExportOrchestrator, BatchSummary};
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use events::JobEvent;
pub use executor::BatchWorker;
pub use logging::{init_tracing, JobLogger, LogFormat};
pub use manifest::{BatchManifest, SegmentationPlan};
