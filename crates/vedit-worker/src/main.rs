//! Batch export worker binary.

use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::sync::watch;
use tracing::{error, info, warn};

use vedit_detect_client::DetectClient;
use vedit_media::{FfmpegEngine, Pipeline, ScratchSpace};
use vedit_models::JobStatus;
use vedit_segment::SegmentationEngine;
use vedit_worker::{init_tracing, ArtifactDestination, BatchExportOrchestrator, BatchManifest, BatchWorker, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = WorkerConfig::load();
    init_tracing(config.log_format)?;

    info!("Starting vedit-worker");
    info!("Worker config: {:?}", config);

    let Some(manifest_path) = config.batch_manifest.clone() else {
        bail!("VEDIT_BATCH_MANIFEST is not set; nothing to export");
    };
    let manifest = BatchManifest::load(&manifest_path)
        .await
        .with_context(|| format!("loading manifest {}", manifest_path.display()))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut engine = FfmpegEngine::new()
        .with_timeout(config.engine_timeout_secs)
        .with_cancel(shutdown_rx.clone());
    if let Some(ffmpeg) = &config.ffmpeg_path {
        engine = engine.with_binary(ffmpeg);
    }

    let pipeline = Pipeline::probe(Arc::new(engine), ScratchSpace::new(&config.scratch_dir))
        .await?
        .with_encoding(config.encoding.clone());
    if !pipeline.capability().is_available() {
        error!(capability = ?pipeline.capability(), "Codec engine unavailable");
        bail!("codec engine unavailable");
    }

    let mut segmenter = SegmentationEngine::new();
    match DetectClient::from_env() {
        Ok(client) => segmenter = segmenter.with_detector(Arc::new(client)),
        Err(e) => warn!(error = %e, "Detection client unavailable, object-presence plans will fail"),
    }
    let clips = manifest.resolve_clips(&segmenter).await?;

    let orchestrator = Arc::new(BatchExportOrchestrator::new(
        pipeline,
        manifest.source.clone(),
        ArtifactDestination::Directory(config.output_dir.clone()),
    ));
    orchestrator.enqueue(clips)?;

    // Ctrl-c cancels the render in flight and stops the batch
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    let worker = BatchWorker::new(Arc::clone(&orchestrator), config.poll_interval, shutdown_rx).stop_when_idle();
    worker.run().await?;

    let jobs = orchestrator.jobs();
    let completed = jobs.iter().filter(|j| j.status == JobStatus::Completed).count();
    let failed = jobs.iter().filter(|j| j.status == JobStatus::Failed).count();
    info!(
        completed,
        failed,
        pending = orchestrator.pending_count(),
        progress = orchestrator.aggregate_progress(),
        "Worker shutdown complete"
    );

    if failed > 0 {
        bail!("{} of {} exports failed", failed, jobs.len());
    }
    Ok(())
}
