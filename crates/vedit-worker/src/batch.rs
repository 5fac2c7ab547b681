//! Batch export orchestration.
//!
//! Clips of one source are enqueued as [`ExportJob`]s and rendered one at a
//! time, in enqueue order, through a shared [`Pipeline`]. A failing job is
//! marked `failed` and the batch moves on; `retry_failed` puts it back in
//! the queue.
//!
//! State lives behind a `std::sync::Mutex` that is only held for
//! bookkeeping, never across a render.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::broadcast;
use tracing::{debug, info, Instrument};

use vedit_media::{EngineProgress, MediaError, OutputTarget, Pipeline, ProgressCallback, RenderRequest};
use vedit_models::{Clip, ClipId, ExportJob, JobStatus, MediaSource};

use crate::error::{WorkerError, WorkerResult};
use crate::events::{JobEvent, EVENT_CHANNEL_CAPACITY};
use crate::logging::JobLogger;
use crate::metrics;

/// Where rendered clips end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactDestination {
    /// Published as `<dir>/<clip output filename>`, exposed as `file://`
    Directory(PathBuf),
    /// Kept in memory, exposed as a base64 `data:` URL
    Memory,
}

impl ArtifactDestination {
    fn target_for(&self, clip: &Clip) -> OutputTarget {
        match self {
            ArtifactDestination::Directory(dir) => OutputTarget::File(dir.join(clip.output_filename())),
            ArtifactDestination::Memory => OutputTarget::Memory,
        }
    }
}

/// Outcome counts of one `run_until_idle` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub completed: usize,
    pub failed: usize,
}

struct JobEntry {
    clip: Clip,
    job: ExportJob,
}

#[derive(Default)]
struct BatchState {
    /// Enqueue order
    entries: Vec<JobEntry>,
}

impl BatchState {
    fn position(&self, id: &ClipId) -> Option<usize> {
        self.entries.iter().position(|e| &e.job.id == id)
    }

    fn job_mut(&mut self, id: &ClipId) -> Option<&mut ExportJob> {
        self.entries.iter_mut().find(|e| &e.job.id == id).map(|e| &mut e.job)
    }
}

/// Bookkeeping never panics while holding the lock, so a poisoned mutex
/// still holds consistent state.
fn lock_state(state: &Mutex<BatchState>) -> MutexGuard<'_, BatchState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs the clips of one source through the render pipeline.
pub struct BatchExportOrchestrator {
    pipeline: Pipeline,
    source: MediaSource,
    destination: ArtifactDestination,
    state: Arc<Mutex<BatchState>>,
    events: broadcast::Sender<JobEvent>,
}

impl BatchExportOrchestrator {
    pub fn new(pipeline: Pipeline, source: MediaSource, destination: ArtifactDestination) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            pipeline,
            source,
            destination,
            state: Arc::new(Mutex::new(BatchState::default())),
            events,
        }
    }

    pub fn source(&self) -> &MediaSource {
        &self.source
    }

    pub fn destination(&self) -> &ArtifactDestination {
        &self.destination
    }

    /// Receive every subsequent job event.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: JobEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Add clips as pending jobs.
    ///
    /// The whole call is rejected if any id repeats, within `clips` or
    /// against jobs already in the batch.
    pub fn enqueue(&self, clips: Vec<Clip>) -> WorkerResult<Vec<ClipId>> {
        let ids: Vec<ClipId> = {
            let mut state = lock_state(&self.state);

            let mut seen: HashSet<&ClipId> = state.entries.iter().map(|e| &e.job.id).collect();
            if let Some(dup) = clips.iter().find(|c| !seen.insert(&c.id)) {
                return Err(WorkerError::DuplicateClip(dup.id.clone()));
            }

            let ids = clips.iter().map(|c| c.id.clone()).collect();
            state.entries.extend(clips.into_iter().map(|clip| JobEntry {
                job: ExportJob::new(clip.id.clone()),
                clip,
            }));
            ids
        };

        info!(count = ids.len(), "Enqueued export jobs");
        for id in &ids {
            self.emit(JobEvent::Queued { clip_id: id.clone() });
        }
        Ok(ids)
    }

    /// Render the oldest pending job, if any, and return its final state.
    ///
    /// A render failure is recorded on the job, not returned: the batch
    /// continues with the next job.
    pub async fn tick(&self) -> WorkerResult<Option<ExportJob>> {
        let (clip, attempt) = {
            let mut state = lock_state(&self.state);
            let Some(entry) = state.entries.iter_mut().find(|e| e.job.status == JobStatus::Pending) else {
                return Ok(None);
            };
            entry.job.start()?;
            (entry.clip.clone(), entry.job.attempts)
        };
        self.emit(JobEvent::Started {
            clip_id: clip.id.clone(),
            attempt,
        });

        let logger = JobLogger::new(&clip.id, "export");
        logger.log_start(&format!(
            "{:.2}s-{:.2}s as {} (attempt {})",
            clip.segment.start_time, clip.segment.end_time, clip.target_format.aspect_ratio_label, attempt
        ));

        let started = Instant::now();
        let result = self.render_clip(&clip).instrument(logger.create_span()).await;
        let elapsed = started.elapsed().as_secs_f64();

        let job = {
            let mut state = lock_state(&self.state);
            let job = state
                .job_mut(&clip.id)
                .ok_or_else(|| WorkerError::JobNotFound(clip.id.clone()))?;
            match &result {
                Ok(url) => job.complete(url.clone())?,
                Err(e) => job.fail(e.summary())?,
            }
            job.clone()
        };

        match result {
            Ok(output_url) => {
                metrics::record_job_completed(elapsed);
                logger.log_completion(&format!("{:.1}s", elapsed));
                self.emit(JobEvent::Completed {
                    clip_id: clip.id,
                    output_url,
                });
            }
            Err(e) => {
                let kind = if e.is_caller_error() { "caller" } else { "engine" };
                metrics::record_job_failed(kind, elapsed);
                logger.log_error(&e.to_string(), e.diagnostics());
                self.emit(JobEvent::Failed {
                    clip_id: clip.id,
                    error: e.summary(),
                    retryable: e.is_retryable(),
                });
            }
        }

        Ok(Some(job))
    }

    async fn render_clip(&self, clip: &Clip) -> Result<String, MediaError> {
        let mut request = RenderRequest::new(self.source.clone(), clip.edit_spec(), self.destination.target_for(clip))
            .with_format(clip.target_format.clone());
        if let Some(end_card) = &clip.end_card {
            request = request.with_end_card(end_card.clone());
        }

        let output = self.pipeline.render(&request, Some(self.progress_callback(&clip.id))).await?;
        Ok(output.to_url())
    }

    /// Feeds engine progress into the job and emits whole-percent steps.
    fn progress_callback(&self, clip_id: &ClipId) -> ProgressCallback {
        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        let clip_id = clip_id.clone();
        let logger = JobLogger::new(&clip_id, "export");

        Box::new(move |progress: EngineProgress| {
            let step = {
                let mut state = lock_state(&state);
                let Some(job) = state.job_mut(&clip_id) else {
                    return;
                };
                let before = job.progress.floor();
                job.set_progress(progress.percent);
                let after = job.progress.floor();
                (after > before).then_some((before as u8, after as u8))
            };
            if let Some((before, value)) = step {
                if crosses_quarter(before, value) {
                    logger.log_progress(&format!("{}%", value));
                }
                let _ = events.send(JobEvent::Progress {
                    clip_id: clip_id.clone(),
                    value,
                });
            }
        })
    }

    /// Tick until no pending job is left.
    pub async fn run_until_idle(&self) -> WorkerResult<BatchSummary> {
        let mut summary = BatchSummary::default();
        while let Some(job) = self.tick().await? {
            match job.status {
                JobStatus::Completed => summary.completed += 1,
                JobStatus::Failed => summary.failed += 1,
                _ => {}
            }
        }
        debug!(completed = summary.completed, failed = summary.failed, "Batch idle");
        Ok(summary)
    }

    /// Withdraw a job that has not started yet.
    pub fn cancel(&self, id: &ClipId) -> WorkerResult<ExportJob> {
        let job = {
            let mut state = lock_state(&self.state);
            let index = state.position(id).ok_or_else(|| WorkerError::JobNotFound(id.clone()))?;
            let status = state.entries[index].job.status;
            if status != JobStatus::Pending {
                return Err(WorkerError::invalid_state(id, status, JobStatus::Pending));
            }
            state.entries.remove(index).job
        };

        info!(job_id = %id, "Cancelled pending export job");
        self.emit(JobEvent::Cancelled { clip_id: id.clone() });
        Ok(job)
    }

    /// Put a failed job back in the queue, keeping its place.
    pub fn retry_failed(&self, id: &ClipId) -> WorkerResult<ExportJob> {
        let job = {
            let mut state = lock_state(&self.state);
            let job = state.job_mut(id).ok_or_else(|| WorkerError::JobNotFound(id.clone()))?;
            if job.status != JobStatus::Failed {
                return Err(WorkerError::invalid_state(id, job.status, JobStatus::Failed));
            }
            job.reset_for_retry()?;
            job.clone()
        };

        metrics::record_job_retried();
        info!(job_id = %id, attempts = job.attempts, "Retrying failed export job");
        self.emit(JobEvent::Retried { clip_id: id.clone() });
        Ok(job)
    }

    /// Drop completed jobs from the batch and return them.
    pub fn remove_completed(&self) -> Vec<ExportJob> {
        let removed: Vec<ExportJob> = {
            let mut state = lock_state(&self.state);
            let (done, keep): (Vec<JobEntry>, Vec<JobEntry>) = std::mem::take(&mut state.entries)
                .into_iter()
                .partition(|e| e.job.status == JobStatus::Completed);
            state.entries = keep;
            done.into_iter().map(|e| e.job).collect()
        };

        for job in &removed {
            self.emit(JobEvent::Removed { clip_id: job.id.clone() });
        }
        removed
    }

    /// Snapshot of every job, in enqueue order.
    pub fn jobs(&self) -> Vec<ExportJob> {
        lock_state(&self.state).entries.iter().map(|e| e.job.clone()).collect()
    }

    pub fn job(&self, id: &ClipId) -> Option<ExportJob> {
        let state = lock_state(&self.state);
        state.position(id).map(|i| state.entries[i].job.clone())
    }

    pub fn pending_count(&self) -> usize {
        lock_state(&self.state)
            .entries
            .iter()
            .filter(|e| e.job.status == JobStatus::Pending)
            .count()
    }

    /// Equal-weight mean of job progress; failed jobs count as 0 and an
    /// empty batch reports 0.
    pub fn aggregate_progress(&self) -> f64 {
        let state = lock_state(&self.state);
        if state.entries.is_empty() {
            return 0.0;
        }
        let total: f64 = state.entries.iter().map(|e| e.job.effective_progress()).sum();
        total / state.entries.len() as f64
    }
}

/// Whether a progress step reaches the next 25% mark.
fn crosses_quarter(before: u8, after: u8) -> bool {
    after / 25 > before / 25
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;
    use tempfile::TempDir;
    use vedit_media::{CodecEngine, EngineCapability, EngineInvocation, Fetcher, MediaResult, ScratchSpace, VideoInfo};
    use vedit_models::{EncodingConfig, OutputFormat, Segment};

    /// Writes a fixed payload and reports 50% then 100% progress.
    struct HalfwayEngine;

    #[async_trait]
    impl CodecEngine for HalfwayEngine {
        async fn probe(&self) -> EngineCapability {
            EngineCapability::available("test", ["scale", "pad", "setsar", "setpts", "atempo", "eq", "crop"])
        }

        async fn inspect(&self, _path: &Path) -> MediaResult<VideoInfo> {
            Ok(VideoInfo {
                duration: 60.0,
                width: 1920,
                height: 1080,
                fps: 30.0,
                codec: "h264".to_string(),
                has_audio: true,
            })
        }

        async fn run(&self, invocation: &EngineInvocation, progress: Option<ProgressCallback>) -> MediaResult<()> {
            if let Some(progress) = &progress {
                for percent in [50.0, 100.0] {
                    progress(EngineProgress {
                        percent,
                        ..Default::default()
                    });
                }
            }
            tokio::fs::write(&invocation.output, b"clip").await?;
            Ok(())
        }
    }

    async fn orchestrator(tmp: &TempDir) -> BatchExportOrchestrator {
        let source = tmp.path().join("source.mp4");
        tokio::fs::write(&source, b"source").await.unwrap();
        let pipeline = Pipeline::new(
            Arc::new(HalfwayEngine),
            HalfwayEngine.probe().await,
            ScratchSpace::new(tmp.path().join("scratch")),
            Fetcher::new().unwrap(),
            EncodingConfig::default(),
        );
        BatchExportOrchestrator::new(pipeline, MediaSource::path(source), ArtifactDestination::Memory)
    }

    fn clip(id: &str, start: f64) -> Clip {
        Clip::new(id, Segment::new(start, start + 5.0).unwrap(), OutputFormat::portrait())
    }

    #[test]
    fn test_progress_logged_at_quarter_marks() {
        assert!(crosses_quarter(24, 25));
        assert!(crosses_quarter(0, 50));
        assert!(crosses_quarter(99, 100));
        assert!(!crosses_quarter(25, 49));
        assert!(!crosses_quarter(0, 1));
    }

    #[tokio::test]
    async fn test_enqueue_rejects_duplicates() {
        let tmp = TempDir::new().unwrap();
        let batch = orchestrator(&tmp).await;

        batch.enqueue(vec![clip("a", 0.0)]).unwrap();
        let err = batch.enqueue(vec![clip("b", 5.0), clip("a", 10.0)]).unwrap_err();
        assert!(matches!(err, WorkerError::DuplicateClip(id) if id.as_str() == "a"));

        let err = batch.enqueue(vec![clip("c", 0.0), clip("c", 5.0)]).unwrap_err();
        assert!(matches!(err, WorkerError::DuplicateClip(_)));

        // Rejected calls add nothing
        assert_eq!(batch.jobs().len(), 1);
    }

    #[tokio::test]
    async fn test_tick_completes_with_data_url() {
        let tmp = TempDir::new().unwrap();
        let batch = orchestrator(&tmp).await;
        let mut events = batch.subscribe();
        batch.enqueue(vec![clip("a", 0.0)]).unwrap();

        let job = batch.tick().await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100.0);
        assert!(job.output_url.unwrap().starts_with("data:video/mp4;base64,"));
        assert!(batch.tick().await.unwrap().is_none());

        let mut kinds = Vec::new();
        while let Ok(event) = events.try_recv() {
            kinds.push(event.as_str());
        }
        assert_eq!(kinds, ["queued", "started", "progress", "progress", "completed"]);
    }

    #[tokio::test]
    async fn test_cancel_only_pending() {
        let tmp = TempDir::new().unwrap();
        let batch = orchestrator(&tmp).await;
        batch.enqueue(vec![clip("a", 0.0), clip("b", 5.0)]).unwrap();

        batch.tick().await.unwrap();
        let err = batch.cancel(&ClipId::from("a")).unwrap_err();
        assert!(matches!(err, WorkerError::InvalidJobState { status: JobStatus::Completed, .. }));

        let cancelled = batch.cancel(&ClipId::from("b")).unwrap();
        assert_eq!(cancelled.status, JobStatus::Pending);
        assert!(batch.job(&ClipId::from("b")).is_none());
        assert!(matches!(batch.cancel(&ClipId::from("zzz")), Err(WorkerError::JobNotFound(_))));
    }

    #[tokio::test]
    async fn test_remove_completed_keeps_others() {
        let tmp = TempDir::new().unwrap();
        let batch = orchestrator(&tmp).await;
        batch.enqueue(vec![clip("a", 0.0), clip("b", 5.0)]).unwrap();
        batch.tick().await.unwrap();

        let removed = batch.remove_completed();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id.as_str(), "a");

        let remaining = batch.jobs();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_retry_requires_failed() {
        let tmp = TempDir::new().unwrap();
        let batch = orchestrator(&tmp).await;
        batch.enqueue(vec![clip("a", 0.0)]).unwrap();

        let err = batch.retry_failed(&ClipId::from("a")).unwrap_err();
        assert!(matches!(
            err,
            WorkerError::InvalidJobState {
                status: JobStatus::Pending,
                expected: JobStatus::Failed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_aggregate_progress() {
        let tmp = TempDir::new().unwrap();
        let batch = orchestrator(&tmp).await;
        assert_eq!(batch.aggregate_progress(), 0.0);

        batch.enqueue(vec![clip("a", 0.0), clip("b", 5.0)]).unwrap();
        assert_eq!(batch.aggregate_progress(), 0.0);
        batch.tick().await.unwrap();
        assert_eq!(batch.aggregate_progress(), 50.0);
        assert_eq!(batch.pending_count(), 1);

        let summary = batch.run_until_idle().await.unwrap();
        assert_eq!(summary, BatchSummary { completed: 1, failed: 0 });
        assert_eq!(batch.aggregate_progress(), 100.0);
    }

    #[tokio::test]
    async fn test_directory_destination_uses_clip_filename() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("source.mp4");
        tokio::fs::write(&source, b"source").await.unwrap();
        let out_dir = tmp.path().join("exports");
        let pipeline = Pipeline::new(
            Arc::new(HalfwayEngine),
            HalfwayEngine.probe().await,
            ScratchSpace::new(tmp.path().join("scratch")),
            Fetcher::new().unwrap(),
            EncodingConfig::default(),
        );
        let batch = BatchExportOrchestrator::new(
            pipeline,
            MediaSource::path(source),
            ArtifactDestination::Directory(out_dir.clone()),
        );

        let c = clip("a", 0.0);
        let expected = out_dir.join(c.output_filename());
        batch.enqueue(vec![c]).unwrap();
        let job = batch.tick().await.unwrap().unwrap();

        assert!(expected.exists());
        assert!(job.output_url.unwrap().starts_with("file://"));
    }
}
