//! Batch export against a scripted codec engine.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use vedit_media::{
    CodecEngine, EngineCapability, EngineInvocation, EngineProgress, Fetcher, MediaError, MediaResult, Pipeline,
    ProgressCallback, ScratchSpace, VideoInfo,
};
use vedit_models::{Clip, ClipId, EncodingConfig, EndCard, JobStatus, MediaSource, OutputFormat, Segment};
use vedit_worker::{ArtifactDestination, BatchExportOrchestrator, BatchSummary, JobEvent};

const STDERR: &str = "[h264 @ 0x55] error while decoding MB 12 7\nConversion failed!\n";

/// Succeeds unless the trim window starts at `fail_at`, which fails once.
struct ScriptedEngine {
    fail_at: Mutex<Option<f64>>,
    trims: Mutex<Vec<f64>>,
}

impl ScriptedEngine {
    fn failing_once_at(start: f64) -> Arc<Self> {
        Arc::new(Self {
            fail_at: Mutex::new(Some(start)),
            trims: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl CodecEngine for ScriptedEngine {
    async fn probe(&self) -> EngineCapability {
        EngineCapability::available(
            "scripted",
            ["apad", "crop", "drawtext", "eq", "pad", "scale", "setpts", "setsar", "tpad"],
        )
    }

    async fn inspect(&self, _path: &Path) -> MediaResult<VideoInfo> {
        Ok(VideoInfo {
            duration: 120.0,
            width: 1920,
            height: 1080,
            fps: 30.0,
            codec: "h264".to_string(),
            has_audio: true,
        })
    }

    async fn run(&self, invocation: &EngineInvocation, progress: Option<ProgressCallback>) -> MediaResult<()> {
        let start = invocation.program.trim.map(|t| t.start).unwrap_or_default();
        self.trims.lock().unwrap().push(start);

        if let Some(progress) = &progress {
            progress(EngineProgress {
                percent: 40.0,
                ..Default::default()
            });
        }
        tokio::fs::write(&invocation.output, b"partial").await?;

        let mut fail_at = self.fail_at.lock().unwrap();
        if *fail_at == Some(start) {
            *fail_at = None;
            return Err(MediaError::engine_failed(
                "ffmpeg exited with status 1",
                Some(STDERR.to_string()),
                Some(1),
            ));
        }
        Ok(())
    }
}

struct Fixture {
    tmp: TempDir,
    engine: Arc<ScriptedEngine>,
    scratch: ScratchSpace,
    batch: BatchExportOrchestrator,
}

async fn fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("keynote.mp4");
    tokio::fs::write(&source, b"source video").await.unwrap();

    let engine = ScriptedEngine::failing_once_at(10.0);
    let scratch = ScratchSpace::new(tmp.path().join("scratch"));
    let pipeline = Pipeline::new(
        engine.clone(),
        engine.probe().await,
        scratch.clone(),
        Fetcher::new().unwrap(),
        EncodingConfig::default(),
    );
    let batch = BatchExportOrchestrator::new(
        pipeline,
        MediaSource::path(source),
        ArtifactDestination::Directory(tmp.path().join("exports")),
    );
    Fixture {
        tmp,
        engine,
        scratch,
        batch,
    }
}

fn clips() -> Vec<Clip> {
    vec![
        Clip::new("intro", Segment::new(0.0, 5.0).unwrap(), OutputFormat::portrait()),
        Clip::new("demo", Segment::new(10.0, 15.0).unwrap(), OutputFormat::square()),
        Clip::new("outro", Segment::new(20.0, 25.0).unwrap(), OutputFormat::landscape())
            .with_end_card(EndCard::new("Subscribe", "black", "white", 2.0)),
    ]
}

#[tokio::test]
async fn test_middle_failure_does_not_stop_batch() {
    let f = fixture().await;
    f.batch.enqueue(clips()).unwrap();

    let summary = f.batch.run_until_idle().await.unwrap();
    assert_eq!(summary, BatchSummary { completed: 2, failed: 1 });

    let jobs = f.batch.jobs();
    let statuses: Vec<JobStatus> = jobs.iter().map(|j| j.status).collect();
    assert_eq!(statuses, [JobStatus::Completed, JobStatus::Failed, JobStatus::Completed]);

    // Jobs ran in enqueue order
    assert_eq!(*f.engine.trims.lock().unwrap(), [0.0, 10.0, 20.0]);

    let failed = &jobs[1];
    let error = failed.error.as_deref().unwrap();
    assert!(error.contains("Conversion failed!"), "error was {error}");
    assert!(failed.output_url.is_none());

    for job in [&jobs[0], &jobs[2]] {
        let url = job.output_url.as_deref().unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with(".mp4"));
    }
    assert!(f.tmp.path().join("exports").join("clip_intro_9x16.mp4").exists());

    // Two of three done, the failure counts as zero
    let progress = f.batch.aggregate_progress();
    assert!((progress - 200.0 / 3.0).abs() < 1e-9, "progress was {progress}");

    let stats = f.scratch.stats();
    assert!(stats.allocated >= 3);
    assert_eq!(stats.outstanding(), 0, "every scratch resource released");
}

#[tokio::test]
async fn test_retry_failed_job() {
    let f = fixture().await;
    f.batch.enqueue(clips()).unwrap();
    f.batch.run_until_idle().await.unwrap();

    let demo = ClipId::from("demo");
    let retried = f.batch.retry_failed(&demo).unwrap();
    assert_eq!(retried.status, JobStatus::Pending);
    assert_eq!(retried.progress, 0.0);
    assert!(retried.error.is_none());

    let job = f.batch.tick().await.unwrap().unwrap();
    assert_eq!(job.id, demo);
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.attempts, 2);
    assert_eq!(f.batch.aggregate_progress(), 100.0);

    // Completed jobs cannot be retried
    assert!(f.batch.retry_failed(&demo).is_err());
}

#[tokio::test]
async fn test_event_stream() {
    let f = fixture().await;
    let mut events = f.batch.subscribe();
    f.batch.enqueue(clips()).unwrap();
    f.batch.run_until_idle().await.unwrap();

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }

    let queued = received.iter().filter(|e| matches!(e, JobEvent::Queued { .. })).count();
    assert_eq!(queued, 3);

    let failed: Vec<&JobEvent> = received
        .iter()
        .filter(|e| matches!(e, JobEvent::Failed { .. }))
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].clip_id().as_str(), "demo");
    assert!(matches!(failed[0], JobEvent::Failed { retryable: true, .. }));

    let progress_steps = received
        .iter()
        .filter(|e| matches!(e, JobEvent::Progress { value: 40, .. }))
        .count();
    assert_eq!(progress_steps, 3);
}

#[tokio::test]
async fn test_cancel_pending_then_remove_completed() {
    let f = fixture().await;
    f.batch.enqueue(clips()).unwrap();

    f.batch.tick().await.unwrap();
    f.batch.cancel(&ClipId::from("outro")).unwrap();

    f.batch.run_until_idle().await.unwrap();
    let removed = f.batch.remove_completed();
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].id.as_str(), "intro");

    let remaining = f.batch.jobs();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].status, JobStatus::Failed);
    assert_eq!(f.batch.aggregate_progress(), 0.0);
}

