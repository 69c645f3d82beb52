//! Job controller lifecycle tests against the mock engine and probe.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use squeeze_core::testing::fixtures::{document_file, image_file, video_file};
use squeeze_core::testing::{MockDurationProbe, MockEngineFactory};
use squeeze_core::{
    create_notification_channel, ControllerError, ControllerSnapshot, CoreLocation,
    DurationProbe, EncodingProfile, EngineFactory, InputClassifier, JobController, JobOutcome,
    JobStatus, LoadState, Notification, NotificationEnvelope, ProbeError, StatusMessage,
    ValidationError,
};

const CORRELATION_ID: &str = "widget-1";

struct Harness {
    controller: Arc<JobController>,
    factory: Arc<MockEngineFactory>,
    probe: Arc<MockDurationProbe>,
    notifications: mpsc::Receiver<NotificationEnvelope>,
}

impl Harness {
    fn new() -> Self {
        Self::with_factory(MockEngineFactory::new())
    }

    fn with_factory(factory: MockEngineFactory) -> Self {
        let factory = Arc::new(factory);
        let probe = Arc::new(MockDurationProbe::new());
        let (notifier, notifications) = create_notification_channel(CORRELATION_ID, 64);

        let controller = Arc::new(JobController::new(
            CoreLocation::new("mock://core"),
            Arc::clone(&factory) as Arc<dyn EngineFactory>,
            InputClassifier::new(Arc::clone(&probe) as Arc<dyn DurationProbe>),
            notifier,
        ));

        Self {
            controller,
            factory,
            probe,
            notifications,
        }
    }

    async fn ready() -> Self {
        let harness = Self::new();
        harness.controller.reload().await.unwrap();
        harness
    }

    fn drain(&mut self) -> Vec<Notification> {
        let mut drained = Vec::new();
        while let Ok(envelope) = self.notifications.try_recv() {
            assert_eq!(envelope.correlation_id, CORRELATION_ID);
            drained.push(envelope.notification);
        }
        drained
    }

    fn spawn_submit(
        &self,
        file: squeeze_core::SourceFile,
    ) -> tokio::task::JoinHandle<Result<JobOutcome, ControllerError>> {
        let controller = Arc::clone(&self.controller);
        tokio::spawn(async move { controller.submit(file).await })
    }

    async fn wait_for(&self, predicate: impl FnMut(&ControllerSnapshot) -> bool) {
        let mut rx = self.controller.subscribe();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(predicate))
            .await
            .expect("timed out waiting for controller state")
            .expect("controller dropped");
    }
}

fn kinds(notifications: &[Notification]) -> Vec<&'static str> {
    notifications.iter().map(Notification::kind).collect()
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_image_is_forwarded_without_job() {
    let mut h = Harness::ready().await;

    let outcome = h.controller.submit(image_file("a.png")).await.unwrap();
    assert_eq!(outcome, JobOutcome::Forwarded);

    let notifications = h.drain();
    assert_eq!(kinds(&notifications), vec!["IMAGE_SELECTED"]);
    match &notifications[0] {
        Notification::ImageSelected { file, filename } => {
            assert_eq!(filename, "a.png");
            assert!(file.name.starts_with("widget-1-"));
            assert!(file.name.ends_with("-a.png"));
            assert_eq!(file.media_type, "image/png");
            assert_eq!(file.bytes.len() as u64, file.size_bytes);
        }
        other => panic!("unexpected notification: {:?}", other),
    }

    assert_eq!(h.probe.probe_count().await, 0);
    assert!(h.factory.latest().unwrap().executions().is_empty());
    assert_eq!(h.controller.snapshot().status, JobStatus::Idle);
    assert_eq!(h.factory.created_count(), 1);
}

#[tokio::test]
async fn test_short_video_is_compressed() {
    let mut h = Harness::ready().await;
    h.probe.set_duration("b.mp4", 30.0).await;

    let mut rx = h.controller.subscribe();
    let collector = tokio::spawn(async move {
        let mut progress = Vec::new();
        while rx.changed().await.is_ok() {
            let snapshot = rx.borrow_and_update().clone();
            match snapshot.status {
                JobStatus::Compressing | JobStatus::Succeeded => {
                    progress.push(snapshot.progress_percent)
                }
                JobStatus::Idle if !progress.is_empty() => break,
                _ => {}
            }
        }
        progress
    });

    let outcome = h.controller.submit(video_file("b.mp4", 1024)).await.unwrap();
    let stats = match outcome {
        JobOutcome::Compressed(stats) => stats,
        other => panic!("unexpected outcome: {:?}", other),
    };
    assert_eq!(stats.original_size, 1024);
    assert_eq!(stats.compressed_size, 256);
    assert_eq!(stats.compression_ratio, 75.0);
    assert!(stats.compression_time >= 0.0);

    let progress = tokio::time::timeout(Duration::from_secs(5), collector)
        .await
        .unwrap()
        .unwrap();
    assert!(!progress.is_empty());
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{:?}", progress);

    let engine = h.factory.engine(0).unwrap();
    assert_eq!(engine.inputs(), vec![("input.mp4".to_string(), 1024)]);
    let executions = engine.executions();
    assert_eq!(executions.len(), 1);
    assert_eq!(
        executions[0],
        EncodingProfile::Fast.arguments("input.mp4", "output.mp4")
    );

    let notifications = h.drain();
    assert_eq!(kinds(&notifications), vec!["VIDEO_COMPRESSED"]);
    match &notifications[0] {
        Notification::VideoCompressed {
            file,
            filename,
            stats: sent,
        } => {
            assert_eq!(filename, "b.mp4");
            assert!(file.name.starts_with("widget-1-"));
            assert!(file.name.ends_with("-compressed-video.mp4"));
            assert_eq!(file.media_type, "video/mp4");
            assert_eq!(file.bytes.len(), 256);
            assert_eq!(sent, &stats);
        }
        other => panic!("unexpected notification: {:?}", other),
    }

    // Engine discarded and reloaded after the terminal outcome
    assert_eq!(h.factory.created_count(), 2);
    assert!(engine.is_terminated());
    let snapshot = h.controller.snapshot();
    assert_eq!(snapshot.status, JobStatus::Idle);
    assert_eq!(snapshot.engine, LoadState::Ready);
    assert_eq!(snapshot.progress_percent, 0);
    assert_eq!(snapshot.last_stats, Some(stats));
    assert!(h
        .controller
        .logs()
        .iter()
        .any(|line| line.contains("out_time_fraction")));
}

#[tokio::test]
async fn test_quicktime_source_uses_quicktime_profile() {
    let h = Harness::ready().await;

    let outcome = h.controller.submit(video_file("clip.MOV", 512)).await.unwrap();
    assert!(matches!(outcome, JobOutcome::Compressed(_)));

    let engine = h.factory.engine(0).unwrap();
    assert_eq!(engine.inputs()[0].0, "input.mov");
    assert_eq!(
        engine.executions()[0],
        EncodingProfile::QuickTime.arguments("input.mov", "output.mp4")
    );
}

#[tokio::test]
async fn test_long_video_is_rejected_before_engine() {
    let mut h = Harness::ready().await;
    h.probe.set_duration("c.mov", 65.0).await;

    let outcome = h.controller.submit(video_file("c.mov", 2048)).await.unwrap();
    assert_eq!(
        outcome,
        JobOutcome::Rejected(ValidationError::DurationExceeded)
    );

    assert_eq!(kinds(&h.drain()), vec!["VIDEO_LENGTH_EXCEEDED"]);
    let engine = h.factory.latest().unwrap();
    assert!(engine.inputs().is_empty());
    assert!(engine.executions().is_empty());
    assert_eq!(h.factory.created_count(), 1);

    let snapshot = h.controller.snapshot();
    assert_eq!(snapshot.status, JobStatus::Idle);
    assert_eq!(snapshot.message, Some(StatusMessage::DurationExceeded));
}

#[tokio::test]
async fn test_cancel_mid_compression() {
    let mut h = Harness::new();
    h.factory.set_progress_steps(vec![0.1, 0.3]);
    h.factory.set_hang(true);
    h.controller.reload().await.unwrap();
    // Only the first engine instance hangs
    h.factory.set_hang(false);

    let job = h.spawn_submit(video_file("d.mp4", 1024));
    h.wait_for(|s| s.status == JobStatus::Compressing && s.progress_percent >= 30)
        .await;

    assert!(h.controller.cancel().await);
    let outcome = job.await.unwrap().unwrap();
    assert_eq!(outcome, JobOutcome::Cancelled);

    assert_eq!(kinds(&h.drain()), vec!["VIDEO_COMPRESSED_CANCEL"]);
    assert!(h.factory.engine(0).unwrap().is_terminated());
    assert_eq!(h.factory.created_count(), 2);

    let snapshot = h.controller.snapshot();
    assert_eq!(snapshot.status, JobStatus::Idle);
    assert_eq!(snapshot.engine, LoadState::Ready);
    assert_eq!(snapshot.progress_percent, 0);
    assert_eq!(snapshot.message, Some(StatusMessage::Cancelled));

    // A new job is accepted afterwards
    let outcome = h.controller.submit(video_file("d2.mp4", 1024)).await.unwrap();
    assert!(matches!(outcome, JobOutcome::Compressed(_)));
    assert_eq!(kinds(&h.drain()), vec!["VIDEO_COMPRESSED"]);

    // The cancelled name was never recorded
    let handled = h.controller.handled_files();
    assert_eq!(handled, vec!["d2.mp4".to_string()]);
}

#[tokio::test]
async fn test_load_failure_blocks_until_manual_reload() {
    let mut h = Harness::new();
    h.factory.set_load_failure(Some("core unreachable"));

    assert!(h.controller.reload().await.is_err());
    assert_eq!(h.controller.snapshot().engine, LoadState::Failed);

    for name in ["e1.mp4", "e2.mp4"] {
        let err = h.controller.submit(video_file(name, 64)).await.unwrap_err();
        assert!(matches!(
            err,
            ControllerError::EngineNotReady {
                state: LoadState::Failed
            }
        ));
    }
    assert_eq!(
        h.controller.snapshot().message,
        Some(StatusMessage::EngineLoadFailed)
    );
    assert!(h.drain().is_empty());

    h.factory.set_load_failure(None);
    h.controller.reload().await.unwrap();
    let snapshot = h.controller.snapshot();
    assert_eq!(snapshot.engine, LoadState::Ready);
    assert_eq!(snapshot.message, None);

    let outcome = h.controller.submit(video_file("e1.mp4", 64)).await.unwrap();
    assert!(matches!(outcome, JobOutcome::Compressed(_)));
}

// =============================================================================
// Properties
// =============================================================================

#[tokio::test]
async fn test_double_cancel_emits_one_notification() {
    let mut h = Harness::new();
    h.factory.set_hang(true);
    h.controller.reload().await.unwrap();
    h.factory.set_hang(false);

    let job = h.spawn_submit(video_file("f.mp4", 128));
    h.wait_for(|s| s.status == JobStatus::Compressing).await;

    let (first, second) = tokio::join!(h.controller.cancel(), h.controller.cancel());
    assert!(first ^ second);
    assert!(!h.controller.cancel().await);

    assert_eq!(job.await.unwrap().unwrap(), JobOutcome::Cancelled);
    assert_eq!(kinds(&h.drain()), vec!["VIDEO_COMPRESSED_CANCEL"]);
}

#[tokio::test]
async fn test_cancellation_always_wins_over_success() {
    for delay_ms in [0u64, 1, 3, 6, 10, 15, 25] {
        let mut h = Harness::ready().await;
        let name = format!("race-{}.mp4", delay_ms);

        let job = h.spawn_submit(video_file(&name, 256));
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        let cancelled = h.controller.cancel().await;
        let outcome = job.await.unwrap().unwrap();

        let notifications = h.drain();
        if cancelled {
            assert_eq!(outcome, JobOutcome::Cancelled, "delay {}ms", delay_ms);
            assert_eq!(kinds(&notifications), vec!["VIDEO_COMPRESSED_CANCEL"]);
        } else {
            assert!(matches!(outcome, JobOutcome::Compressed(_)));
            assert_eq!(kinds(&notifications), vec!["VIDEO_COMPRESSED"]);
        }

        h.wait_for(|s| s.status == JobStatus::Idle && s.engine == LoadState::Ready)
            .await;
    }
}

#[tokio::test]
async fn test_duration_boundary() {
    let mut h = Harness::ready().await;
    h.probe.set_duration("edge.mp4", 60.999).await;
    h.probe.set_duration("over.mp4", 61.0).await;

    let outcome = h.controller.submit(video_file("edge.mp4", 64)).await.unwrap();
    assert!(matches!(outcome, JobOutcome::Compressed(_)));

    let outcome = h.controller.submit(video_file("over.mp4", 64)).await.unwrap();
    assert_eq!(
        outcome,
        JobOutcome::Rejected(ValidationError::DurationExceeded)
    );
    assert_eq!(
        kinds(&h.drain()),
        vec!["VIDEO_COMPRESSED", "VIDEO_LENGTH_EXCEEDED"]
    );
}

#[tokio::test]
async fn test_stats_when_output_grows() {
    let h = Harness::ready().await;
    h.factory.set_output(Some(vec![1u8; 300]));
    h.controller.reload().await.unwrap();

    let outcome = h.controller.submit(video_file("tiny.mp4", 200)).await.unwrap();
    match outcome {
        JobOutcome::Compressed(stats) => {
            let expected = (200.0 - 300.0) / 200.0 * 100.0;
            assert_eq!(stats.compression_ratio, expected);
            assert!(stats.compression_time >= 0.0);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_duplicate_names_are_dropped() {
    let mut h = Harness::ready().await;

    assert_eq!(
        h.controller.submit(image_file("a.png")).await.unwrap(),
        JobOutcome::Forwarded
    );
    assert_eq!(
        h.controller.submit(image_file("a.png")).await.unwrap(),
        JobOutcome::Duplicate
    );

    let outcome = h.controller.submit(video_file("g.mp4", 64)).await.unwrap();
    assert!(matches!(outcome, JobOutcome::Compressed(_)));
    let probes = h.probe.probe_count().await;
    let created = h.factory.created_count();

    assert_eq!(
        h.controller.submit(video_file("g.mp4", 64)).await.unwrap(),
        JobOutcome::Duplicate
    );
    assert_eq!(h.probe.probe_count().await, probes);
    assert_eq!(h.factory.created_count(), created);

    assert_eq!(kinds(&h.drain()), vec!["IMAGE_SELECTED", "VIDEO_COMPRESSED"]);
}

#[tokio::test]
async fn test_submission_while_busy_is_dropped() {
    let mut h = Harness::new();
    h.factory.set_hang(true);
    h.controller.reload().await.unwrap();
    h.factory.set_hang(false);

    let job = h.spawn_submit(video_file("h.mp4", 64));
    h.wait_for(|s| s.status == JobStatus::Compressing).await;

    let err = h.controller.submit(video_file("h.mp4", 64)).await.unwrap_err();
    assert!(matches!(err, ControllerError::Busy { .. }));
    let err = h.controller.submit(image_file("i.png")).await.unwrap_err();
    assert!(matches!(
        err,
        ControllerError::Busy {
            status: JobStatus::Compressing
        }
    ));

    assert!(h.controller.cancel().await);
    assert_eq!(job.await.unwrap().unwrap(), JobOutcome::Cancelled);
    assert_eq!(kinds(&h.drain()), vec!["VIDEO_COMPRESSED_CANCEL"]);
}

#[tokio::test]
async fn test_rejects_video_while_engine_loading() {
    let mut h = Harness::new();
    h.factory.set_load_delay(Duration::from_millis(200));

    let controller = Arc::clone(&h.controller);
    let loading = tokio::spawn(async move { controller.reload().await });
    h.wait_for(|s| s.engine == LoadState::Loading).await;

    let err = h.controller.submit(video_file("j.mp4", 64)).await.unwrap_err();
    assert!(matches!(
        err,
        ControllerError::EngineNotReady {
            state: LoadState::Loading
        }
    ));
    assert_eq!(
        h.controller.snapshot().message,
        Some(StatusMessage::EngineLoading)
    );

    // Images do not need the engine
    assert_eq!(
        h.controller.submit(image_file("k.png")).await.unwrap(),
        JobOutcome::Forwarded
    );

    loading.await.unwrap().unwrap();
    assert_eq!(h.controller.snapshot().message, None);
    assert_eq!(kinds(&h.drain()), vec!["IMAGE_SELECTED"]);
}

#[tokio::test]
async fn test_slot_is_reserved_while_validating() {
    let mut h = Harness::ready().await;
    h.probe.set_delay(Duration::from_millis(200)).await;

    let job = h.spawn_submit(video_file("s.mp4", 64));
    h.wait_for(|s| s.status == JobStatus::Validating).await;

    let err = h.controller.admit(video_file("t.mp4", 64)).unwrap_err();
    assert!(matches!(
        err,
        ControllerError::Busy {
            status: JobStatus::Validating
        }
    ));
    let err = h.controller.admit(image_file("u.png")).unwrap_err();
    assert!(matches!(err, ControllerError::Busy { .. }));

    assert!(matches!(
        job.await.unwrap().unwrap(),
        JobOutcome::Compressed(_)
    ));
    assert_eq!(kinds(&h.drain()), vec!["VIDEO_COMPRESSED"]);
    assert_eq!(h.controller.handled_files(), vec!["s.mp4".to_string()]);
}

#[tokio::test]
async fn test_cancel_during_validation() {
    let mut h = Harness::ready().await;
    h.probe.set_delay(Duration::from_millis(200)).await;

    let job = h.spawn_submit(video_file("v.mp4", 64));
    h.wait_for(|s| s.status == JobStatus::Validating).await;

    assert!(h.controller.cancel().await);
    assert_eq!(job.await.unwrap().unwrap(), JobOutcome::Cancelled);
    assert_eq!(kinds(&h.drain()), vec!["VIDEO_COMPRESSED_CANCEL"]);
    assert!(h.factory.engine(0).unwrap().executions().is_empty());

    h.wait_for(|s| s.status == JobStatus::Idle && s.engine == LoadState::Ready)
        .await;
    assert!(h.controller.handled_files().is_empty());
}

#[tokio::test]
async fn test_image_admitted_before_first_load() {
    let mut h = Harness::new();
    h.factory.set_load_delay(Duration::from_millis(100));

    let admission = h.controller.admit(image_file("w.png")).unwrap();
    h.controller.load().await.unwrap();
    assert_eq!(h.controller.snapshot().engine, LoadState::Ready);

    assert_eq!(h.controller.process(admission).await, JobOutcome::Forwarded);
    assert_eq!(kinds(&h.drain()), vec!["IMAGE_SELECTED"]);
    assert_eq!(h.factory.created_count(), 1);
}

// =============================================================================
// Failure paths
// =============================================================================

#[tokio::test]
async fn test_execution_failure_notifies_and_reloads() {
    let mut h = Harness::new();
    h.factory.set_execute_failure(Some("Invalid data found when processing input"));
    h.controller.reload().await.unwrap();
    h.factory.set_execute_failure(None);

    let outcome = h.controller.submit(video_file("m.mp4", 64)).await.unwrap();
    assert_eq!(outcome, JobOutcome::Failed);
    assert_eq!(kinds(&h.drain()), vec!["VIDEO_COMPRESSED_FAILED"]);

    let snapshot = h.controller.snapshot();
    assert_eq!(snapshot.status, JobStatus::Idle);
    assert_eq!(snapshot.engine, LoadState::Ready);
    assert_eq!(snapshot.message, Some(StatusMessage::CompressionFailed));
    assert_eq!(h.factory.created_count(), 2);

    // Not recorded, so the same file can be retried
    let outcome = h.controller.submit(video_file("m.mp4", 64)).await.unwrap();
    assert!(matches!(outcome, JobOutcome::Compressed(_)));
}

#[tokio::test]
async fn test_missing_output_is_a_failure() {
    let mut h = Harness::new();
    h.factory.set_output(None);
    h.controller.reload().await.unwrap();

    let outcome = h.controller.submit(video_file("n.mp4", 64)).await.unwrap();
    assert_eq!(outcome, JobOutcome::Failed);
    assert_eq!(kinds(&h.drain()), vec!["VIDEO_COMPRESSED_FAILED"]);
}

#[tokio::test]
async fn test_failed_reload_after_job_blocks_next_job() {
    let mut h = Harness::ready().await;
    h.factory.set_load_failure(Some("out of memory"));

    let outcome = h.controller.submit(video_file("o.mp4", 64)).await.unwrap();
    assert!(matches!(outcome, JobOutcome::Compressed(_)));
    assert_eq!(h.controller.snapshot().engine, LoadState::Failed);

    let err = h.controller.submit(video_file("p.mp4", 64)).await.unwrap_err();
    assert!(matches!(err, ControllerError::EngineNotReady { .. }));
    assert_eq!(kinds(&h.drain()), vec!["VIDEO_COMPRESSED"]);
}

#[tokio::test]
async fn test_unreadable_video_sets_message_only() {
    let mut h = Harness::ready().await;
    h.probe
        .set_failure("q.mp4", ProbeError::unreadable("moov atom not found"))
        .await;

    let outcome = h.controller.submit(video_file("q.mp4", 64)).await.unwrap();
    assert_eq!(outcome, JobOutcome::Rejected(ValidationError::Unreadable));
    assert!(h.drain().is_empty());
    assert_eq!(
        h.controller.snapshot().message,
        Some(StatusMessage::Unreadable)
    );
}

#[tokio::test]
async fn test_unsupported_type() {
    let mut h = Harness::ready().await;

    let outcome = h.controller.submit(document_file("r.pdf")).await.unwrap();
    assert_eq!(
        outcome,
        JobOutcome::Rejected(ValidationError::UnsupportedType)
    );
    assert_eq!(kinds(&h.drain()), vec!["FILE_TYPE_ERROR"]);
    assert_eq!(h.probe.probe_count().await, 0);
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let mut first = Harness::ready().await;
    let mut second = Harness::ready().await;

    assert_eq!(
        first.controller.submit(image_file("same.png")).await.unwrap(),
        JobOutcome::Forwarded
    );
    assert_eq!(
        second.controller.submit(image_file("same.png")).await.unwrap(),
        JobOutcome::Forwarded
    );
    assert_eq!(first.drain().len(), 1);
    assert_eq!(second.drain().len(), 1);
}
