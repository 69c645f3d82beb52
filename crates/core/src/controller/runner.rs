//! Job controller runner.

use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch, Mutex as AsyncMutex, RwLock};
use tracing::{debug, error, info, trace, warn};

use super::ledger::HandledFileLedger;
use super::types::{
    Admission, AdmissionKind, CompressionStats, ControllerError, ControllerSnapshot, Job, JobError,
    JobOutcome, JobStatus, StatusMessage,
};
use crate::classifier::{InputClassifier, SourceFile, ValidationError};
use crate::engine::{
    CoreLocation, EngineError, EngineEvent, EngineFactory, LoadState, TranscodeEngine,
};
use crate::metrics;
use crate::notify::{
    outbound_name, Notification, NotificationHandle, OutboundFile, COMPRESSED_MEDIA_TYPE,
    COMPRESSED_SUFFIX,
};
use crate::policy::EncodingProfile;

/// Logical name of the compressed output inside the engine's working area.
const OUTPUT_NAME: &str = "output.mp4";

/// Input extension used when the source filename has none.
const DEFAULT_INPUT_EXTENSION: &str = "mp4";

/// Captured engine log lines kept per attempt.
const MAX_LOG_LINES: usize = 1000;

/// Mutable controller state. Every mutation goes through `JobController::update`,
/// which publishes the derived snapshot.
#[derive(Debug, Default)]
struct ControllerState {
    status: JobStatus,
    engine: LoadState,
    job: Option<Job>,
    message: Option<StatusMessage>,
    last_stats: Option<CompressionStats>,
}

impl ControllerState {
    fn owns(&self, job_id: &str) -> bool {
        self.job.as_ref().is_some_and(|job| job.id == job_id)
    }

    fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            status: self.status,
            engine: self.engine,
            progress_percent: self.job.as_ref().map_or(0, |job| job.progress_percent),
            filename: self.job.as_ref().map(|job| job.source.name.clone()),
            profile: self.job.as_ref().map(|job| job.profile),
            message: self.message,
            message_text: self.message.map(|m| m.to_string()),
            last_stats: self.last_stats.clone(),
        }
    }

    fn not_ready_message(&self) -> StatusMessage {
        match self.engine {
            LoadState::Failed => StatusMessage::EngineLoadFailed,
            _ => StatusMessage::EngineLoading,
        }
    }
}

/// Drives a session's transcode engine through its lifecycle.
///
/// One job at a time. The controller owns its engine instance exclusively and
/// replaces it with a freshly loaded one after every terminal job outcome.
pub struct JobController {
    core: CoreLocation,
    factory: Arc<dyn EngineFactory>,
    classifier: InputClassifier,
    notifier: NotificationHandle,
    engine: RwLock<Option<Arc<dyn TranscodeEngine>>>,
    reload_lock: AsyncMutex<()>,
    ledger: Mutex<HandledFileLedger>,
    state: Mutex<ControllerState>,
    snapshot_tx: watch::Sender<ControllerSnapshot>,
    logs: Mutex<VecDeque<String>>,
    closed: AtomicBool,
}

impl JobController {
    /// Creates a controller with no engine loaded. Call `load` to load one.
    pub fn new(
        core: CoreLocation,
        factory: Arc<dyn EngineFactory>,
        classifier: InputClassifier,
        notifier: NotificationHandle,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(ControllerSnapshot::default());
        Self {
            core,
            factory,
            classifier,
            notifier,
            engine: RwLock::new(None),
            reload_lock: AsyncMutex::new(()),
            ledger: Mutex::new(HandledFileLedger::new()),
            state: Mutex::new(ControllerState::default()),
            snapshot_tx,
            logs: Mutex::new(VecDeque::with_capacity(MAX_LOG_LINES)),
            closed: AtomicBool::new(false),
        }
    }

    pub fn correlation_id(&self) -> &str {
        self.notifier.correlation_id()
    }

    /// Current observable state.
    pub fn snapshot(&self) -> ControllerSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<ControllerSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Engine log lines captured during the current or most recent job.
    pub fn logs(&self) -> Vec<String> {
        lock(&self.logs).iter().cloned().collect()
    }

    /// Filenames recorded in the handled-file ledger.
    pub fn handled_files(&self) -> Vec<String> {
        lock(&self.ledger).names()
    }

    fn update<R>(&self, f: impl FnOnce(&mut ControllerState) -> R) -> R {
        let mut state = lock(&self.state);
        let result = f(&mut state);
        let snapshot = state.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
        result
    }

    // =========================================================================
    // Engine lifecycle
    // =========================================================================

    /// Discards the current engine instance and loads a fresh one.
    ///
    /// Refused while a job is active.
    pub async fn reload(&self) -> Result<(), ControllerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::load("controller is shut down").into());
        }
        self.update(|s| {
            if s.status != JobStatus::Idle {
                return Err(ControllerError::Busy { status: s.status });
            }
            s.engine = LoadState::Loading;
            Ok(())
        })?;
        self.reload_engine().await.map_err(ControllerError::from)
    }

    /// Loads the first engine instance.
    ///
    /// Unlike `reload` this does not require an idle controller, so images
    /// admitted before the load are unaffected. A no-op once an engine has
    /// been loaded or is loading.
    pub async fn load(&self) -> Result<(), ControllerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::load("controller is shut down").into());
        }
        let start = self.update(|s| {
            if s.engine != LoadState::Unloaded {
                return false;
            }
            s.engine = LoadState::Loading;
            true
        });
        if !start {
            debug!("Engine already loaded for session {}", self.correlation_id());
            return Ok(());
        }
        self.reload_engine().await.map_err(ControllerError::from)
    }

    async fn reload_engine(&self) -> Result<(), EngineError> {
        let _guard = self.reload_lock.lock().await;

        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::load("controller is shut down"));
        }

        let previous = self.engine.write().await.take();
        if let Some(previous) = previous {
            debug!("Terminating previous {} engine instance", previous.name());
            previous.terminate().await;
        }

        self.update(|s| s.engine = LoadState::Loading);

        let engine = self.factory.create();
        info!(
            "Loading {} engine for session {} from {}",
            engine.name(),
            self.correlation_id(),
            self.core
        );

        match engine.load(&self.core).await {
            Ok(()) if self.closed.load(Ordering::SeqCst) => {
                engine.terminate().await;
                Err(EngineError::load("controller is shut down"))
            }
            Ok(()) => {
                *self.engine.write().await = Some(engine);
                self.update(|s| {
                    s.engine = LoadState::Ready;
                    if matches!(
                        s.message,
                        Some(StatusMessage::EngineLoading | StatusMessage::EngineLoadFailed)
                    ) {
                        s.message = None;
                    }
                });
                metrics::ENGINE_LOADS.with_label_values(&["success"]).inc();
                info!("Engine ready for session {}", self.correlation_id());
                Ok(())
            }
            Err(e) => {
                engine.terminate().await;
                self.update(|s| {
                    s.engine = LoadState::Failed;
                    s.message = Some(StatusMessage::EngineLoadFailed);
                });
                metrics::ENGINE_LOADS.with_label_values(&["failure"]).inc();
                error!(
                    "Engine failed to load for session {}: {}",
                    self.correlation_id(),
                    e
                );
                Err(e)
            }
        }
    }

    /// Stops any in-flight job and frees the engine. The controller cannot be
    /// used afterwards.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let _guard = self.reload_lock.lock().await;

        self.update(|s| {
            if let Some(job) = &s.job {
                job.request_cancel();
            }
            s.engine = LoadState::Unloaded;
        });

        let engine = self.engine.write().await.take();
        if let Some(engine) = engine {
            engine.terminate().await;
        }
        info!("Controller for session {} shut down", self.correlation_id());
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Handles one selected file: `admit` followed by `process`.
    ///
    /// Returns `Err` only when the file could not be admitted (busy or engine
    /// not ready). Every other outcome, including failures and cancellation,
    /// is reported as a `JobOutcome`.
    pub async fn submit(&self, file: SourceFile) -> Result<JobOutcome, ControllerError> {
        let admission = self.admit(file)?;
        Ok(self.process(admission).await)
    }

    /// Reserves the controller for a file without waiting on anything.
    ///
    /// On success the status is `Validating` until the admission is passed
    /// to `process`, so a concurrent selection is refused as busy. Images
    /// never need a ready engine; videos do. Already handled names are
    /// admitted as duplicates without reserving anything.
    pub fn admit(&self, file: SourceFile) -> Result<Admission, ControllerError> {
        if lock(&self.ledger).contains(&file.name) {
            return Ok(Admission::duplicate(file));
        }

        let job = Job::new(file.clone());
        let job_id = job.id.clone();
        let cancel = job.cancel_token();

        self.update(|s| {
            if s.status != JobStatus::Idle {
                s.message = Some(StatusMessage::Busy);
                return Err(ControllerError::Busy { status: s.status });
            }
            if file.is_video() && s.engine != LoadState::Ready {
                s.message = Some(s.not_ready_message());
                return Err(ControllerError::EngineNotReady { state: s.engine });
            }
            s.status = JobStatus::Validating;
            s.job = Some(job);
            s.message = None;
            Ok(())
        })
        .inspect_err(|e| {
            let label = match e {
                ControllerError::Busy { .. } => "busy",
                _ => "not_ready",
            };
            metrics::SUBMISSIONS.with_label_values(&[label]).inc();
        })?;

        debug!("Admitted {} as job {}", file.name, job_id);
        Ok(Admission::reserved(job_id, file, cancel))
    }

    /// Classifies an admitted file and runs it to its terminal outcome,
    /// releasing the reservation on every path.
    pub async fn process(&self, admission: Admission) -> JobOutcome {
        let (job_id, file, cancel) = match admission.kind {
            AdmissionKind::Duplicate(file) => {
                debug!("Dropping already handled file {}", file.name);
                metrics::SUBMISSIONS.with_label_values(&["duplicate"]).inc();
                return JobOutcome::Duplicate;
            }
            AdmissionKind::Reserved {
                job_id,
                file,
                cancel,
            } => (job_id, file, cancel),
        };

        let classification = self.classifier.classify(&file).await;
        debug!("Classified {} as {:?}", file.name, classification);

        if cancel.load(Ordering::SeqCst) {
            info!("Job {} cancelled during validation", job_id);
            return JobOutcome::Cancelled;
        }

        if let Some(error) = classification.validation_error() {
            return self.reject(&job_id, &file, error).await;
        }

        if classification.is_accepted_video() {
            self.compress(&job_id, file, &cancel).await
        } else {
            self.forward_image(&job_id, file).await
        }
    }

    /// Returns a `Validating` reservation to `Idle`.
    ///
    /// False when the job no longer owns the controller (it was cancelled).
    fn release(&self, job_id: &str, message: Option<StatusMessage>) -> bool {
        self.update(|s| {
            if s.status != JobStatus::Validating || !s.owns(job_id) {
                return false;
            }
            s.status = JobStatus::Idle;
            s.job = None;
            s.message = message;
            true
        })
    }

    async fn forward_image(&self, job_id: &str, file: SourceFile) -> JobOutcome {
        let recorded = lock(&self.ledger).record(&file.name);
        self.release(job_id, None);
        if !recorded {
            metrics::SUBMISSIONS.with_label_values(&["duplicate"]).inc();
            return JobOutcome::Duplicate;
        }

        let renamed = outbound_name(self.correlation_id(), Utc::now(), &file.name);
        info!("Forwarding image {} as {}", file.name, renamed);

        let outbound = OutboundFile::new(renamed, file.media_type.clone(), Arc::clone(&file.bytes));
        self.notifier
            .emit(Notification::ImageSelected {
                file: outbound,
                filename: file.name,
            })
            .await;
        metrics::SUBMISSIONS.with_label_values(&["image"]).inc();
        JobOutcome::Forwarded
    }

    async fn reject(&self, job_id: &str, file: &SourceFile, error: ValidationError) -> JobOutcome {
        if !self.release(job_id, Some(StatusMessage::for_validation(error))) {
            debug!("Job {} rejected after cancellation: {}", job_id, error);
            return JobOutcome::Cancelled;
        }
        warn!("Rejected {}: {}", file.name, error);
        metrics::SUBMISSIONS.with_label_values(&["rejected"]).inc();

        let notification = match error {
            ValidationError::DurationExceeded => Some(Notification::VideoLengthExceeded),
            ValidationError::UnsupportedType => Some(Notification::FileTypeError),
            ValidationError::Unreadable => None,
        };
        if let Some(notification) = notification {
            self.notifier.emit(notification).await;
        }

        JobOutcome::Rejected(error)
    }

    // =========================================================================
    // Compression
    // =========================================================================

    async fn compress(&self, job_id: &str, file: SourceFile, cancel: &AtomicBool) -> JobOutcome {
        let started_at = Instant::now();
        let profile = EncodingProfile::for_filename(&file.name);

        metrics::SUBMISSIONS.with_label_values(&["video"]).inc();
        lock(&self.logs).clear();
        info!(
            "Starting job {} for {} ({} bytes, {} profile)",
            job_id,
            file.name,
            file.size_bytes(),
            profile.name()
        );

        let result = match self.run_job(job_id, &file, profile, cancel).await {
            Err(JobError::Engine(e)) if cancel.load(Ordering::SeqCst) => {
                debug!("Job {} engine error after cancellation: {}", job_id, e);
                Err(JobError::Cancelled)
            }
            other => other,
        };

        match result {
            Ok(output) => self.complete(job_id, &file, output, started_at.elapsed()).await,
            Err(JobError::Cancelled) => {
                info!("Job {} observed cancellation", job_id);
                JobOutcome::Cancelled
            }
            Err(JobError::Engine(e)) => self.fail(job_id, e).await,
        }
    }

    async fn run_job(
        &self,
        job_id: &str,
        file: &SourceFile,
        profile: EncodingProfile,
        cancel: &AtomicBool,
    ) -> Result<Vec<u8>, JobError> {
        let engine = self
            .engine
            .read()
            .await
            .clone()
            .ok_or_else(|| EngineError::load("no engine instance"))?;

        self.update(|s| {
            if s.owns(job_id) && s.status == JobStatus::Validating {
                s.status = JobStatus::Compressing;
                if let Some(job) = s.job.as_mut() {
                    job.progress_percent = 0;
                }
            }
        });
        ensure_not_cancelled(cancel)?;

        let extension = file
            .extension()
            .unwrap_or_else(|| DEFAULT_INPUT_EXTENSION.to_string());
        let input = format!("input.{}", extension);
        engine.write_input(&input, &file.bytes).await?;
        ensure_not_cancelled(cancel)?;

        let args = profile.arguments(&input, OUTPUT_NAME);
        let executed = self.execute_with_progress(engine.as_ref(), job_id, &args).await;
        ensure_not_cancelled(cancel)?;
        executed?;

        let output = engine.read_output(OUTPUT_NAME).await;
        ensure_not_cancelled(cancel)?;
        Ok(output?)
    }

    async fn execute_with_progress(
        &self,
        engine: &dyn TranscodeEngine,
        job_id: &str,
        args: &[String],
    ) -> Result<(), EngineError> {
        let mut events = engine.subscribe();
        let execution = engine.execute(args);
        tokio::pin!(execution);

        let mut events_open = true;
        let result = loop {
            tokio::select! {
                result = &mut execution => break result,
                event = events.recv(), if events_open => match event {
                    Ok(event) => self.apply_event(job_id, event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Job {} skipped {} engine events", job_id, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => events_open = false,
                },
            }
        };

        // Events emitted just before the execution finished
        loop {
            match events.try_recv() {
                Ok(event) => self.apply_event(job_id, event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }

        result
    }

    fn apply_event(&self, job_id: &str, event: EngineEvent) {
        match event {
            EngineEvent::Progress(fraction) => self.apply_progress(job_id, fraction),
            EngineEvent::Log(line) => {
                trace!(target: "squeeze::engine", "{}", line);
                let mut logs = lock(&self.logs);
                if logs.len() >= MAX_LOG_LINES {
                    logs.pop_front();
                }
                logs.push_back(line);
            }
        }
    }

    /// Applies an engine progress fraction. Values above 1 are engine noise
    /// and dropped; progress never decreases within a job.
    fn apply_progress(&self, job_id: &str, fraction: f64) {
        if fraction.is_nan() || fraction > 1.0 {
            return;
        }
        let percent = (fraction * 100.0).round().clamp(0.0, 100.0) as u8;

        self.update(|s| {
            if s.status != JobStatus::Compressing || !s.owns(job_id) {
                return;
            }
            if let Some(job) = s.job.as_mut() {
                if percent > job.progress_percent {
                    job.progress_percent = percent;
                }
            }
        });
    }

    async fn complete(
        &self,
        job_id: &str,
        file: &SourceFile,
        output: Vec<u8>,
        elapsed: Duration,
    ) -> JobOutcome {
        let stats = CompressionStats::compute(file.size_bytes(), output.len() as u64, elapsed);

        let committed = self.update(|s| {
            if s.status != JobStatus::Compressing || !s.owns(job_id) {
                return false;
            }
            s.status = JobStatus::Succeeded;
            s.last_stats = Some(stats.clone());
            if let Some(job) = s.job.as_mut() {
                job.progress_percent = 100;
            }
            true
        });
        if !committed {
            debug!("Job {} finished after cancellation, discarding output", job_id);
            return JobOutcome::Cancelled;
        }

        lock(&self.ledger).record(&file.name);

        let renamed = outbound_name(self.correlation_id(), Utc::now(), COMPRESSED_SUFFIX);
        info!(
            "Job {} compressed {} -> {} ({} -> {} bytes, {:.1}% in {:.2}s)",
            job_id,
            file.name,
            renamed,
            stats.original_size,
            stats.compressed_size,
            stats.compression_ratio,
            stats.compression_time
        );

        let outbound = OutboundFile::new(renamed, COMPRESSED_MEDIA_TYPE, Arc::from(output));
        self.notifier
            .emit(Notification::VideoCompressed {
                file: outbound,
                filename: file.name.clone(),
                stats: stats.clone(),
            })
            .await;

        metrics::JOBS.with_label_values(&["succeeded"]).inc();
        metrics::COMPRESSION_DURATION
            .with_label_values(&[])
            .observe(stats.compression_time);

        self.finish(job_id).await;
        JobOutcome::Compressed(stats)
    }

    async fn fail(&self, job_id: &str, error: EngineError) -> JobOutcome {
        let committed = self.update(|s| {
            if !matches!(s.status, JobStatus::Validating | JobStatus::Compressing) || !s.owns(job_id)
            {
                return false;
            }
            s.status = JobStatus::Failed;
            s.message = Some(StatusMessage::CompressionFailed);
            true
        });
        if !committed {
            debug!("Job {} failed after cancellation: {}", job_id, error);
            return JobOutcome::Cancelled;
        }

        error!("Job {} failed ({}): {}", job_id, error.kind(), error);
        self.notifier.emit(Notification::VideoCompressedFailed).await;
        metrics::JOBS.with_label_values(&["failed"]).inc();

        self.finish(job_id).await;
        JobOutcome::Failed
    }

    /// Cancels the active video job.
    ///
    /// Images are never cancellable; their validation is only a type check.
    /// Returns false when there is nothing to cancel, including a second call
    /// for the same job. Exactly one cancel notification is emitted per job.
    pub async fn cancel(&self) -> bool {
        let job_id = self.update(|s| {
            if !matches!(s.status, JobStatus::Validating | JobStatus::Compressing) {
                return None;
            }
            let job = s.job.as_ref().filter(|job| job.source.is_video())?;
            job.request_cancel();
            let id = job.id.clone();
            s.status = JobStatus::Cancelling;
            Some(id)
        });

        let Some(job_id) = job_id else {
            debug!("Cancel requested with no active job");
            return false;
        };

        info!("Cancelling job {}", job_id);
        let engine = self.engine.read().await.clone();
        if let Some(engine) = engine {
            engine.terminate().await;
        }

        self.update(|s| {
            s.status = JobStatus::Cancelled;
            s.message = Some(StatusMessage::Cancelled);
            if let Some(job) = s.job.as_mut() {
                job.progress_percent = 0;
            }
        });
        self.notifier.emit(Notification::VideoCompressedCancel).await;
        metrics::JOBS.with_label_values(&["cancelled"]).inc();

        self.finish(&job_id).await;
        true
    }

    /// Returns to `Idle` and replaces the engine instance.
    async fn finish(&self, job_id: &str) {
        let owned = self.update(|s| {
            if !s.owns(job_id) {
                return false;
            }
            s.status = JobStatus::Idle;
            s.job = None;
            s.engine = LoadState::Loading;
            true
        });
        if !owned {
            return;
        }

        if let Err(e) = self.reload_engine().await {
            warn!("Engine reload after job {} failed: {}", job_id, e);
        }
    }
}

fn ensure_not_cancelled(cancel: &AtomicBool) -> Result<(), JobError> {
    if cancel.load(Ordering::SeqCst) {
        Err(JobError::Cancelled)
    } else {
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
