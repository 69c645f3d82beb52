//! Per-component sessions.
//!
//! A session owns one job controller (and through it one engine instance and
//! one handled-file ledger), the outbox of renamed files waiting to be
//! downloaded, and the broadcaster feeding its WebSocket clients.
//!
//! WebSocket delivery is live only. Notifications emitted while no client is
//! connected are still kept in a bounded per-session backlog.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use squeeze_core::{
    create_notification_channel, ControllerError, ControllerSnapshot, CoreLocation,
    DurationProbe, EngineFactory, InputClassifier, JobController, NotificationEnvelope,
    OutboundFile, SourceFile,
};

use crate::api::{WsBroadcaster, WsMessage};
use crate::metrics::NOTIFICATIONS_SENT;

/// Most recent notifications kept per session.
pub const NOTIFICATION_BACKLOG: usize = 64;

type Outbox = Arc<RwLock<HashMap<String, OutboundFile>>>;
type Backlog = Arc<RwLock<VecDeque<NotificationEnvelope>>>;

pub struct Session {
    id: String,
    created_at: DateTime<Utc>,
    controller: Arc<JobController>,
    outbox: Outbox,
    backlog: Backlog,
    broadcaster: WsBroadcaster,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Session {
    /// Builds the session's controller, starts its pumps and kicks off the
    /// initial engine load in the background.
    pub fn start(
        id: &str,
        core: CoreLocation,
        factory: Arc<dyn EngineFactory>,
        probe: Arc<dyn DurationProbe>,
        buffer_size: usize,
    ) -> Arc<Self> {
        let (notifier, notifications) = create_notification_channel(id, buffer_size);
        let controller = Arc::new(JobController::new(
            core,
            factory,
            InputClassifier::new(probe),
            notifier,
        ));

        let outbox: Outbox = Arc::new(RwLock::new(HashMap::new()));
        let backlog: Backlog = Arc::new(RwLock::new(VecDeque::new()));
        let broadcaster = WsBroadcaster::default();

        let tasks = vec![
            tokio::spawn(pump_notifications(
                notifications,
                Arc::clone(&outbox),
                Arc::clone(&backlog),
                broadcaster.clone(),
            )),
            tokio::spawn(pump_snapshots(controller.subscribe(), broadcaster.clone())),
            tokio::spawn({
                let controller = Arc::clone(&controller);
                async move {
                    if let Err(e) = controller.load().await {
                        warn!(
                            "Initial engine load failed for session {}: {}",
                            controller.correlation_id(),
                            e
                        );
                    }
                }
            }),
        ];

        Arc::new(Self {
            id: id.to_string(),
            created_at: Utc::now(),
            controller,
            outbox,
            backlog,
            broadcaster,
            tasks: Mutex::new(tasks),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn controller(&self) -> &Arc<JobController> {
        &self.controller
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        self.controller.snapshot()
    }

    pub fn broadcaster(&self) -> &WsBroadcaster {
        &self.broadcaster
    }

    /// Admits a file and processes it in the background.
    ///
    /// The controller slot is reserved before this returns, so a second file
    /// selected while the first is still being validated is refused here.
    /// Outcomes are delivered as notifications; only admission failures are
    /// returned.
    pub fn submit(&self, file: SourceFile) -> Result<(), ControllerError> {
        let admission = self.controller.admit(file)?;

        let controller = Arc::clone(&self.controller);
        tokio::spawn(async move {
            let name = admission.filename().to_string();
            let outcome = controller.process(admission).await;
            debug!(
                "Session {} finished {}: {:?}",
                controller.correlation_id(),
                name,
                outcome
            );
        });
        Ok(())
    }

    /// Notifications emitted in this session, oldest first.
    pub async fn notifications(&self) -> Vec<NotificationEnvelope> {
        self.backlog.read().await.iter().cloned().collect()
    }

    /// Outbound files waiting for download.
    pub async fn outbox(&self) -> Vec<OutboundFile> {
        let mut files: Vec<OutboundFile> = self.outbox.read().await.values().cloned().collect();
        files.sort_by(|a, b| a.name.cmp(&b.name));
        files
    }

    /// Removes and returns an outbound file. Each file is downloadable once.
    pub async fn take_outbound(&self, name: &str) -> Option<OutboundFile> {
        self.outbox.write().await.remove(name)
    }

    /// Terminates the engine and stops the pumps.
    pub async fn close(&self) {
        self.controller.shutdown().await;

        let tasks: Vec<JoinHandle<()>> = self
            .tasks
            .lock()
            .map(|mut tasks| tasks.drain(..).collect())
            .unwrap_or_default();
        for task in tasks {
            task.abort();
        }
        self.outbox.write().await.clear();
        self.backlog.write().await.clear();
        info!("Session {} closed", self.id);
    }
}

async fn pump_notifications(
    mut rx: mpsc::Receiver<NotificationEnvelope>,
    outbox: Outbox,
    backlog: Backlog,
    broadcaster: WsBroadcaster,
) {
    while let Some(envelope) = rx.recv().await {
        let kind = envelope.notification.kind();
        if let Some(file) = envelope.notification.file() {
            outbox.write().await.insert(file.name.clone(), file.clone());
        }

        {
            let mut backlog = backlog.write().await;
            if backlog.len() >= NOTIFICATION_BACKLOG {
                backlog.pop_front();
            }
            backlog.push_back(envelope.clone());
        }

        info!(
            "Notifying parent {} of {}",
            envelope.correlation_id, kind
        );
        NOTIFICATIONS_SENT.with_label_values(&[kind]).inc();
        broadcaster.broadcast(WsMessage::Notification(envelope));
    }
}

async fn pump_snapshots(mut rx: watch::Receiver<ControllerSnapshot>, broadcaster: WsBroadcaster) {
    while rx.changed().await.is_ok() {
        let snapshot = rx.borrow_and_update().clone();
        broadcaster.broadcast(WsMessage::Snapshot(snapshot));
    }
}
