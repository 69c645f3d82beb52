use chrono::Utc;
use tokio::sync::mpsc;

use super::{Notification, NotificationEnvelope};

/// Handle for emitting notifications to the embedding parent.
///
/// Cheaply cloneable. Every envelope is stamped with the session's
/// correlation identifier.
#[derive(Debug, Clone)]
pub struct NotificationHandle {
    correlation_id: String,
    tx: mpsc::Sender<NotificationEnvelope>,
}

impl NotificationHandle {
    /// Create a new handle from a channel sender.
    pub fn new(correlation_id: impl Into<String>, tx: mpsc::Sender<NotificationEnvelope>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            tx,
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    fn envelope(&self, notification: Notification) -> NotificationEnvelope {
        NotificationEnvelope {
            correlation_id: self.correlation_id.clone(),
            timestamp: Utc::now(),
            notification,
        }
    }

    /// Emit a notification, waiting for channel capacity.
    ///
    /// If the receiver is gone the error is logged and the caller is not failed.
    pub async fn emit(&self, notification: Notification) {
        let kind = notification.kind();
        if let Err(e) = self.tx.send(self.envelope(notification)).await {
            tracing::error!("Failed to emit {} notification: {}", kind, e);
        }
    }
}

/// Create a notification channel for one session.
///
/// Returns the handle given to the controller and the receiver drained by the
/// delivery side.
pub fn create_notification_channel(
    correlation_id: impl Into<String>,
    buffer_size: usize,
) -> (NotificationHandle, mpsc::Receiver<NotificationEnvelope>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (NotificationHandle::new(correlation_id, tx), rx)
}
