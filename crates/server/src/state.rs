use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use squeeze_core::{Config, DurationProbe, EngineFactory};

use crate::metrics::SESSIONS_ACTIVE;
use crate::session::Session;

/// Errors from session bookkeeping.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid component id: {0}")]
    InvalidId(String),
}

/// Shared application state
pub struct AppState {
    config: Config,
    factory: Arc<dyn EngineFactory>,
    probe: Arc<dyn DurationProbe>,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl AppState {
    pub fn new(
        config: Config,
        factory: Arc<dyn EngineFactory>,
        probe: Arc<dyn DurationProbe>,
    ) -> Self {
        Self {
            config,
            factory,
            probe,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Creates an isolated session and starts loading its engine.
    pub async fn create_session(&self, component_id: &str) -> Result<Arc<Session>, SessionError> {
        validate_component_id(component_id)?;

        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(component_id) {
            return Err(SessionError::AlreadyExists(component_id.to_string()));
        }

        let session = Session::start(
            component_id,
            self.config.engine.core_location(),
            Arc::clone(&self.factory),
            Arc::clone(&self.probe),
            self.config.notifications.buffer_size,
        );
        sessions.insert(component_id.to_string(), Arc::clone(&session));
        SESSIONS_ACTIVE.set(sessions.len() as i64);

        info!("Created session {}", component_id);
        Ok(session)
    }

    pub async fn session(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Removes a session and terminates its engine.
    pub async fn close_session(&self, id: &str) -> bool {
        let removed = {
            let mut sessions = self.sessions.write().await;
            let removed = sessions.remove(id);
            SESSIONS_ACTIVE.set(sessions.len() as i64);
            removed
        };

        match removed {
            Some(session) => {
                session.close().await;
                info!("Closed session {}", id);
                true
            }
            None => false,
        }
    }

    /// Closes every session. Used on shutdown.
    pub async fn close_all_sessions(&self) {
        let drained: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.write().await;
            SESSIONS_ACTIVE.set(0);
            sessions.drain().map(|(_, session)| session).collect()
        };

        for session in drained {
            session.close().await;
        }
    }
}

/// Component ids become part of outbound filenames, so they are restricted to
/// a filename-safe alphabet.
fn validate_component_id(id: &str) -> Result<(), SessionError> {
    let valid = !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !id.starts_with('.');

    if valid {
        Ok(())
    } else {
        Err(SessionError::InvalidId(id.to_string()))
    }
}
