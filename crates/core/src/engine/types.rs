//! Types for the engine binding.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Location of the engine's loadable core (a path or URL).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoreLocation(String);

impl CoreLocation {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Load state of the session's engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    #[default]
    Unloaded,
    Loading,
    Ready,
    Failed,
}

impl LoadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unloaded => "unloaded",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

/// Event emitted by an engine instance while executing.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Fractional progress of the current execution. Nominally in [0, 1], but
    /// engines may report values outside that range.
    Progress(f64),
    /// A diagnostic log line.
    Log(String),
}
