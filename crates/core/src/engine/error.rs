//! Error types for the engine binding.

use thiserror::Error;

/// Errors raised by a transcoding engine instance.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The engine core could not be fetched or initialized.
    #[error("Engine failed to load: {reason}")]
    Load { reason: String },

    /// Staging input or reading output against the working area failed.
    #[error("Engine I/O error: {reason}")]
    Io { reason: String },

    /// The encoding invocation ended abnormally.
    #[error("Engine execution failed: {reason}")]
    Execution {
        reason: String,
        stderr: Option<String>,
    },
}

impl EngineError {
    /// Creates a load error.
    pub fn load(reason: impl Into<String>) -> Self {
        Self::Load {
            reason: reason.into(),
        }
    }

    /// Creates an I/O error.
    pub fn io(reason: impl Into<String>) -> Self {
        Self::Io {
            reason: reason.into(),
        }
    }

    /// Creates an execution error with optional captured stderr.
    pub fn execution(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::Execution {
            reason: reason.into(),
            stderr,
        }
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Load { .. } => "load",
            Self::Io { .. } => "io",
            Self::Execution { .. } => "execution",
        }
    }
}
