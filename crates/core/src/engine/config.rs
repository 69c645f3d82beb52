//! Configuration for the engine binding.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::types::CoreLocation;

/// Configuration for the FFmpeg-backed engine and duration probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine core location (the ffmpeg binary).
    #[serde(default = "default_core_path")]
    pub core_path: String,

    /// Path to ffprobe, used to read container duration.
    #[serde(default = "default_probe_path")]
    pub probe_path: PathBuf,

    /// Parent directory for per-instance working areas and probe scratch files.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    /// Must be `info` or more verbose for progress reporting; enforced by
    /// `validate_config`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_core_path() -> String {
    "ffmpeg".to_string()
}

fn default_probe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("squeeze-engine")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            core_path: default_core_path(),
            probe_path: default_probe_path(),
            work_dir: default_work_dir(),
            log_level: default_log_level(),
        }
    }
}

impl EngineConfig {
    /// The engine core location handed to `TranscodeEngine::load`.
    pub fn core_location(&self) -> CoreLocation {
        CoreLocation::new(self.core_path.clone())
    }

    /// Sets the engine core location.
    pub fn with_core_path(mut self, core_path: impl Into<String>) -> Self {
        self.core_path = core_path.into();
        self
    }

    /// Sets the working directory.
    pub fn with_work_dir(mut self, work_dir: PathBuf) -> Self {
        self.work_dir = work_dir;
        self
    }
}
