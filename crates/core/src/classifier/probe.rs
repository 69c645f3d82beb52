//! Container duration probing.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

use super::types::SourceFile;
use crate::engine::EngineConfig;

/// Errors that can occur while probing a video's duration.
#[derive(Debug, Clone, Error)]
pub enum ProbeError {
    /// FFprobe binary not found.
    #[error("FFprobe not found at path: {path}")]
    ProbeNotFound { path: PathBuf },

    /// Scratch file for the probe could not be created.
    #[error("Failed to stage file for probing: {reason}")]
    Staging { reason: String },

    /// The container metadata could not be read.
    #[error("Unreadable media: {reason}")]
    Unreadable { reason: String },
}

impl ProbeError {
    pub fn unreadable(reason: impl Into<String>) -> Self {
        Self::Unreadable {
            reason: reason.into(),
        }
    }
}

/// Reads a video's container duration without decoding it.
#[async_trait]
pub trait DurationProbe: Send + Sync {
    /// Returns the duration in seconds.
    async fn probe_duration(&self, file: &SourceFile) -> Result<f64, ProbeError>;
}

/// Duration probe backed by ffprobe.
///
/// The source bytes are written to a scratch file that is removed when the
/// probe returns, on every path.
#[derive(Debug, Clone)]
pub struct FfprobeDurationProbe {
    probe_path: PathBuf,
    scratch_dir: PathBuf,
}

impl FfprobeDurationProbe {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            probe_path: config.probe_path.clone(),
            scratch_dir: config.work_dir.clone(),
        }
    }

    /// Extracts `format.duration` from ffprobe's JSON output.
    fn parse_duration(output: &str) -> Result<f64, ProbeError> {
        #[derive(Deserialize)]
        struct ProbeOutput {
            format: ProbeFormat,
        }

        #[derive(Deserialize)]
        struct ProbeFormat {
            duration: Option<String>,
        }

        let probe: ProbeOutput = serde_json::from_str(output)
            .map_err(|e| ProbeError::unreadable(format!("Failed to parse ffprobe output: {}", e)))?;

        let duration = probe
            .format
            .duration
            .as_deref()
            .and_then(|d| d.parse::<f64>().ok())
            .ok_or_else(|| ProbeError::unreadable("container reports no duration"))?;

        if !duration.is_finite() || duration < 0.0 {
            return Err(ProbeError::unreadable(format!(
                "invalid duration: {}",
                duration
            )));
        }

        Ok(duration)
    }
}

#[async_trait]
impl DurationProbe for FfprobeDurationProbe {
    async fn probe_duration(&self, file: &SourceFile) -> Result<f64, ProbeError> {
        tokio::fs::create_dir_all(&self.scratch_dir)
            .await
            .map_err(|e| ProbeError::Staging {
                reason: e.to_string(),
            })?;

        let suffix = file
            .extension()
            .map(|ext| format!(".{}", ext))
            .unwrap_or_default();

        // Dropped at the end of this call, which deletes the file
        let scratch = tempfile::Builder::new()
            .prefix("probe-")
            .suffix(&suffix)
            .tempfile_in(&self.scratch_dir)
            .map_err(|e| ProbeError::Staging {
                reason: e.to_string(),
            })?;
        tokio::fs::write(scratch.path(), &file.bytes[..])
            .await
            .map_err(|e| ProbeError::Staging {
                reason: e.to_string(),
            })?;

        let output = Command::new(&self.probe_path)
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(scratch.path())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ProbeError::ProbeNotFound {
                        path: self.probe_path.clone(),
                    }
                } else {
                    ProbeError::Staging {
                        reason: e.to_string(),
                    }
                }
            })?;

        if !output.status.success() {
            return Err(ProbeError::unreadable(format!(
                "ffprobe exited with code: {:?}",
                output.status.code()
            )));
        }

        Self::parse_duration(&String::from_utf8_lossy(&output.stdout))
    }
}
