//! Types for the job controller.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::classifier::{SourceFile, ValidationError, MAX_VIDEO_DURATION_SECS};
use crate::engine::{EngineError, LoadState};
use crate::policy::EncodingProfile;

/// Lifecycle status of the controller's current job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Idle,
    Validating,
    Compressing,
    Cancelling,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Compressing => "compressing",
            Self::Cancelling => "cancelling",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statistics of a successful compression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionStats {
    /// Source size in bytes.
    pub original_size: u64,
    /// Output size in bytes.
    pub compressed_size: u64,
    /// `(original - compressed) / original * 100`. Negative when the output grew.
    pub compression_ratio: f64,
    /// Wall-clock duration in seconds.
    pub compression_time: f64,
}

impl CompressionStats {
    pub fn compute(original_size: u64, compressed_size: u64, elapsed: Duration) -> Self {
        let compression_ratio = if original_size == 0 {
            0.0
        } else {
            (original_size as f64 - compressed_size as f64) / original_size as f64 * 100.0
        };

        Self {
            original_size,
            compressed_size,
            compression_ratio,
            compression_time: elapsed.as_secs_f64(),
        }
    }
}

/// One transcode attempt.
#[derive(Debug, Clone)]
pub struct Job {
    /// Unique job id.
    pub id: String,
    /// Input file.
    pub source: SourceFile,
    /// Selected encoding profile.
    pub profile: EncodingProfile,
    /// 0-100, never decreasing within the attempt.
    pub progress_percent: u8,
    cancel: Arc<AtomicBool>,
}

impl Job {
    pub fn new(source: SourceFile) -> Self {
        let profile = EncodingProfile::for_filename(&source.name);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source,
            profile,
            progress_percent: 0,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared cancellation token, checked at the job's checkpoints.
    pub(crate) fn cancel_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub(crate) fn request_cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }
}

/// A file let in by `JobController::admit`.
///
/// Unless it is a duplicate, the controller slot stays reserved for it until
/// it is handed to `JobController::process`.
#[derive(Debug)]
#[must_use = "an admission holds the controller slot until processed"]
pub struct Admission {
    pub(crate) kind: AdmissionKind,
}

#[derive(Debug)]
pub(crate) enum AdmissionKind {
    /// Already handled this session; nothing was reserved.
    Duplicate(SourceFile),
    /// The controller is in `Validating` for this job.
    Reserved {
        job_id: String,
        file: SourceFile,
        cancel: Arc<AtomicBool>,
    },
}

impl Admission {
    pub(crate) fn duplicate(file: SourceFile) -> Self {
        Self {
            kind: AdmissionKind::Duplicate(file),
        }
    }

    pub(crate) fn reserved(job_id: String, file: SourceFile, cancel: Arc<AtomicBool>) -> Self {
        Self {
            kind: AdmissionKind::Reserved {
                job_id,
                file,
                cancel,
            },
        }
    }

    pub fn filename(&self) -> &str {
        match &self.kind {
            AdmissionKind::Duplicate(file) | AdmissionKind::Reserved { file, .. } => &file.name,
        }
    }

    /// Whether the file was already handled and will be dropped.
    pub fn is_duplicate(&self) -> bool {
        matches!(self.kind, AdmissionKind::Duplicate(_))
    }
}

/// User-visible status messages. Each is distinct so cancellation is never
/// shown as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusMessage {
    EngineLoading,
    EngineLoadFailed,
    Busy,
    DurationExceeded,
    Unreadable,
    UnsupportedType,
    CompressionFailed,
    Cancelled,
}

impl StatusMessage {
    /// Message for a classification failure.
    pub fn for_validation(error: ValidationError) -> Self {
        match error {
            ValidationError::UnsupportedType => Self::UnsupportedType,
            ValidationError::Unreadable => Self::Unreadable,
            ValidationError::DurationExceeded => Self::DurationExceeded,
        }
    }
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EngineLoading => f.write_str("The video engine is still loading. Please wait."),
            Self::EngineLoadFailed => {
                f.write_str("Failed to load the video engine. Please reload and try again.")
            }
            Self::Busy => f.write_str("A video is already being compressed."),
            Self::DurationExceeded => write!(
                f,
                "Videos cannot be longer than {} seconds.",
                MAX_VIDEO_DURATION_SECS
            ),
            Self::Unreadable => f.write_str("Unable to read the video file."),
            Self::UnsupportedType => f.write_str("Only videos or common image formats are supported."),
            Self::CompressionFailed => f.write_str("Failed to compress video. Please try again."),
            Self::Cancelled => f.write_str("Compression cancelled."),
        }
    }
}

/// Observable controller state, published on every change.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ControllerSnapshot {
    pub status: JobStatus,
    pub engine: LoadState,
    pub progress_percent: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<EncodingProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<StatusMessage>,
    /// Text of `message`, for display.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_stats: Option<CompressionStats>,
}

/// What happened to a submitted file.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// Image forwarded unchanged.
    Forwarded,
    /// Filename already handled this session; dropped silently.
    Duplicate,
    /// Rejected at classification.
    Rejected(ValidationError),
    /// Video compressed.
    Compressed(CompressionStats),
    /// Engine failure during the job.
    Failed,
    /// Cancelled by the user.
    Cancelled,
}

/// Errors returned when the controller cannot take a submission.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The engine is loading, failed to load, or was never loaded.
    #[error("engine not ready (state: {})", state.as_str())]
    EngineNotReady { state: LoadState },

    /// Another job occupies the engine.
    #[error("controller busy (status: {status})")]
    Busy { status: JobStatus },

    /// The engine failed to load.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Internal job failure, used to short-circuit the success path.
#[derive(Debug, Error)]
pub(crate) enum JobError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("cancelled by user")]
    Cancelled,
}
