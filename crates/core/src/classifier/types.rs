//! Types for input classification.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Longest accepted video, in whole seconds. Anything at or above
/// `MAX_VIDEO_DURATION_SECS + 1` is rejected.
pub const MAX_VIDEO_DURATION_SECS: f64 = 60.0;

/// A file handed over by the picker.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Original filename.
    pub name: String,
    /// Declared media type (e.g. "video/mp4").
    pub media_type: String,
    /// Immutable file contents.
    pub bytes: Arc<[u8]>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Byte length of the contents.
    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }

    pub fn is_video(&self) -> bool {
        self.media_type.starts_with("video/")
    }

    /// Lowercased filename extension, if any.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }
}

/// Outcome of classifying a selected file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Classification {
    /// An image, forwarded unchanged.
    PassthroughImage,
    /// A video short enough to compress.
    VideoAccepted { duration_secs: f64 },
    /// A video at or over the duration ceiling.
    VideoTooLong { duration_secs: f64 },
    /// A video whose metadata could not be read.
    VideoUnreadable { reason: String },
    /// Neither image nor video.
    UnsupportedType { media_type: String },
}

impl Classification {
    /// Applies the duration ceiling to a probed duration.
    pub fn from_duration(duration_secs: f64) -> Self {
        if duration_secs < MAX_VIDEO_DURATION_SECS + 1.0 {
            Self::VideoAccepted { duration_secs }
        } else {
            Self::VideoTooLong { duration_secs }
        }
    }

    pub fn is_accepted_video(&self) -> bool {
        matches!(self, Self::VideoAccepted { .. })
    }

    /// The validation failure this classification represents, if any.
    pub fn validation_error(&self) -> Option<ValidationError> {
        match self {
            Self::PassthroughImage | Self::VideoAccepted { .. } => None,
            Self::VideoTooLong { .. } => Some(ValidationError::DurationExceeded),
            Self::VideoUnreadable { .. } => Some(ValidationError::Unreadable),
            Self::UnsupportedType { .. } => Some(ValidationError::UnsupportedType),
        }
    }
}

/// Terminal classification failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationError {
    #[error("unsupported file type")]
    UnsupportedType,

    #[error("video metadata could not be read")]
    Unreadable,

    #[error("video is longer than {} seconds", MAX_VIDEO_DURATION_SECS)]
    DurationExceeded,
}
