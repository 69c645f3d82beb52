//! Notification types.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::controller::CompressionStats;

/// Filename suffix of compressed output.
pub const COMPRESSED_SUFFIX: &str = "compressed-video.mp4";

/// Media type of compressed output.
pub const COMPRESSED_MEDIA_TYPE: &str = "video/mp4";

/// Builds the collision-free outbound filename
/// `<correlation_id>-<timestamp_millis>-<suffix>`.
pub fn outbound_name(correlation_id: &str, timestamp: DateTime<Utc>, suffix: &str) -> String {
    format!(
        "{}-{}-{}",
        correlation_id,
        timestamp.timestamp_millis(),
        suffix
    )
}

/// A renamed file delivered to the parent.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundFile {
    /// Renamed filename.
    pub name: String,
    /// Media type of the contents.
    pub media_type: String,
    /// Size of the contents in bytes.
    pub size_bytes: u64,
    /// File contents. Not serialized; delivery channels carry bytes out of band.
    #[serde(skip)]
    pub bytes: Arc<[u8]>,
}

impl OutboundFile {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: Arc<[u8]>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            size_bytes: bytes.len() as u64,
            bytes,
        }
    }
}

/// One message to the embedding parent.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Notification {
    /// An image was accepted and forwarded unchanged.
    ImageSelected {
        file: OutboundFile,
        filename: String,
    },
    /// A video was transcoded successfully.
    VideoCompressed {
        file: OutboundFile,
        filename: String,
        stats: CompressionStats,
    },
    /// The engine failed during transcoding.
    VideoCompressedFailed,
    /// A user-initiated cancellation completed.
    VideoCompressedCancel,
    /// The video is over the duration ceiling.
    VideoLengthExceeded,
    /// The declared type is neither image nor video.
    FileTypeError,
}

impl Notification {
    /// The message kind as sent on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ImageSelected { .. } => "IMAGE_SELECTED",
            Self::VideoCompressed { .. } => "VIDEO_COMPRESSED",
            Self::VideoCompressedFailed => "VIDEO_COMPRESSED_FAILED",
            Self::VideoCompressedCancel => "VIDEO_COMPRESSED_CANCEL",
            Self::VideoLengthExceeded => "VIDEO_LENGTH_EXCEEDED",
            Self::FileTypeError => "FILE_TYPE_ERROR",
        }
    }

    /// The outbound file attached to this notification, if any.
    pub fn file(&self) -> Option<&OutboundFile> {
        match self {
            Self::ImageSelected { file, .. } | Self::VideoCompressed { file, .. } => Some(file),
            _ => None,
        }
    }
}

/// Envelope wrapping a notification with the session's correlation id.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationEnvelope {
    /// Correlation identifier supplied by the parent.
    #[serde(rename = "componentId")]
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub notification: Notification,
}
