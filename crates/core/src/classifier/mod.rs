//! Input classification.
//!
//! Decides what happens to a file picked by the user before any job exists:
//! images pass through untouched, short videos are accepted for compression,
//! and everything else is rejected with a typed reason.

mod probe;
mod types;

pub use probe::{DurationProbe, FfprobeDurationProbe, ProbeError};
pub use types::{Classification, SourceFile, ValidationError, MAX_VIDEO_DURATION_SECS};

use std::sync::Arc;
use tracing::{debug, warn};

/// Classifies selected files by declared media type and, for videos,
/// container duration.
#[derive(Clone)]
pub struct InputClassifier {
    probe: Arc<dyn DurationProbe>,
}

impl InputClassifier {
    pub fn new(probe: Arc<dyn DurationProbe>) -> Self {
        Self { probe }
    }

    /// Classifies a file. Only `video/*` inputs touch the duration probe.
    pub async fn classify(&self, file: &SourceFile) -> Classification {
        if file.is_image() {
            return Classification::PassthroughImage;
        }

        if !file.is_video() {
            return Classification::UnsupportedType {
                media_type: file.media_type.clone(),
            };
        }

        match self.probe.probe_duration(file).await {
            Ok(duration_secs) if !duration_secs.is_finite() || duration_secs < 0.0 => {
                warn!(
                    "Probe reported invalid duration for {}: {}",
                    file.name, duration_secs
                );
                Classification::VideoUnreadable {
                    reason: format!("invalid duration: {}", duration_secs),
                }
            }
            Ok(duration_secs) => {
                debug!("Probed {} duration: {:.3}s", file.name, duration_secs);
                Classification::from_duration(duration_secs)
            }
            Err(e) => {
                warn!("Failed to probe {}: {}", file.name, e);
                Classification::VideoUnreadable {
                    reason: e.to_string(),
                }
            }
        }
    }
}
