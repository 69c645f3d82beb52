//! Testing utilities and mock implementations.
//!
//! Mocks for the engine binding and the duration probe, so the controller can
//! be exercised without an ffmpeg installation.
//!
//! # Example
//!
//! ```rust,ignore
//! use squeeze_core::testing::{MockDurationProbe, MockEngineFactory};
//!
//! let factory = MockEngineFactory::new();
//! factory.set_hang(true);
//!
//! let probe = MockDurationProbe::new();
//! probe.set_duration("long.mp4", 90.0).await;
//! ```

mod mock_engine;
mod mock_probe;

pub use mock_engine::{MockEngine, MockEngineBehavior, MockEngineFactory};
pub use mock_probe::MockDurationProbe;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::classifier::SourceFile;

    /// A video file of the given size with a media type matching its extension.
    pub fn video_file(name: &str, size_bytes: usize) -> SourceFile {
        let media_type = if name.to_lowercase().ends_with(".mov") {
            "video/quicktime"
        } else {
            "video/mp4"
        };
        SourceFile::new(name, media_type, vec![0u8; size_bytes])
    }

    /// A small PNG image.
    pub fn image_file(name: &str) -> SourceFile {
        SourceFile::new(name, "image/png", b"\x89PNG\r\n\x1a\n".to_vec())
    }

    /// A file that is neither an image nor a video.
    pub fn document_file(name: &str) -> SourceFile {
        SourceFile::new(name, "application/pdf", b"%PDF-1.7".to_vec())
    }
}
