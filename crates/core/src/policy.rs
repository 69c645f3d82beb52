//! Encoding parameter policy.
//!
//! Picks one of two fixed argument profiles from the source filename's
//! extension. QuickTime sources get a baseline-profile encode that strict
//! players accept; everything else gets a speed-tuned encode.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Output height in pixels; width follows the aspect ratio (rounded to even).
pub const OUTPUT_HEIGHT: u32 = 720;

/// Output frame rate.
pub const OUTPUT_FPS: u32 = 15;

/// Constant rate factor used by both profiles.
pub const CRF: u32 = 26;

/// A named set of encoding arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodingProfile {
    /// H.264 baseline, level 3.0, `medium` preset.
    QuickTime,
    /// `ultrafast` preset, zero-latency tuning, expensive coding tools disabled.
    Fast,
}

impl EncodingProfile {
    /// Selects a profile from a filename. `.mov` (any case) is QuickTime.
    pub fn for_filename(filename: &str) -> Self {
        let is_mov = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("mov"));

        if is_mov {
            Self::QuickTime
        } else {
            Self::Fast
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::QuickTime => "quicktime",
            Self::Fast => "fast",
        }
    }

    /// Builds the engine argument vector for this profile.
    pub fn arguments(&self, input: &str, output: &str) -> Vec<String> {
        let mut args: Vec<String> = vec!["-i".to_string(), input.to_string()];

        args.extend(
            [
                "-c:v", "libx264", "-c:a", "aac", "-tag:v", "avc1", "-movflags", "faststart",
                "-crf",
            ]
            .map(String::from),
        );
        args.push(CRF.to_string());

        match self {
            Self::QuickTime => args.extend(
                ["-preset", "medium", "-profile:v", "baseline", "-level", "3.0"].map(String::from),
            ),
            Self::Fast => args.extend(
                ["-preset", "ultrafast", "-tune", "zerolatency"].map(String::from),
            ),
        }

        args.push("-vf".to_string());
        args.push(format!("scale=-2:{}", OUTPUT_HEIGHT));
        args.push("-r".to_string());
        args.push(OUTPUT_FPS.to_string());
        args.extend(["-threads", "0"].map(String::from));

        match self {
            Self::QuickTime => args.extend(["-pix_fmt", "yuv420p"].map(String::from)),
            Self::Fast => {
                args.extend(["-x264opts", "no-cabac:ref=0:weightp=0:8x8dct=0"].map(String::from))
            }
        }

        args.push("-y".to_string());
        args.push(output.to_string());
        args
    }
}
