//! Transcode engine binding.
//!
//! This module wraps a single external transcoding engine instance behind the
//! `TranscodeEngine` trait. The trait exposes exactly the capabilities the job
//! controller orchestrates:
//!
//! - `load` the engine core
//! - `write_input` / `read_output` against a private working area
//! - `execute` one encoding invocation
//! - `terminate` the instance (idempotent)
//! - `subscribe` to progress and log events
//!
//! An instance is single-use: once terminated it must be discarded and a fresh
//! one obtained from an `EngineFactory`.
//!
//! # Example
//!
//! ```ignore
//! use squeeze_core::engine::{CoreLocation, EngineConfig, EngineFactory, FfmpegEngineFactory};
//!
//! let factory = FfmpegEngineFactory::new(EngineConfig::default());
//! let engine = factory.create();
//! engine.load(&CoreLocation::new("/usr/bin/ffmpeg")).await?;
//! engine.write_input("input.mp4", &bytes).await?;
//! engine.execute(&args).await?;
//! let output = engine.read_output("output.mp4").await?;
//! engine.terminate().await;
//! ```

mod config;
mod error;
mod ffmpeg;
mod traits;
mod types;

pub use config::EngineConfig;
pub use error::EngineError;
pub use ffmpeg::{FfmpegEngine, FfmpegEngineFactory};
pub use traits::{EngineFactory, TranscodeEngine};
pub use types::{CoreLocation, EngineEvent, LoadState};
