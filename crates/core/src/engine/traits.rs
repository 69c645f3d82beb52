//! Trait definitions for the engine binding.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

use super::error::EngineError;
use super::types::{CoreLocation, EngineEvent};

/// A single, stateful transcoding engine instance.
///
/// After `terminate` the instance must be discarded; no further calls are
/// valid on it.
#[async_trait]
pub trait TranscodeEngine: Send + Sync {
    /// Returns the name of this engine implementation.
    fn name(&self) -> &str;

    /// Loads the engine core. Progress and log events are emitted for every
    /// subsequent execution until `terminate`.
    async fn load(&self, core: &CoreLocation) -> Result<(), EngineError>;

    /// Stages input bytes under a logical name in the private working area.
    ///
    /// Fails with `EngineError::Io` if the engine is not loaded.
    async fn write_input(&self, name: &str, bytes: &[u8]) -> Result<(), EngineError>;

    /// Runs one encoding invocation to completion or failure.
    async fn execute(&self, args: &[String]) -> Result<(), EngineError>;

    /// Retrieves bytes produced by a previous execution.
    ///
    /// Fails with `EngineError::Io` if the named output does not exist.
    async fn read_output(&self, name: &str) -> Result<Vec<u8>, EngineError>;

    /// Forcibly stops any in-flight execution and frees the instance.
    ///
    /// Terminating a terminated or never-loaded engine is a no-op.
    async fn terminate(&self);

    /// Subscribes to the progress and log event streams.
    fn subscribe(&self) -> broadcast::Receiver<EngineEvent>;
}

/// Creates fresh engine instances.
///
/// The controller discards its instance after every terminal job outcome and
/// asks the factory for a new one.
pub trait EngineFactory: Send + Sync {
    fn create(&self) -> Arc<dyn TranscodeEngine>;
}
