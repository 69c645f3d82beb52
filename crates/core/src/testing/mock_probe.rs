//! Mock duration probe for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::classifier::{DurationProbe, ProbeError, SourceFile};

/// Mock implementation of the DurationProbe trait.
///
/// Durations and failures are configured per filename. Unknown files report
/// the default duration.
///
/// # Example
///
/// ```rust,ignore
/// use squeeze_core::testing::MockDurationProbe;
///
/// let probe = MockDurationProbe::new();
/// probe.set_duration("long.mp4", 75.0).await;
/// probe.set_failure("broken.mp4", ProbeError::unreadable("bad header")).await;
/// ```
#[derive(Debug)]
pub struct MockDurationProbe {
    durations: Arc<RwLock<HashMap<String, f64>>>,
    failures: Arc<RwLock<HashMap<String, ProbeError>>>,
    default_duration: Arc<RwLock<f64>>,
    delay: Arc<RwLock<Duration>>,
    probed: Arc<RwLock<Vec<String>>>,
}

impl Default for MockDurationProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDurationProbe {
    /// Create a probe reporting 10 seconds for every file.
    pub fn new() -> Self {
        Self {
            durations: Arc::new(RwLock::new(HashMap::new())),
            failures: Arc::new(RwLock::new(HashMap::new())),
            default_duration: Arc::new(RwLock::new(10.0)),
            delay: Arc::new(RwLock::new(Duration::ZERO)),
            probed: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Set the duration reported for a filename.
    pub async fn set_duration(&self, name: &str, duration_secs: f64) {
        self.failures.write().await.remove(name);
        self.durations
            .write()
            .await
            .insert(name.to_string(), duration_secs);
    }

    /// Make probing a filename fail.
    pub async fn set_failure(&self, name: &str, error: ProbeError) {
        self.failures.write().await.insert(name.to_string(), error);
    }

    /// Set the duration reported for unconfigured files.
    pub async fn set_default_duration(&self, duration_secs: f64) {
        *self.default_duration.write().await = duration_secs;
    }

    /// Make every probe take this long, like ffprobe on a large upload.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = delay;
    }

    /// Number of probe calls so far.
    pub async fn probe_count(&self) -> usize {
        self.probed.read().await.len()
    }

    /// Filenames probed, in call order.
    pub async fn probed_files(&self) -> Vec<String> {
        self.probed.read().await.clone()
    }
}

#[async_trait]
impl DurationProbe for MockDurationProbe {
    async fn probe_duration(&self, file: &SourceFile) -> Result<f64, ProbeError> {
        self.probed.write().await.push(file.name.clone());

        let delay = *self.delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.failures.read().await.get(&file.name) {
            return Err(error.clone());
        }

        if let Some(duration) = self.durations.read().await.get(&file.name) {
            return Ok(*duration);
        }

        Ok(*self.default_duration.read().await)
    }
}
