//! FFmpeg-backed engine implementation.
//!
//! Each instance owns a private temporary working area created at load time.
//! Executions run the ffmpeg binary inside that area with `-progress pipe:2`,
//! and stderr is turned into progress and log events.

use async_trait::async_trait;
use regex_lite::Regex;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

use super::config::EngineConfig;
use super::error::EngineError;
use super::traits::{EngineFactory, TranscodeEngine};
use super::types::{CoreLocation, EngineEvent};

/// Number of trailing stderr lines kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// Capacity of the event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Tracks ffmpeg's reported input duration and output time to derive a
/// progress fraction.
struct ProgressTracker {
    duration_secs: Option<f64>,
    duration_regex: Option<Regex>,
    time_regex: Option<Regex>,
}

impl ProgressTracker {
    fn new() -> Self {
        Self {
            duration_secs: None,
            duration_regex: Regex::new(r"Duration: (\d+):(\d{2}):(\d{2}(?:\.\d+)?)").ok(),
            time_regex: Regex::new(r"^out_time_us=(\d+)").ok(),
        }
    }

    /// Observes one stderr line, returning a progress fraction if the line
    /// carries one.
    fn observe(&mut self, line: &str) -> Option<f64> {
        let line = line.trim();

        if self.duration_secs.is_none() {
            if let Some(ref re) = self.duration_regex {
                if let Some(caps) = re.captures(line) {
                    let hours = caps.get(1)?.as_str().parse::<f64>().ok()?;
                    let minutes = caps.get(2)?.as_str().parse::<f64>().ok()?;
                    let seconds = caps.get(3)?.as_str().parse::<f64>().ok()?;
                    self.duration_secs = Some(hours * 3600.0 + minutes * 60.0 + seconds);
                    return None;
                }
            }
        }

        if line == "progress=end" {
            return Some(1.0);
        }

        let re = self.time_regex.as_ref()?;
        let caps = re.captures(line)?;
        let micros = caps.get(1)?.as_str().parse::<f64>().ok()?;
        match self.duration_secs {
            Some(duration) if duration > 0.0 => Some(micros / 1_000_000.0 / duration),
            _ => None,
        }
    }
}

/// Native FFmpeg process binding.
pub struct FfmpegEngine {
    config: EngineConfig,
    core: RwLock<Option<PathBuf>>,
    workspace: RwLock<Option<TempDir>>,
    terminated: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
    events: broadcast::Sender<EngineEvent>,
}

impl FfmpegEngine {
    /// Creates an unloaded engine instance.
    pub fn new(config: EngineConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            config,
            core: RwLock::new(None),
            workspace: RwLock::new(None),
            terminated: AtomicBool::new(false),
            shutdown_tx,
            events,
        }
    }

    /// Resolves a logical working-file name inside the working area.
    async fn resolve(&self, name: &str) -> Result<PathBuf, EngineError> {
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(EngineError::io(format!("invalid working file name: {:?}", name)));
        }

        match self.workspace.read().await.as_ref() {
            Some(dir) => Ok(dir.path().join(name)),
            None => Err(EngineError::io("engine is not loaded")),
        }
    }

    async fn working_dir(&self) -> Option<PathBuf> {
        self.workspace
            .read()
            .await
            .as_ref()
            .map(|dir| dir.path().to_path_buf())
    }
}

#[async_trait]
impl TranscodeEngine for FfmpegEngine {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn load(&self, core: &CoreLocation) -> Result<(), EngineError> {
        if self.terminated.load(Ordering::SeqCst) {
            return Err(EngineError::load("engine instance was terminated"));
        }

        let output = Command::new(core.as_str())
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EngineError::load(format!("engine core not found at {}", core))
                } else {
                    EngineError::load(format!("failed to start engine core: {}", e))
                }
            })?;

        if !output.status.success() {
            return Err(EngineError::load(format!(
                "engine core exited with code: {:?}",
                output.status.code()
            )));
        }

        tokio::fs::create_dir_all(&self.config.work_dir)
            .await
            .map_err(|e| EngineError::load(format!("failed to create work dir: {}", e)))?;

        let dir = tempfile::Builder::new()
            .prefix("engine-")
            .tempdir_in(&self.config.work_dir)
            .map_err(|e| EngineError::load(format!("failed to create working area: {}", e)))?;

        debug!("Engine working area at {:?}", dir.path());
        *self.core.write().await = Some(PathBuf::from(core.as_str()));
        *self.workspace.write().await = Some(dir);

        // terminate() may have run while we were probing the core
        if self.terminated.load(Ordering::SeqCst) {
            self.workspace.write().await.take();
            return Err(EngineError::load("engine instance was terminated"));
        }

        Ok(())
    }

    async fn write_input(&self, name: &str, bytes: &[u8]) -> Result<(), EngineError> {
        let path = self.resolve(name).await?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| EngineError::io(format!("failed to stage {}: {}", name, e)))
    }

    async fn execute(&self, args: &[String]) -> Result<(), EngineError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        if self.terminated.load(Ordering::SeqCst) {
            return Err(EngineError::execution("engine instance was terminated", None));
        }

        let core = self
            .core
            .read()
            .await
            .clone()
            .ok_or_else(|| EngineError::execution("engine is not loaded", None))?;
        let dir = self
            .working_dir()
            .await
            .ok_or_else(|| EngineError::execution("engine is not loaded", None))?;

        let mut child = Command::new(&core)
            .args(["-hide_banner", "-nostdin", "-loglevel"])
            .arg(&self.config.log_level)
            .args(["-progress", "pipe:2"])
            .args(args)
            .current_dir(&dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::execution(format!("failed to spawn engine: {}", e), None))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::execution("engine stderr was not captured", None))?;
        let mut lines = BufReader::new(stderr).lines();

        let mut tracker = ProgressTracker::new();
        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    let _ = child.kill().await;
                    return Err(EngineError::execution("execution terminated", None));
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if let Some(fraction) = tracker.observe(&line) {
                            let _ = self.events.send(EngineEvent::Progress(fraction));
                        }
                        if tail.len() == STDERR_TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(line.clone());
                        let _ = self.events.send(EngineEvent::Log(line));
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Failed to read engine output: {}", e);
                        break;
                    }
                }
            }
        }

        let status = tokio::select! {
            _ = shutdown_rx.recv() => {
                let _ = child.kill().await;
                return Err(EngineError::execution("execution terminated", None));
            }
            status = child.wait() => status
                .map_err(|e| EngineError::execution(format!("failed to wait for engine: {}", e), None))?,
        };

        if !status.success() {
            let stderr = Vec::from(tail).join("\n");
            return Err(EngineError::execution(
                format!("engine exited with code: {:?}", status.code()),
                if stderr.is_empty() { None } else { Some(stderr) },
            ));
        }

        Ok(())
    }

    async fn read_output(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        let path = self.resolve(name).await?;
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EngineError::io(format!("output {} does not exist", name))
            } else {
                EngineError::io(format!("failed to read {}: {}", name, e))
            }
        })
    }

    async fn terminate(&self) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }

        // Nobody listening just means no execution is in flight
        let _ = self.shutdown_tx.send(());

        self.core.write().await.take();
        if let Some(dir) = self.workspace.write().await.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!("Failed to remove engine working area {:?}: {}", path, e);
            }
        }

        debug!("Engine instance terminated");
    }

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }
}

/// Creates `FfmpegEngine` instances sharing one configuration.
#[derive(Debug, Clone)]
pub struct FfmpegEngineFactory {
    config: EngineConfig,
}

impl FfmpegEngineFactory {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

impl EngineFactory for FfmpegEngineFactory {
    fn create(&self) -> Arc<dyn TranscodeEngine> {
        Arc::new(FfmpegEngine::new(self.config.clone()))
    }
}
