//! Mock transcode engine for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, watch};

use crate::engine::{CoreLocation, EngineError, EngineEvent, EngineFactory, TranscodeEngine};

/// Scripted behavior for mock engine instances.
#[derive(Debug, Clone)]
pub struct MockEngineBehavior {
    /// If set, `load` fails with this reason.
    pub load_failure: Option<String>,
    /// Simulated load time.
    pub load_delay: Duration,
    /// Progress fractions emitted during `execute`, one per step.
    pub progress_steps: Vec<f64>,
    /// Delay before each progress step.
    pub step_delay: Duration,
    /// After the progress steps, block until `terminate` is called.
    pub hang_until_terminated: bool,
    /// If set, `execute` fails with this reason after the progress steps.
    pub execute_failure: Option<String>,
    /// Bytes written to the output named by the last argument. `None` means
    /// the execution produces no output.
    pub output: Option<Vec<u8>>,
}

impl Default for MockEngineBehavior {
    fn default() -> Self {
        Self {
            load_failure: None,
            load_delay: Duration::ZERO,
            progress_steps: vec![0.25, 0.5, 0.75, 1.0],
            step_delay: Duration::from_millis(5),
            hang_until_terminated: false,
            execute_failure: None,
            output: Some(vec![0u8; 256]),
        }
    }
}

/// Mock implementation of the TranscodeEngine trait.
///
/// Emits the scripted progress, records staged inputs and executed argument
/// vectors, and honors `terminate` at every step.
#[derive(Debug)]
pub struct MockEngine {
    behavior: MockEngineBehavior,
    events: broadcast::Sender<EngineEvent>,
    terminated_tx: watch::Sender<bool>,
    loaded: AtomicBool,
    load_count: AtomicUsize,
    terminate_count: AtomicUsize,
    inputs: Mutex<Vec<(String, usize)>>,
    executions: Mutex<Vec<Vec<String>>>,
    outputs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MockEngine {
    pub fn new(behavior: MockEngineBehavior) -> Self {
        let (events, _) = broadcast::channel(256);
        let (terminated_tx, _) = watch::channel(false);
        Self {
            behavior,
            events,
            terminated_tx,
            loaded: AtomicBool::new(false),
            load_count: AtomicUsize::new(0),
            terminate_count: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
            executions: Mutex::new(Vec::new()),
            outputs: Mutex::new(HashMap::new()),
        }
    }

    pub fn load_count(&self) -> usize {
        self.load_count.load(Ordering::SeqCst)
    }

    /// Number of `terminate` calls, including repeated ones.
    pub fn terminate_count(&self) -> usize {
        self.terminate_count.load(Ordering::SeqCst)
    }

    pub fn is_terminated(&self) -> bool {
        *self.terminated_tx.borrow()
    }

    /// Staged inputs as `(name, size)`.
    pub fn inputs(&self) -> Vec<(String, usize)> {
        lock(&self.inputs).clone()
    }

    /// Argument vectors passed to `execute`.
    pub fn executions(&self) -> Vec<Vec<String>> {
        lock(&self.executions).clone()
    }

    /// Injects an event as if the engine had produced it.
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }

    fn ensure_usable(&self) -> Result<(), EngineError> {
        if self.is_terminated() {
            return Err(EngineError::io("engine has been terminated"));
        }
        if !self.loaded.load(Ordering::SeqCst) {
            return Err(EngineError::io("engine is not loaded"));
        }
        Ok(())
    }
}

async fn wait_terminated(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|terminated| *terminated).await;
}

#[async_trait]
impl TranscodeEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn load(&self, _core: &CoreLocation) -> Result<(), EngineError> {
        self.load_count.fetch_add(1, Ordering::SeqCst);

        if !self.behavior.load_delay.is_zero() {
            tokio::time::sleep(self.behavior.load_delay).await;
        }
        if self.is_terminated() {
            return Err(EngineError::load("terminated during load"));
        }
        if let Some(reason) = &self.behavior.load_failure {
            return Err(EngineError::load(reason.clone()));
        }

        self.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn write_input(&self, name: &str, bytes: &[u8]) -> Result<(), EngineError> {
        self.ensure_usable()?;
        lock(&self.inputs).push((name.to_string(), bytes.len()));
        Ok(())
    }

    async fn execute(&self, args: &[String]) -> Result<(), EngineError> {
        self.ensure_usable()
            .map_err(|e| EngineError::execution(e.to_string(), None))?;
        lock(&self.executions).push(args.to_vec());

        let mut terminated = self.terminated_tx.subscribe();
        for step in &self.behavior.progress_steps {
            tokio::select! {
                _ = tokio::time::sleep(self.behavior.step_delay) => {}
                _ = wait_terminated(&mut terminated) => {
                    return Err(EngineError::execution("terminated", None));
                }
            }
            let _ = self.events.send(EngineEvent::Progress(*step));
            let _ = self
                .events
                .send(EngineEvent::Log(format!("out_time_fraction={}", step)));
        }

        if self.behavior.hang_until_terminated {
            wait_terminated(&mut terminated).await;
            return Err(EngineError::execution("terminated", None));
        }

        if let Some(reason) = &self.behavior.execute_failure {
            return Err(EngineError::execution(
                reason.clone(),
                Some("Conversion failed!".to_string()),
            ));
        }

        if let (Some(output), Some(name)) = (&self.behavior.output, args.last()) {
            lock(&self.outputs).insert(name.clone(), output.clone());
        }
        Ok(())
    }

    async fn read_output(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        self.ensure_usable()?;
        lock(&self.outputs)
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::io(format!("output not found: {}", name)))
    }

    async fn terminate(&self) {
        self.terminate_count.fetch_add(1, Ordering::SeqCst);
        self.terminated_tx.send_replace(true);
        self.loaded.store(false, Ordering::SeqCst);
    }

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }
}

/// Factory producing scripted mock engines.
///
/// Behavior changes apply to instances created afterwards. Every created
/// instance is kept for assertions.
#[derive(Debug, Default)]
pub struct MockEngineFactory {
    behavior: Mutex<MockEngineBehavior>,
    created: Mutex<Vec<Arc<MockEngine>>>,
}

impl MockEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(behavior: MockEngineBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            created: Mutex::new(Vec::new()),
        }
    }

    /// Replace the behavior for future instances.
    pub fn set_behavior(&self, behavior: MockEngineBehavior) {
        *lock(&self.behavior) = behavior;
    }

    pub fn set_load_failure(&self, reason: Option<&str>) {
        lock(&self.behavior).load_failure = reason.map(String::from);
    }

    pub fn set_load_delay(&self, delay: Duration) {
        lock(&self.behavior).load_delay = delay;
    }

    pub fn set_progress_steps(&self, steps: Vec<f64>) {
        lock(&self.behavior).progress_steps = steps;
    }

    pub fn set_step_delay(&self, delay: Duration) {
        lock(&self.behavior).step_delay = delay;
    }

    pub fn set_hang(&self, hang: bool) {
        lock(&self.behavior).hang_until_terminated = hang;
    }

    pub fn set_execute_failure(&self, reason: Option<&str>) {
        lock(&self.behavior).execute_failure = reason.map(String::from);
    }

    pub fn set_output(&self, output: Option<Vec<u8>>) {
        lock(&self.behavior).output = output;
    }

    pub fn created_count(&self) -> usize {
        lock(&self.created).len()
    }

    /// The instance created `index`-th.
    pub fn engine(&self, index: usize) -> Option<Arc<MockEngine>> {
        lock(&self.created).get(index).cloned()
    }

    /// The most recently created instance.
    pub fn latest(&self) -> Option<Arc<MockEngine>> {
        lock(&self.created).last().cloned()
    }
}

impl EngineFactory for MockEngineFactory {
    fn create(&self) -> Arc<dyn TranscodeEngine> {
        let engine = Arc::new(MockEngine::new(lock(&self.behavior).clone()));
        lock(&self.created).push(Arc::clone(&engine));
        engine
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
