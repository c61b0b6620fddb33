#![allow(dead_code)]

use async_trait::async_trait;
use integration_flows::adapter::{Adapter, AdapterError, AdapterMode, AdapterOperationResult, AdapterType};
use integration_flows::engine::AdapterExecutionResult;
use integration_flows::workflow::{AdapterExecutionContext, OrchestrationTarget, RetryPolicy};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;

pub fn create_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

pub fn write_file(dir: &Path, filename: &str, content: &str) {
    fs::write(dir.join(filename), content).expect("Failed to write test file");
}

/// One scripted response of a mock adapter
#[derive(Debug, Clone)]
pub enum Reply {
    Respond(Value),
    /// Transient failure (CONNECTION_FAILED)
    Fail(String),
    /// Configuration failure, never retried
    Reject(String),
}

/// Adapter whose executions follow a script and are recorded
pub struct ScriptedAdapter {
    name: String,
    mode: AdapterMode,
    initialized: AtomicBool,
    healthy: AtomicBool,
    fail_initialize: bool,
    fail_shutdown: bool,
    delay: Duration,
    script: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<AdapterExecutionContext>>,
    started: Mutex<Vec<Instant>>,
    shutdowns: AtomicUsize,
}

impl ScriptedAdapter {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            mode: AdapterMode::Outbound,
            initialized: AtomicBool::new(true),
            healthy: AtomicBool::new(true),
            fail_initialize: false,
            fail_shutdown: false,
            delay: Duration::ZERO,
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            started: Mutex::new(Vec::new()),
            shutdowns: AtomicUsize::new(0),
        }
    }

    pub fn uninitialized(mut self) -> Self {
        self.initialized = AtomicBool::new(false);
        self
    }

    pub fn with_mode(mut self, mode: AdapterMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_initialize(mut self) -> Self {
        self.fail_initialize = true;
        self
    }

    pub fn failing_shutdown(mut self) -> Self {
        self.fail_shutdown = true;
        self
    }

    pub fn unhealthy(self) -> Self {
        self.healthy.store(false, Ordering::SeqCst);
        self
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn then(self, reply: Reply) -> Self {
        self.script.lock().unwrap().push_back(reply);
        self
    }

    pub fn always_fail(self, times: usize, message: &str) -> Self {
        for _ in 0..times {
            self.script.lock().unwrap().push_back(Reply::Fail(message.to_string()));
        }
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<AdapterExecutionContext> {
        self.calls.lock().unwrap().clone()
    }

    pub fn started_at(&self) -> Vec<Instant> {
        self.started.lock().unwrap().clone()
    }

    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Adapter for ScriptedAdapter {
    fn adapter_type(&self) -> AdapterType {
        AdapterType::Rest
    }

    fn mode(&self) -> AdapterMode {
        self.mode
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    async fn initialize(&self) -> Result<(), AdapterError> {
        if self.fail_initialize {
            return Err(AdapterError::ConnectionFailed(format!("{} refused connection", self.name)));
        }
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn test_connection(&self) -> AdapterOperationResult {
        if self.healthy.load(Ordering::SeqCst) {
            AdapterOperationResult::success(format!("{} is reachable", self.name))
        } else {
            AdapterOperationResult::failure(format!("{} is unreachable", self.name))
        }
    }

    async fn execute(&self, ctx: &AdapterExecutionContext) -> Result<AdapterExecutionResult, AdapterError> {
        self.started.lock().unwrap().push(Instant::now());
        self.calls.lock().unwrap().push(ctx.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let reply = self.script.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Respond(value)) => Ok(AdapterExecutionResult::success(ctx, value)),
            Some(Reply::Fail(message)) => Err(AdapterError::ConnectionFailed(message)),
            Some(Reply::Reject(message)) => Err(AdapterError::Configuration(message)),
            None => Ok(AdapterExecutionResult::success(
                ctx,
                json!({ "adapter": self.name, "received": ctx.input }),
            )),
        }
    }

    async fn shutdown(&self) -> Result<(), AdapterError> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        self.initialized.store(false, Ordering::SeqCst);
        if self.fail_shutdown {
            return Err(AdapterError::ConnectionFailed(format!("{} hung up", self.name)));
        }
        Ok(())
    }
}

/// Adapter lookup over scripted adapters
pub fn adapters(entries: &[(&str, &Arc<ScriptedAdapter>)]) -> Arc<HashMap<String, Arc<dyn Adapter>>> {
    Arc::new(
        entries
            .iter()
            .map(|(id, adapter)| (id.to_string(), Arc::clone(adapter) as Arc<dyn Adapter>))
            .collect(),
    )
}

/// A target with fast, deterministic retries
pub fn target(id: &str, adapter_id: &str, order: i32) -> OrchestrationTarget {
    let mut target = OrchestrationTarget::new(id, adapter_id);
    target.execution_order = order;
    target.retry_policy = RetryPolicy {
        max_attempts: 1,
        retry_delay_ms: 10,
        backoff_multiplier: 1.0,
        max_retry_delay_ms: 10,
        retry_on_errors: Vec::new(),
    };
    target
}

pub fn parallel_target(id: &str, adapter_id: &str, order: i32) -> OrchestrationTarget {
    let mut target = target(id, adapter_id, order);
    target.parallel = true;
    target
}
