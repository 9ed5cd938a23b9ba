#![allow(dead_code)]

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use shotrun_core::api::{
    AttemptRequest, AutomationPlatform, ExecutionContext, ExecutionError, ExecutionResult,
    ExecutorOptions, OutputOptions, PhaseTimings, PlatformHandle, RunConfig, Task, TaskExecutor,
    TaskPayload,
};

/// Route `tracing` output through the test harness; `RUST_LOG` selects levels.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn task(path: &str, cost: u64) -> Task {
    Task::new(path, path, TaskPayload::new(format!("http://localhost:6006/{path}")))
        .with_estimated_cost(cost)
}

pub fn quiet_config(workers: i64) -> RunConfig {
    RunConfig {
        workers: Some(workers),
        output: OutputOptions {
            quiet: true,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Lifecycle counters shared by a fake platform and its contexts.
#[derive(Debug, Default)]
pub struct PlatformStats {
    pub launches: AtomicUsize,
    pub shutdowns: AtomicUsize,
    pub created: AtomicUsize,
    pub closed: AtomicUsize,
    pub resets: AtomicUsize,
}

impl PlatformStats {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

pub struct FakeContext {
    id: String,
    stats: Arc<PlatformStats>,
}

#[async_trait]
impl ExecutionContext for FakeContext {
    fn id(&self) -> &str {
        &self.id
    }

    async fn reset(&mut self) -> anyhow::Result<()> {
        self.stats.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub struct FakeHandle {
    stats: Arc<PlatformStats>,
    fail_contexts: bool,
}

#[async_trait]
impl PlatformHandle for FakeHandle {
    async fn new_context(&self, worker_id: usize) -> anyhow::Result<Box<dyn ExecutionContext>> {
        if self.fail_contexts {
            anyhow::bail!("browser refused a new context");
        }
        let n = self.stats.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeContext {
            id: format!("w{worker_id}-ctx{n}"),
            stats: self.stats.clone(),
        }))
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        self.stats.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakePlatform {
    pub stats: Arc<PlatformStats>,
    pub fail_launch: bool,
    pub fail_contexts: bool,
}

impl FakePlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl AutomationPlatform for FakePlatform {
    fn name(&self) -> &str {
        "fake"
    }

    async fn launch(&self, _options: &ExecutorOptions) -> anyhow::Result<Arc<dyn PlatformHandle>> {
        self.stats.launches.fetch_add(1, Ordering::SeqCst);
        if self.fail_launch {
            anyhow::bail!("chromium not found");
        }
        Ok(Arc::new(FakeHandle {
            stats: self.stats.clone(),
            fail_contexts: self.fail_contexts,
        }))
    }
}

/// What the scripted executor does with a given path.
#[derive(Debug, Clone, Copy)]
pub enum Script {
    /// Fail attempts `1..=n`, then succeed.
    FailFirst(u32),
    /// Fail every attempt.
    AlwaysFail,
    /// Panic on attempts `1..=n`, then succeed.
    PanicFirst(u32),
    /// Never return within any reasonable timeout.
    Hang,
}

/// Executor that logs `(path, attempt)` per call and follows per-path scripts.
#[derive(Default)]
pub struct ScriptedExecutor {
    pub scripts: HashMap<String, Script>,
    pub delay: Duration,
    pub calls: Mutex<Vec<(String, u32)>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, path: &str, script: Script) -> Self {
        self.scripts.insert(path.to_string(), script);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<(String, u32)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_labels(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .map(|(path, attempt)| format!("{path}:{attempt}"))
            .collect()
    }
}

#[async_trait]
impl TaskExecutor for ScriptedExecutor {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn execute(
        &self,
        _context: &mut dyn ExecutionContext,
        request: AttemptRequest<'_>,
    ) -> Result<ExecutionResult, ExecutionError> {
        let path = request.task.path().to_string();
        self.calls
            .lock()
            .unwrap()
            .push((path.clone(), request.attempt));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match self.scripts.get(&path).copied() {
            Some(Script::FailFirst(n)) if request.attempt <= n => {
                return Err(ExecutionError::failed(format!(
                    "navigation to {path} failed on attempt {}",
                    request.attempt
                )));
            }
            Some(Script::AlwaysFail) => {
                return Err(ExecutionError::failed(format!("{path} is broken")));
            }
            Some(Script::PanicFirst(n)) if request.attempt <= n => {
                panic!("executor blew up on {path}");
            }
            Some(Script::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            _ => {}
        }

        Ok(ExecutionResult {
            worker_id: request.worker_id,
            attempt: request.attempt,
            screenshot_count: 1,
            timings: PhaseTimings {
                navigation_ms: 5.0,
                ready_wait_ms: 2.0,
                initial_capture_ms: 3.0,
                ..Default::default()
            },
        })
    }
}
