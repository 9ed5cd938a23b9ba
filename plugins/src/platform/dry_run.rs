//! Simulated captures: no browser, no helper, just cost-proportional sleeps.
//! Useful for rehearsing worker counts and retry policy on a task list.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use shotrun_core::api::{
    AttemptRequest, AutomationPlatform, DryRunPlatformConfig, ExecutionContext, ExecutionError,
    ExecutionResult, ExecutorOptions, PhaseTimings, PlatformHandle, TaskExecutor,
};

#[derive(Default)]
pub struct DryRunPlatform;

#[async_trait]
impl AutomationPlatform for DryRunPlatform {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn launch(&self, _options: &ExecutorOptions) -> Result<Arc<dyn PlatformHandle>> {
        Ok(Arc::new(DryRunHandle {
            next_id: AtomicUsize::new(0),
        }))
    }
}

struct DryRunHandle {
    next_id: AtomicUsize,
}

#[async_trait]
impl PlatformHandle for DryRunHandle {
    async fn new_context(&self, worker_id: usize) -> Result<Box<dyn ExecutionContext>> {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(MemoryContext {
            id: format!("w{worker_id}-m{n}"),
            visited: Vec::new(),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// In-memory stand-in for a browser context: remembers what it has visited
/// since the last reset.
pub struct MemoryContext {
    id: String,
    visited: Vec<String>,
}

impl MemoryContext {
    pub fn visited(&self) -> &[String] {
        &self.visited
    }
}

#[async_trait]
impl ExecutionContext for MemoryContext {
    fn id(&self) -> &str {
        &self.id
    }

    async fn reset(&mut self) -> Result<()> {
        self.visited.clear();
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.visited.clear();
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

pub struct DryRunExecutor {
    ms_per_cost: f64,
    fail_paths: HashSet<String>,
    fail_attempts: u32,
}

impl DryRunExecutor {
    pub fn new(cfg: &DryRunPlatformConfig) -> Self {
        Self {
            ms_per_cost: cfg.ms_per_cost.max(0.0),
            fail_paths: cfg.fail_paths.iter().cloned().collect(),
            fail_attempts: cfg.fail_attempts,
        }
    }

    fn simulated_ms(&self, cost: u64) -> f64 {
        let ms = cost as f64 * self.ms_per_cost;
        if ms.is_finite() {
            ms
        } else {
            0.0
        }
    }
}

#[async_trait]
impl TaskExecutor for DryRunExecutor {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn execute(
        &self,
        context: &mut dyn ExecutionContext,
        request: AttemptRequest<'_>,
    ) -> Result<ExecutionResult, ExecutionError> {
        let task = request.task;
        let total_ms = self.simulated_ms(task.estimated_cost());
        tokio::time::sleep(Duration::from_secs_f64(total_ms / 1000.0)).await;

        if let Some(ctx) = context.as_any_mut().downcast_mut::<MemoryContext>() {
            ctx.visited.push(task.payload().url.clone());
        }

        if self.fail_paths.contains(task.path()) && request.attempt <= self.fail_attempts {
            return Err(ExecutionError::failed(format!(
                "simulated failure for {} (attempt {})",
                task.path(),
                request.attempt
            )));
        }

        let payload = task.payload();
        let initial = u32::from(!payload.skip_initial_screenshot);
        let steps_share = if payload.steps.is_empty() { 0.0 } else { 0.2 };

        Ok(ExecutionResult {
            worker_id: request.worker_id,
            attempt: request.attempt,
            screenshot_count: initial + payload.steps.len() as u32,
            timings: PhaseTimings {
                total_ms,
                navigation_ms: total_ms * 0.4,
                ready_wait_ms: total_ms * 0.2,
                settle_wait_ms: total_ms * 0.1,
                initial_capture_ms: total_ms * (0.3 - steps_share / 2.0),
                steps_ms: total_ms * steps_share,
                ..Default::default()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shotrun_core::api::{Task, TaskPayload};

    fn request<'a>(task: &'a Task, attempt: u32, options: &'a ExecutorOptions) -> AttemptRequest<'a> {
        AttemptRequest {
            task,
            attempt,
            worker_id: 1,
            options,
        }
    }

    #[tokio::test]
    async fn counts_screenshots_per_step() {
        let handle = DryRunPlatform.launch(&ExecutorOptions::default()).await.unwrap();
        let mut ctx = handle.new_context(1).await.unwrap();
        let executor = DryRunExecutor::new(&DryRunPlatformConfig {
            ms_per_cost: 0.0,
            ..Default::default()
        });

        let mut payload = TaskPayload::new("http://localhost/menu");
        payload.steps = vec![json!({"click": "#open"}), json!({"hover": "li"})];
        let task = Task::new("menu", "components/menu", payload);
        let options = ExecutorOptions::default();

        let result = executor
            .execute(&mut *ctx, request(&task, 1, &options))
            .await
            .unwrap();
        assert_eq!(result.screenshot_count, 3);

        let mem = ctx.as_any_mut().downcast_mut::<MemoryContext>().unwrap();
        assert_eq!(mem.visited(), ["http://localhost/menu".to_string()]);
        ctx.reset().await.unwrap();
    }

    #[tokio::test]
    async fn injected_failures_stop_after_fail_attempts() {
        let handle = DryRunPlatform.launch(&ExecutorOptions::default()).await.unwrap();
        let mut ctx = handle.new_context(1).await.unwrap();
        let executor = DryRunExecutor::new(&DryRunPlatformConfig {
            ms_per_cost: 0.0,
            fail_paths: vec!["flaky".to_string()],
            fail_attempts: 1,
        });
        let task = Task::new("flaky", "flaky", TaskPayload::new("http://localhost/flaky"));
        let options = ExecutorOptions::default();

        let err = executor
            .execute(&mut *ctx, request(&task, 1, &options))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "simulated failure for flaky (attempt 1)");

        assert!(executor
            .execute(&mut *ctx, request(&task, 2, &options))
            .await
            .is_ok());
    }

    #[test]
    fn simulated_time_scales_with_cost() {
        let executor = DryRunExecutor::new(&DryRunPlatformConfig {
            ms_per_cost: 0.5,
            ..Default::default()
        });
        assert_eq!(executor.simulated_ms(200), 100.0);
    }
}
