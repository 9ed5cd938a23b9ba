use std::panic::AssertUnwindSafe;
use std::time::Instant;

use chrono::Utc;
use futures::FutureExt;

use crate::error::ExecutionError;

use super::collector::ResultCollector;
use super::queue::TaskQueue;
use super::session::SessionManager;
use super::traits::{AttemptRequest, TaskExecutor};
use super::types::{
    ExecutionResult, FailureRecord, IsolationMode, QueueItem, RecycleRecord, RetryRecord,
    RunConfig, SuccessRecord,
};
use super::util::{elapsed_ms, panic_message};

/// Per-worker tallies, owned by the loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerCounters {
    /// Successes since the shared context was last (re)created.
    pub since_last_recycle: u32,
    pub attempts: u32,
    pub successes: u32,
    pub retries: u32,
    pub failures: u32,
    pub recycles: u32,
}

/// Shared collaborators a worker loop runs against.
#[derive(Clone, Copy)]
pub struct WorkerContext<'a> {
    pub queue: &'a TaskQueue,
    pub collector: &'a ResultCollector,
    pub executor: &'a dyn TaskExecutor,
    pub config: &'a RunConfig,
}

pub struct WorkerLoop {
    worker_id: usize,
    session: SessionManager,
    counters: WorkerCounters,
}

impl WorkerLoop {
    pub fn new(worker_id: usize, session: SessionManager) -> Self {
        Self {
            worker_id,
            session,
            counters: WorkerCounters::default(),
        }
    }

    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    pub fn counters(&self) -> WorkerCounters {
        self.counters
    }

    pub fn session_mut(&mut self) -> &mut SessionManager {
        &mut self.session
    }

    /// Pull items until the queue is drained.
    pub async fn run(&mut self, ctx: WorkerContext<'_>) -> WorkerCounters {
        tracing::debug!(target: "shotrun.worker", worker_id = self.worker_id, "worker loop started");

        while let Some(item) = ctx.queue.get_next_task() {
            let queue_wait_ms = elapsed_ms(item.enqueued_at);
            ctx.collector.attempt_started(self.worker_id, &item);
            self.counters.attempts += 1;

            let attempt_started = Instant::now();
            let result = self.attempt(&item, ctx).await;
            let attempt_ms = elapsed_ms(attempt_started);

            match result {
                Ok(result) => self.on_success(&item, result, queue_wait_ms, attempt_ms, ctx).await,
                Err(err) => self.on_failure(&item, err, queue_wait_ms, attempt_ms, ctx),
            }
        }

        ctx.collector.worker_finished(self.worker_id);
        tracing::debug!(
            target: "shotrun.worker",
            worker_id = self.worker_id,
            attempts = self.counters.attempts,
            "worker loop drained"
        );
        self.counters
    }

    /// One attempt: lease a context, run the executor, always give the
    /// context back. Panics and the optional timeout become attempt errors.
    async fn attempt(
        &mut self,
        item: &QueueItem,
        ctx: WorkerContext<'_>,
    ) -> Result<ExecutionResult, ExecutionError> {
        let started = Instant::now();
        let mut lease = self.session.acquire().await?;
        let acquire_ms = lease.acquire_ms();
        let reset_ms = lease.reset_ms();

        let request = AttemptRequest {
            task: &item.task,
            attempt: item.attempt,
            worker_id: self.worker_id,
            options: &ctx.config.executor,
        };
        let call = AssertUnwindSafe(ctx.executor.execute(lease.handle(), request)).catch_unwind();

        let outcome = match ctx.config.attempt_timeout() {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(caught) => caught,
                Err(_) => Ok(Err(ExecutionError::TimedOut(limit.as_millis() as u64))),
            },
            None => call.await,
        };
        let outcome = outcome
            .unwrap_or_else(|payload| Err(ExecutionError::Panicked(panic_message(payload.as_ref()))));

        lease.cleanup().await;

        if matches!(outcome, Err(ExecutionError::TimedOut(_)))
            && self.session.mode() == IsolationMode::Fast
        {
            tracing::warn!(
                target: "shotrun.session",
                worker_id = self.worker_id,
                path = item.path(),
                "attempt timed out, dropping shared context"
            );
            self.session.invalidate().await;
        }

        outcome.map(|mut result| {
            result.worker_id = self.worker_id;
            result.attempt = item.attempt;
            result.timings.session_acquire_ms = acquire_ms;
            result.timings.reset_ms = reset_ms;
            result.timings.total_ms = elapsed_ms(started);
            result.timings = result.timings.sanitized();
            result
        })
    }

    async fn on_success(
        &mut self,
        item: &QueueItem,
        result: ExecutionResult,
        queue_wait_ms: f64,
        attempt_ms: f64,
        ctx: WorkerContext<'_>,
    ) {
        self.counters.successes += 1;
        self.counters.since_last_recycle += 1;

        ctx.collector.record_success(SuccessRecord {
            task_id: item.task.id().to_string(),
            path: item.path().to_string(),
            worker_id: self.worker_id,
            attempt: item.attempt,
            queue_type: item.queue_type,
            queue_wait_ms,
            attempt_ms,
            screenshot_count: result.screenshot_count,
            timings: result.timings,
            timestamp: Utc::now(),
        });

        if ctx.config.recycle_due(self.counters.since_last_recycle) {
            self.recycle(item, ctx).await;
        }
    }

    fn on_failure(
        &mut self,
        item: &QueueItem,
        err: ExecutionError,
        queue_wait_ms: f64,
        attempt_ms: f64,
        ctx: WorkerContext<'_>,
    ) {
        let task_id = item.task.id().to_string();
        let path = item.path().to_string();
        let error = err.to_string();
        let error_kind = err.kind().to_string();
        let timestamp = Utc::now();

        if item.attempt <= ctx.config.max_retries {
            self.counters.retries += 1;
            ctx.collector.record_retry(RetryRecord {
                task_id,
                path,
                worker_id: self.worker_id,
                attempt: item.attempt,
                queue_type: item.queue_type,
                queue_wait_ms,
                attempt_ms,
                error,
                error_kind,
                timestamp,
            });
            ctx.queue.enqueue_retry(item);
        } else {
            self.counters.failures += 1;
            ctx.collector.record_failure(FailureRecord {
                task_id,
                path,
                worker_id: self.worker_id,
                attempt: item.attempt,
                queue_type: item.queue_type,
                queue_wait_ms,
                attempt_ms,
                error,
                error_kind,
                timestamp,
            });
        }
    }

    async fn recycle(&mut self, item: &QueueItem, ctx: WorkerContext<'_>) {
        let after_successes = self.counters.since_last_recycle;
        self.counters.since_last_recycle = 0;

        let started = Instant::now();
        match self.session.recycle().await {
            Ok(()) => {
                self.counters.recycles += 1;
                ctx.collector.record_recycle(RecycleRecord {
                    worker_id: self.worker_id,
                    path: item.path().to_string(),
                    after_successes,
                    recycle_ms: elapsed_ms(started),
                    timestamp: Utc::now(),
                });
            }
            Err(e) => {
                // The next acquire re-creates the context lazily.
                tracing::warn!(
                    target: "shotrun.session",
                    worker_id = self.worker_id,
                    error = %e,
                    "recycling shared context failed"
                );
            }
        }
    }
}
