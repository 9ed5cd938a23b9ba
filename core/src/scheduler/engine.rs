use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use uuid::Uuid;

use crate::error::SchedulerError;

use super::collector::{prepare_metrics_path, ResultCollector};
use super::plan::{self, SystemFacts};
use super::queue::TaskQueue;
use super::session::SessionManager;
use super::traits::{AutomationPlatform, PlatformHandle, TaskExecutor};
use super::types::{ensure_unique_ids, RunConfig, RunOutcome, Task};
use super::util::panic_message;
use super::worker::{WorkerContext, WorkerLoop};

/// Runs a batch of capture tasks across a pool of workers sharing one
/// launched platform.
pub struct Scheduler {
    platform: Arc<dyn AutomationPlatform>,
    executor: Arc<dyn TaskExecutor>,
    config: RunConfig,
    facts: Option<SystemFacts>,
}

pub struct SchedulerBuilder {
    platform: Arc<dyn AutomationPlatform>,
    executor: Arc<dyn TaskExecutor>,
    config: RunConfig,
    facts: Option<SystemFacts>,
}

impl Scheduler {
    pub fn new(
        platform: Arc<dyn AutomationPlatform>,
        executor: Arc<dyn TaskExecutor>,
        config: RunConfig,
    ) -> Self {
        Self {
            platform,
            executor,
            config,
            facts: None,
        }
    }

    pub fn builder(
        platform: Arc<dyn AutomationPlatform>,
        executor: Arc<dyn TaskExecutor>,
    ) -> SchedulerBuilder {
        SchedulerBuilder::new(platform, executor)
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run every task to a terminal outcome.
    ///
    /// Per-task failures land in [`RunOutcome::failures`]; only invalid input
    /// (an unusable metrics path included) and platform lifecycle errors are
    /// returned as `Err`.
    pub async fn run(&self, tasks: Vec<Task>) -> Result<RunOutcome, SchedulerError> {
        self.config.validate()?;
        ensure_unique_ids(&tasks)?;
        if let Some(path) = &self.config.metrics_path {
            prepare_metrics_path(path).await?;
        }

        let run_id = Uuid::new_v4().to_string();
        let config = &self.config;

        if tasks.is_empty() {
            tracing::info!(target: "shotrun.run", run_id = %run_id, "no tasks, platform not launched");
            let collector =
                ResultCollector::new(&run_id, 0, 0, config.metrics_path.clone(), &config.output);
            return Ok(collector.finalize(None, config).await);
        }

        let facts = self.facts.clone().unwrap_or_else(SystemFacts::probe);
        let plan = plan::resolve(config.workers, &facts)?;
        let worker_count = plan.worker_count;
        let total_tasks = tasks.len();

        let queue = TaskQueue::new(tasks.into_iter().map(Arc::new));
        let collector = ResultCollector::new(
            &run_id,
            total_tasks,
            worker_count,
            config.metrics_path.clone(),
            &config.output,
        );
        collector
            .reporter()
            .run_start(total_tasks, worker_count, config.isolation_mode);

        let handle = self.platform.launch(&config.executor).await.map_err(|e| {
            SchedulerError::fatal(format!("launching {} platform: {e:#}", self.platform.name()))
        })?;
        tracing::debug!(
            target: "shotrun.run",
            platform = self.platform.name(),
            executor = self.executor.name(),
            "platform launched"
        );

        let mut workers: Vec<WorkerLoop> = (1..=worker_count)
            .map(|worker_id| {
                WorkerLoop::new(
                    worker_id,
                    SessionManager::new(worker_id, config.isolation_mode, handle.clone()),
                )
            })
            .collect();

        let ctx = WorkerContext {
            queue: &queue,
            collector: &collector,
            executor: self.executor.as_ref(),
            config,
        };
        let driven = AssertUnwindSafe(drive(&mut workers, ctx))
            .catch_unwind()
            .await;
        let torn_down = teardown(&mut workers, handle.as_ref()).await;

        match driven {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(payload) => {
                return Err(SchedulerError::fatal(format!(
                    "worker loop panicked: {}",
                    panic_message(payload.as_ref())
                )))
            }
        }
        torn_down?;

        Ok(collector
            .finalize(Some(plan.adaptive_policy), config)
            .await)
    }
}

/// Initialize every worker's session, then poll all loops until the queue drains.
async fn drive(workers: &mut [WorkerLoop], ctx: WorkerContext<'_>) -> Result<(), SchedulerError> {
    for worker in workers.iter_mut() {
        let worker_id = worker.worker_id();
        worker.session_mut().initialize().await.map_err(|e| {
            SchedulerError::fatal(format!("initializing worker {worker_id} session: {e:#}"))
        })?;
    }

    let mut loops: FuturesUnordered<_> = workers.iter_mut().map(|w| w.run(ctx)).collect();
    while let Some(counters) = loops.next().await {
        tracing::trace!(target: "shotrun.run", ?counters, "worker loop finished");
    }
    Ok(())
}

/// Dispose every worker's session, then shut the platform down. Runs on every
/// exit path once the platform is up; the first error wins but all steps run.
async fn teardown(
    workers: &mut [WorkerLoop],
    handle: &dyn PlatformHandle,
) -> Result<(), SchedulerError> {
    let mut first_err: Option<SchedulerError> = None;

    for worker in workers.iter_mut() {
        let worker_id = worker.worker_id();
        if let Err(e) = worker.session_mut().dispose().await {
            tracing::error!(target: "shotrun.session", worker_id, error = %e, "disposing session failed");
            first_err.get_or_insert_with(|| {
                SchedulerError::fatal(format!("disposing worker {worker_id} session: {e:#}"))
            });
        }
    }

    if let Err(e) = handle.shutdown().await {
        tracing::error!(target: "shotrun.run", error = %e, "platform shutdown failed");
        first_err.get_or_insert_with(|| SchedulerError::fatal(format!("shutting down platform: {e:#}")));
    }

    first_err.map_or(Ok(()), Err)
}

impl SchedulerBuilder {
    pub fn new(platform: Arc<dyn AutomationPlatform>, executor: Arc<dyn TaskExecutor>) -> Self {
        Self {
            platform,
            executor,
            config: RunConfig::default(),
            facts: None,
        }
    }

    pub fn config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    /// Pin host facts instead of probing the machine (tests, `plan` previews).
    pub fn system_facts(mut self, facts: SystemFacts) -> Self {
        self.facts = Some(facts);
        self
    }

    pub fn build(self) -> Scheduler {
        Scheduler {
            platform: self.platform,
            executor: self.executor,
            config: self.config,
            facts: self.facts,
        }
    }
}
