use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::SchedulerError;

use super::output::RunReporter;
use super::stats::{distribution, round2};
use super::types::{
    AdaptivePolicy, AttemptOutcome, AttemptRecord, FailureRecord, MetricsSummary, OutputOptions,
    QueueItem, RecycleRecord, RetryRecord, RunConfig, RunOutcome, SuccessRecord, Summary,
    WorkerUtilization,
};
use super::util::elapsed_ms;

/// Raw outcome records of one run, in append order.
#[derive(Debug, Default, Clone)]
pub struct Records {
    pub successes: Vec<SuccessRecord>,
    pub retries: Vec<RetryRecord>,
    pub failures: Vec<FailureRecord>,
    pub recycles: Vec<RecycleRecord>,
    pub attempts: Vec<AttemptRecord>,
}

impl Records {
    fn terminal(&self) -> usize {
        self.successes.len() + self.failures.len()
    }
}

/// The JSON document written to `metricsPath`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsArtifact<'a> {
    pub generated_at: DateTime<Utc>,
    pub summary: &'a Summary,
    pub successes: &'a [SuccessRecord],
    pub failures: &'a [FailureRecord],
    pub retries: &'a [RetryRecord],
    pub recycles: &'a [RecycleRecord],
    pub attempts: &'a [AttemptRecord],
}

/// Single writer of every outcome record of a run.
///
/// Workers call it right after each attempt settles; appends are serialized
/// by a mutex that is never held across an `.await`.
pub struct ResultCollector {
    started: Instant,
    total_tasks: usize,
    worker_count: usize,
    metrics_path: Option<PathBuf>,
    reporter: RunReporter,
    records: Mutex<Records>,
}

impl ResultCollector {
    pub fn new(
        run_id: &str,
        total_tasks: usize,
        worker_count: usize,
        metrics_path: Option<PathBuf>,
        output: &OutputOptions,
    ) -> Self {
        Self {
            started: Instant::now(),
            total_tasks,
            worker_count,
            metrics_path,
            reporter: RunReporter::new(run_id, output, total_tasks, worker_count),
            records: Mutex::new(Records::default()),
        }
    }

    pub fn reporter(&self) -> &RunReporter {
        &self.reporter
    }

    fn lock(&self) -> MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn attempt_started(&self, worker_id: usize, item: &QueueItem) {
        self.reporter.attempt_start(worker_id, item);
    }

    pub fn worker_finished(&self, worker_id: usize) {
        self.reporter.worker_done(worker_id);
    }

    pub fn record_success(&self, rec: SuccessRecord) {
        let done = {
            let mut records = self.lock();
            records.attempts.push(AttemptRecord {
                task_id: rec.task_id.clone(),
                path: rec.path.clone(),
                worker_id: rec.worker_id,
                attempt: rec.attempt,
                queue_type: rec.queue_type,
                outcome: AttemptOutcome::Success,
                queue_wait_ms: rec.queue_wait_ms,
                attempt_ms: rec.attempt_ms,
                timestamp: rec.timestamp,
            });
            records.successes.push(rec.clone());
            records.terminal()
        };
        self.reporter.success(&rec, done, self.total_tasks);
    }

    pub fn record_retry(&self, rec: RetryRecord) {
        {
            let mut records = self.lock();
            records.attempts.push(AttemptRecord {
                task_id: rec.task_id.clone(),
                path: rec.path.clone(),
                worker_id: rec.worker_id,
                attempt: rec.attempt,
                queue_type: rec.queue_type,
                outcome: AttemptOutcome::Retry,
                queue_wait_ms: rec.queue_wait_ms,
                attempt_ms: rec.attempt_ms,
                timestamp: rec.timestamp,
            });
            records.retries.push(rec.clone());
        }
        self.reporter.retry(&rec);
    }

    pub fn record_failure(&self, rec: FailureRecord) {
        let done = {
            let mut records = self.lock();
            records.attempts.push(AttemptRecord {
                task_id: rec.task_id.clone(),
                path: rec.path.clone(),
                worker_id: rec.worker_id,
                attempt: rec.attempt,
                queue_type: rec.queue_type,
                outcome: AttemptOutcome::Failure,
                queue_wait_ms: rec.queue_wait_ms,
                attempt_ms: rec.attempt_ms,
                timestamp: rec.timestamp,
            });
            records.failures.push(rec.clone());
            records.terminal()
        };
        self.reporter.failure(&rec, done, self.total_tasks);
    }

    /// Recycles are not task outcomes and add no attempt row.
    pub fn record_recycle(&self, rec: RecycleRecord) {
        self.lock().recycles.push(rec.clone());
        self.reporter.recycle(&rec);
    }

    /// Copy of everything recorded so far.
    pub fn snapshot(&self) -> Records {
        self.lock().clone()
    }

    /// Build the summary, write the metrics artifact if configured, and hand
    /// back the outcome. Terminal step of a run.
    ///
    /// A failed artifact write is logged and reported in
    /// [`RunOutcome::metrics_error`]; the outcome itself is never lost.
    pub async fn finalize(
        self,
        adaptive_policy: Option<AdaptivePolicy>,
        config: &RunConfig,
    ) -> RunOutcome {
        let duration_ms = elapsed_ms(self.started);
        let records = self
            .records
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);

        let summary = build_summary(
            self.reporter.run_id(),
            self.total_tasks,
            self.worker_count,
            duration_ms,
            adaptive_policy,
            config,
            &records,
        );

        let mut metrics_error = None;
        if let Some(path) = &self.metrics_path {
            match write_artifact(path, &summary, &records).await {
                Ok(()) => tracing::info!(
                    target: "shotrun.run",
                    path = %path.display(),
                    "metrics artifact written"
                ),
                Err(e) => {
                    tracing::error!(target: "shotrun.run", error = %e, "metrics artifact not written");
                    metrics_error = Some(e.to_string());
                }
            }
        }

        self.reporter.run_end(&summary);

        RunOutcome {
            summary,
            failures: records.failures,
            metrics_error,
        }
    }
}

/// Aggregate counts, distributions and per-worker utilization.
pub fn build_summary(
    run_id: &str,
    total_tasks: usize,
    worker_count: usize,
    duration_ms: f64,
    adaptive_policy: Option<AdaptivePolicy>,
    config: &RunConfig,
    records: &Records,
) -> Summary {
    let successes = &records.successes;
    let metrics = MetricsSummary {
        queue_wait_ms: distribution(records.attempts.iter().map(|a| a.queue_wait_ms)),
        attempt_ms: distribution(records.attempts.iter().map(|a| a.attempt_ms)),
        total_ms: distribution(successes.iter().map(|s| s.timings.total_ms)),
        session_acquire_ms: distribution(successes.iter().map(|s| s.timings.session_acquire_ms)),
        reset_ms: distribution(successes.iter().map(|s| s.timings.reset_ms)),
        navigation_ms: distribution(successes.iter().map(|s| s.timings.navigation_ms)),
        ready_wait_ms: distribution(successes.iter().map(|s| s.timings.ready_wait_ms)),
        settle_wait_ms: distribution(successes.iter().map(|s| s.timings.settle_wait_ms)),
        initial_capture_ms: distribution(successes.iter().map(|s| s.timings.initial_capture_ms)),
        steps_ms: distribution(successes.iter().map(|s| s.timings.steps_ms)),
        recycle_ms: distribution(records.recycles.iter().map(|r| r.recycle_ms)),
    };

    let workers = (1..=worker_count)
        .map(|worker_id| worker_utilization(worker_id, duration_ms, records))
        .collect();

    Summary {
        run_id: run_id.to_string(),
        total_tasks,
        completed: records.terminal(),
        successful: successes.len(),
        failed: records.failures.len(),
        retries: records.retries.len(),
        recycles: records.recycles.len(),
        attempts: records.attempts.len(),
        screenshots: successes.iter().map(|s| s.screenshot_count as u64).sum(),
        worker_count,
        isolation_mode: config.isolation_mode,
        max_retries: config.max_retries,
        recycle_every: config.recycle_every,
        duration_ms: round2(duration_ms),
        adaptive_policy,
        metrics,
        workers,
    }
}

fn worker_utilization(worker_id: usize, duration_ms: f64, records: &Records) -> WorkerUtilization {
    let mut util = WorkerUtilization {
        worker_id,
        ..Default::default()
    };
    let mut busy_ms = 0.0;
    for attempt in records.attempts.iter().filter(|a| a.worker_id == worker_id) {
        util.attempts += 1;
        match attempt.outcome {
            AttemptOutcome::Success => util.successful += 1,
            AttemptOutcome::Retry => util.retries += 1,
            AttemptOutcome::Failure => util.failures += 1,
        }
        if attempt.attempt_ms.is_finite() {
            busy_ms += attempt.attempt_ms;
        }
    }
    util.busy_ms = round2(busy_ms);
    util.utilization_pct = if duration_ms > 0.0 {
        round2((busy_ms / duration_ms * 100.0).min(100.0))
    } else {
        0.0
    };
    util
}

async fn write_artifact(
    path: &Path,
    summary: &Summary,
    records: &Records,
) -> Result<(), SchedulerError> {
    let artifact = MetricsArtifact {
        generated_at: Utc::now(),
        summary,
        successes: &records.successes,
        failures: &records.failures,
        retries: &records.retries,
        recycles: &records.recycles,
        attempts: &records.attempts,
    };
    let body = serde_json::to_vec_pretty(&artifact)
        .map_err(|e| SchedulerError::fatal(format!("serialize metrics artifact: {e}")))?;

    let io_err = |source| SchedulerError::Artifact {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }

    // Readers only ever see a complete document.
    let tmp = artifact_tmp_path(path);
    tokio::fs::write(&tmp, body).await.map_err(io_err)?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        tokio::fs::remove_file(&tmp).await.ok();
        return Err(io_err(e));
    }
    Ok(())
}

fn artifact_tmp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "metrics".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}

/// Make sure the metrics artifact can be written before any work starts:
/// the parent directory exists (created if missing) and the path itself is
/// not a directory.
pub async fn prepare_metrics_path(path: &Path) -> Result<(), SchedulerError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            SchedulerError::invalid(format!(
                "metrics path {}: cannot create {}: {e}",
                path.display(),
                parent.display()
            ))
        })?;
    }
    if tokio::fs::metadata(path).await.is_ok_and(|m| m.is_dir()) {
        return Err(SchedulerError::invalid(format!(
            "metrics path {} is a directory",
            path.display()
        )));
    }
    Ok(())
}
