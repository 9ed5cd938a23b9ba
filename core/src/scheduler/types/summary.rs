use serde::{Deserialize, Serialize};

use super::config::IsolationMode;
use super::records::FailureRecord;

/// `{avg, p50, p95, max}` of one metric, rounded to 2 decimals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    pub avg_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub max_ms: f64,
}

/// Distributions over successful attempts (queue wait and attempt time cover
/// every attempt).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub queue_wait_ms: Distribution,
    pub attempt_ms: Distribution,
    pub total_ms: Distribution,
    pub session_acquire_ms: Distribution,
    pub reset_ms: Distribution,
    pub navigation_ms: Distribution,
    pub ready_wait_ms: Distribution,
    pub settle_wait_ms: Distribution,
    pub initial_capture_ms: Distribution,
    pub steps_ms: Distribution,
    pub recycle_ms: Distribution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyMode {
    Manual,
    Auto,
}

/// How the worker count was derived. Recorded for transparency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptivePolicy {
    pub mode: PolicyMode,
    pub cpu_count: usize,
    pub cpu_bound: usize,
    pub total_memory_gb: f64,
    pub memory_bound: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerUtilization {
    pub worker_id: usize,
    pub attempts: usize,
    pub successful: usize,
    pub retries: usize,
    pub failures: usize,
    pub busy_ms: f64,
    pub utilization_pct: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub run_id: String,
    pub total_tasks: usize,
    /// Tasks with a terminal outcome (`successful + failed`).
    pub completed: usize,
    pub successful: usize,
    pub failed: usize,
    pub retries: usize,
    pub recycles: usize,
    pub attempts: usize,
    pub screenshots: u64,
    pub worker_count: usize,
    pub isolation_mode: IsolationMode,
    pub max_retries: u32,
    pub recycle_every: u32,
    pub duration_ms: f64,
    pub adaptive_policy: Option<AdaptivePolicy>,
    pub metrics: MetricsSummary,
    pub workers: Vec<WorkerUtilization>,
}

/// What `Scheduler::run` hands back to its caller.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub summary: Summary,
    /// Tasks that exhausted their retry budget.
    pub failures: Vec<FailureRecord>,
    /// Set when the metrics artifact was configured but could not be written.
    pub metrics_error: Option<String>,
}

impl RunOutcome {
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}
