use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::queue::QueueType;
use super::result::PhaseTimings;

/// A task attempt that produced screenshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessRecord {
    pub task_id: String,
    pub path: String,
    pub worker_id: usize,
    pub attempt: u32,
    pub queue_type: QueueType,
    pub queue_wait_ms: f64,
    pub attempt_ms: f64,
    pub screenshot_count: u32,
    pub timings: PhaseTimings,
    pub timestamp: DateTime<Utc>,
}

/// A failed attempt that was put back on the retry queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryRecord {
    pub task_id: String,
    pub path: String,
    pub worker_id: usize,
    pub attempt: u32,
    pub queue_type: QueueType,
    pub queue_wait_ms: f64,
    pub attempt_ms: f64,
    pub error: String,
    pub error_kind: String,
    pub timestamp: DateTime<Utc>,
}

/// A task that exhausted its retry budget. Terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    pub task_id: String,
    pub path: String,
    pub worker_id: usize,
    pub attempt: u32,
    pub queue_type: QueueType,
    pub queue_wait_ms: f64,
    pub attempt_ms: f64,
    pub error: String,
    pub error_kind: String,
    pub timestamp: DateTime<Utc>,
}

/// A fast-mode worker tore down and re-created its shared context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecycleRecord {
    pub worker_id: usize,
    /// Path of the task whose success triggered the recycle.
    pub path: String,
    pub after_successes: u32,
    pub recycle_ms: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptOutcome {
    Success,
    Retry,
    Failure,
}

/// One row per attempt, whatever its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub task_id: String,
    pub path: String,
    pub worker_id: usize,
    pub attempt: u32,
    pub queue_type: QueueType,
    pub outcome: AttemptOutcome,
    pub queue_wait_ms: f64,
    pub attempt_ms: f64,
    pub timestamp: DateTime<Utc>,
}
