use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::task::Task;

/// Which collection a queue item was dispatched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueType {
    Fresh,
    Retry,
}

impl fmt::Display for QueueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fresh => f.write_str("fresh"),
            Self::Retry => f.write_str("retry"),
        }
    }
}

/// A scheduled instance of a task: the task plus its current attempt number.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub task: Arc<Task>,
    /// 1-based; incremented on every retry.
    pub attempt: u32,
    pub queue_type: QueueType,
    pub enqueued_at: Instant,
}

impl QueueItem {
    pub fn fresh(task: Arc<Task>) -> Self {
        Self {
            task,
            attempt: 1,
            queue_type: QueueType::Fresh,
            enqueued_at: Instant::now(),
        }
    }

    /// The item that re-runs this task after a failed attempt.
    pub fn next_retry(&self) -> Self {
        Self {
            task: self.task.clone(),
            attempt: self.attempt + 1,
            queue_type: QueueType::Retry,
            enqueued_at: Instant::now(),
        }
    }

    pub fn path(&self) -> &str {
        self.task.path()
    }
}
