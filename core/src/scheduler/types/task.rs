use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

/// Fixed weight every capture pays (browser round-trip + screenshot).
pub const BASE_COST: u64 = 100;

/// Weight added per interaction step.
pub const STEP_COST: u64 = 20;

/// How the executor decides a page is ready for capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum WaitStrategy {
    #[default]
    Load,
    DomContentLoaded,
    NetworkIdle,
    Selector,
    Delay,
}

impl WaitStrategy {
    pub fn cost_weight(self) -> u64 {
        match self {
            Self::Load | Self::DomContentLoaded => 0,
            Self::Selector | Self::Delay => 20,
            Self::NetworkIdle => 40,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

/// Data handed verbatim to the task executor. The scheduler only looks at it
/// to estimate cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPayload {
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,

    /// DOM interaction steps, interpreted by the executor only.
    #[serde(default)]
    pub steps: Vec<serde_json::Value>,

    #[serde(default)]
    pub wait_strategy: WaitStrategy,

    #[serde(default)]
    pub skip_initial_screenshot: bool,
}

impl TaskPayload {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            viewport: None,
            steps: Vec::new(),
            wait_strategy: WaitStrategy::default(),
            skip_initial_screenshot: false,
        }
    }
}

/// Synthetic duration proxy used to dispatch heavy captures first.
pub fn estimate_cost(payload: &TaskPayload) -> u64 {
    BASE_COST
        + STEP_COST.saturating_mul(payload.steps.len() as u64)
        + payload.wait_strategy.cost_weight()
}

/// One unit of capture work. Immutable once built; all run state lives in
/// queue items and outcome records.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    id: String,
    path: String,
    estimated_cost: u64,
    payload: TaskPayload,
}

impl Task {
    pub fn new(id: impl Into<String>, path: impl Into<String>, payload: TaskPayload) -> Self {
        let estimated_cost = estimate_cost(&payload);
        Self {
            id: id.into(),
            path: path.into(),
            estimated_cost,
            payload,
        }
    }

    /// Override the estimated cost before the task is scheduled.
    pub fn with_estimated_cost(mut self, cost: u64) -> Self {
        self.estimated_cost = cost;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn estimated_cost(&self) -> u64 {
        self.estimated_cost
    }

    pub fn payload(&self) -> &TaskPayload {
        &self.payload
    }
}

/// Serialized form of a task, as read from a task list file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    #[serde(default)]
    pub id: Option<String>,
    pub path: String,
    #[serde(default)]
    pub estimated_cost: Option<u64>,
    #[serde(flatten)]
    pub payload: TaskPayload,
}

impl TaskSpec {
    fn default_id(&self) -> String {
        match &self.payload.viewport {
            Some(vp) => format!("{}@{}", self.path, vp.name),
            None => self.path.clone(),
        }
    }

    pub fn into_task(self) -> Task {
        let id = self.id.clone().unwrap_or_else(|| self.default_id());
        let task = Task::new(id, self.path, self.payload);
        match self.estimated_cost {
            Some(cost) => task.with_estimated_cost(cost),
            None => task,
        }
    }
}

/// Build tasks in input order, rejecting duplicate ids.
pub fn build_tasks(specs: Vec<TaskSpec>) -> Result<Vec<Task>, SchedulerError> {
    let tasks: Vec<Task> = specs.into_iter().map(TaskSpec::into_task).collect();
    ensure_unique_ids(&tasks)?;
    Ok(tasks)
}

pub fn ensure_unique_ids(tasks: &[Task]) -> Result<(), SchedulerError> {
    let mut seen = HashSet::with_capacity(tasks.len());
    for task in tasks {
        if !seen.insert(task.id()) {
            return Err(SchedulerError::invalid(format!(
                "duplicate task id: {}",
                task.id()
            )));
        }
    }
    Ok(())
}
