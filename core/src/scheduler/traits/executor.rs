use async_trait::async_trait;

use crate::error::ExecutionError;
use crate::scheduler::types::{ExecutionResult, ExecutorOptions, Task};

use super::platform::ExecutionContext;

/// Everything an executor gets to know about one attempt.
#[derive(Debug, Clone, Copy)]
pub struct AttemptRequest<'a> {
    pub task: &'a Task,
    pub attempt: u32,
    pub worker_id: usize,
    pub options: &'a ExecutorOptions,
}

/// Performs one capture attempt inside an execution context.
///
/// Must be safe to call repeatedly with the same context (fast isolation) or
/// a fresh one per call (strict isolation).
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(
        &self,
        context: &mut dyn ExecutionContext,
        request: AttemptRequest<'_>,
    ) -> Result<ExecutionResult, ExecutionError>;
}
