//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `shotrun_core::api` instead of reaching into internal modules.

pub use crate::config::{
    apply_env_overrides, load_default, load_file, AppConfig, CommandPlatformConfig,
    DryRunPlatformConfig, LoggingConfig, PlatformConfig, SchedulerConfig,
};
pub use crate::error::{CliError, ExecutionError, SchedulerError};
pub use crate::scheduler::plan::{resolve, SystemFacts, WorkerPlan};
pub use crate::scheduler::types::{
    build_tasks, estimate_cost, AdaptivePolicy, Distribution, ExecutionResult, ExecutorOptions,
    FailureRecord, IsolationMode, MetricsSummary, OutputOptions, PhaseTimings, PolicyMode,
    RecycleRecord, RetryRecord, RunConfig, RunOutcome, StreamFormat, SuccessRecord, Summary, Task,
    TaskPayload, TaskSpec, Viewport, WaitStrategy, WorkerUtilization,
};
pub use crate::scheduler::{
    AttemptRequest, AutomationPlatform, ExecutionContext, PlatformHandle, QueueState, Scheduler,
    SchedulerBuilder, TaskExecutor,
};
