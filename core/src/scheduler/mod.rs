//! Parallel capture scheduler
//!
//! Runs a batch of capture tasks across a fixed pool of workers that share
//! one launched automation platform. It provides:
//! - Worker-count resolution from host CPU and memory (or a manual override)
//! - A shared queue that dispatches heaviest tasks first and interleaves retries
//! - Fast (reset and reuse) or strict (fresh per task) context isolation
//! - Bounded retries, periodic context recycling, per-phase metrics
//! - A JSON metrics artifact plus text or JSONL progress output
//!
//! # Architecture
//!
//! ```text
//! Vec<Task>
//!   ↓
//! plan::resolve() → WorkerPlan { worker_count, adaptive_policy }
//!   ↓
//! AutomationPlatform::launch() → Arc<dyn PlatformHandle>
//!   ↓
//! WorkerLoop × N  ──get_next_task()──▶ TaskQueue { fresh ↓cost, retry FIFO }
//!   │  SessionManager::acquire() → SessionLease
//!   │  TaskExecutor::execute()
//!   ↓
//! ResultCollector::record_*() → finalize() → RunOutcome { summary, failures, metrics_error }
//! ```

mod collector;
mod engine;
mod output;
pub mod plan;
mod progress;
mod queue;
mod session;
pub mod stats;
pub mod traits;
pub mod types;
mod util;
mod worker;

pub use collector::{build_summary, MetricsArtifact, Records, ResultCollector};
pub use engine::{Scheduler, SchedulerBuilder};
pub use output::RunReporter;
pub use plan::{resolve, SystemFacts, WorkerPlan, MAX_AUTO_WORKERS, MEMORY_PER_WORKER_GB};
pub use progress::ProgressMonitor;
pub use queue::{QueueState, TaskQueue};
pub use session::{SessionLease, SessionManager};
pub use traits::{AttemptRequest, AutomationPlatform, ExecutionContext, PlatformHandle, TaskExecutor};
pub use types::{RunConfig, RunOutcome, Summary, Task, TaskPayload, TaskSpec};
pub use worker::{WorkerContext, WorkerCounters, WorkerLoop};
