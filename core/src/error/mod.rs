#[allow(clippy::module_inception)]
pub mod error;
pub mod execution;
pub mod scheduler;

pub use error::CliError;
pub use execution::ExecutionError;
pub use scheduler::SchedulerError;
