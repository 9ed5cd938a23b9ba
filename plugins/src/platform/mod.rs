pub mod command;
pub mod dry_run;

pub use command::{CommandExecutor, CommandPlatform, ProfileContext};
pub use dry_run::{DryRunExecutor, DryRunPlatform, MemoryContext};
