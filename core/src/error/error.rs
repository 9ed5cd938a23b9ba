use thiserror::Error;

use super::scheduler::SchedulerError;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("scheduler failed: {0}")]
    Scheduler(#[from] SchedulerError),
    #[error("command failed: {0}")]
    Command(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("task list error: {0}")]
    Tasks(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}
