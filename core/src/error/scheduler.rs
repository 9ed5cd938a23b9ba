use std::path::PathBuf;

use thiserror::Error;

/// Errors that escape `Scheduler::run`.
///
/// Per-task failures never show up here; they are recorded as
/// `FailureRecord`s and returned alongside the summary.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// Malformed run inputs, detected before any work starts.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The shared automation platform could not be launched, initialized or
    /// torn down. No task can proceed without it.
    #[error("scheduler fatal: {0}")]
    Fatal(String),

    #[error("failed to write metrics artifact {path}: {source}")]
    Artifact {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl SchedulerError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    /// Stable kind tag used in logs and JSONL output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidConfiguration(_) => "invalid_configuration",
            Self::Fatal(_) => "scheduler_fatal",
            Self::Artifact { .. } => "artifact",
        }
    }
}
