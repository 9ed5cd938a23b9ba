use thiserror::Error;

/// A failed capture attempt.
///
/// Every variant is recoverable at the scheduler level: the attempt is
/// retried while the retry budget lasts and then recorded as a terminal
/// failure for that task only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// Error reported by the task executor. The message is kept verbatim.
    #[error("{0}")]
    Failed(String),

    #[error("session unavailable: {0}")]
    Session(String),

    #[error("attempt timed out after {0}ms")]
    TimedOut(u64),

    #[error("executor panicked: {0}")]
    Panicked(String),
}

impl ExecutionError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Failed(_) => "task_attempt_failed",
            Self::Session(_) => "session",
            Self::TimedOut(_) => "timeout",
            Self::Panicked(_) => "panic",
        }
    }
}

impl From<anyhow::Error> for ExecutionError {
    fn from(err: anyhow::Error) -> Self {
        Self::Failed(err.to_string())
    }
}

impl From<std::io::Error> for ExecutionError {
    fn from(err: std::io::Error) -> Self {
        Self::Failed(err.to_string())
    }
}
