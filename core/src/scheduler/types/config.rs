use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

use super::task::WaitStrategy;

/// Whether workers reuse one execution context (fast) or create a fresh one
/// per task (strict).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IsolationMode {
    #[default]
    Fast,
    Strict,
}

impl fmt::Display for IsolationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fast => f.write_str("fast"),
            Self::Strict => f.write_str("strict"),
        }
    }
}

impl FromStr for IsolationMode {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "strict" => Ok(Self::Strict),
            other => Err(SchedulerError::invalid(format!(
                "isolation mode must be \"fast\" or \"strict\", got \"{other}\""
            ))),
        }
    }
}

/// Executor settings the scheduler passes through without interpreting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorOptions {
    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,
    #[serde(default = "default_screenshot_timeout_ms")]
    pub screenshot_timeout_ms: u64,
    #[serde(default)]
    pub wait_strategy: WaitStrategy,
    #[serde(default = "default_headless")]
    pub headless: bool,
}

fn default_navigation_timeout_ms() -> u64 {
    30_000
}

fn default_ready_timeout_ms() -> u64 {
    10_000
}

fn default_screenshot_timeout_ms() -> u64 {
    15_000
}

fn default_headless() -> bool {
    true
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            navigation_timeout_ms: default_navigation_timeout_ms(),
            ready_timeout_ms: default_ready_timeout_ms(),
            screenshot_timeout_ms: default_screenshot_timeout_ms(),
            wait_strategy: WaitStrategy::default(),
            headless: default_headless(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamFormat {
    #[default]
    Text,
    Jsonl,
}

impl FromStr for StreamFormat {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "jsonl" => Ok(Self::Jsonl),
            other => Err(SchedulerError::invalid(format!(
                "stream format must be \"text\" or \"jsonl\", got \"{other}\""
            ))),
        }
    }
}

/// Operator-facing output switches.
#[derive(Debug, Clone, Default)]
pub struct OutputOptions {
    pub stream_format: StreamFormat,
    /// Suppress per-record progress lines.
    pub quiet: bool,
    /// Draw an indicatif progress bar (text output only).
    pub progress_bar: bool,
}

/// Everything one scheduler run needs to know.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Manual worker count; `None` lets the plan resolver decide.
    pub workers: Option<i64>,
    pub isolation_mode: IsolationMode,
    pub max_retries: u32,
    /// Recycle a fast-mode context after this many successes; 0 disables.
    pub recycle_every: u32,
    pub metrics_path: Option<PathBuf>,
    /// Optional outer limit per attempt; `None` trusts the executor's own timeouts.
    pub attempt_timeout_ms: Option<u64>,
    pub executor: ExecutorOptions,
    pub output: OutputOptions,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: None,
            isolation_mode: IsolationMode::Fast,
            max_retries: 1,
            recycle_every: 50,
            metrics_path: None,
            attempt_timeout_ms: None,
            executor: ExecutorOptions::default(),
            output: OutputOptions::default(),
        }
    }
}

impl RunConfig {
    /// Reject malformed inputs before any work starts.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if let Some(workers) = self.workers {
            if workers < 1 {
                return Err(SchedulerError::invalid(format!(
                    "worker count must be an integer >= 1, got {workers}"
                )));
            }
        }
        if self.attempt_timeout_ms == Some(0) {
            return Err(SchedulerError::invalid(
                "attempt timeout must be greater than 0ms",
            ));
        }
        Ok(())
    }

    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout_ms.map(Duration::from_millis)
    }

    /// Whether a worker should recycle after `successes` consecutive successes.
    pub fn recycle_due(&self, successes: u32) -> bool {
        self.isolation_mode == IsolationMode::Fast
            && self.recycle_every > 0
            && successes >= self.recycle_every
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isolation_mode_parses_case_insensitively() {
        assert_eq!("Strict".parse::<IsolationMode>().unwrap(), IsolationMode::Strict);
        assert_eq!(" fast ".parse::<IsolationMode>().unwrap(), IsolationMode::Fast);
        assert!("paranoid".parse::<IsolationMode>().is_err());
    }

    #[test]
    fn validate_rejects_zero_and_negative_workers() {
        let mut cfg = RunConfig {
            workers: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(SchedulerError::InvalidConfiguration(_))
        ));

        cfg.workers = Some(-3);
        assert!(cfg.validate().is_err());

        cfg.workers = Some(2);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let cfg = RunConfig {
            attempt_timeout_ms: Some(0),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn recycle_only_in_fast_mode_when_enabled() {
        let mut cfg = RunConfig {
            recycle_every: 2,
            ..Default::default()
        };
        assert!(!cfg.recycle_due(1));
        assert!(cfg.recycle_due(2));

        cfg.recycle_every = 0;
        assert!(!cfg.recycle_due(2));

        cfg.recycle_every = 2;
        cfg.isolation_mode = IsolationMode::Strict;
        assert!(!cfg.recycle_due(2));
    }
}
