use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::scheduler::types::{ExecutorOptions, IsolationMode, OutputOptions, RunConfig};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub executor: ExecutorOptions,

    #[serde(default)]
    pub platform: PlatformConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default = "default_logging_file")]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "shotrun_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Optional directory for log files. If empty or unset, uses OS temp dir.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_file() -> bool {
    false
}

fn default_logging_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: default_logging_file(),
            level: default_logging_level(),
            directory: None,
        }
    }
}

/// `[scheduler]` section: run policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Manual worker count; omit for auto.
    #[serde(default)]
    pub workers: Option<i64>,

    #[serde(default)]
    pub isolation: IsolationMode,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// 0 disables recycling.
    #[serde(default = "default_recycle_every")]
    pub recycle_every: u32,

    #[serde(default)]
    pub metrics_path: Option<String>,

    #[serde(default)]
    pub attempt_timeout_ms: Option<u64>,
}

fn default_max_retries() -> u32 {
    1
}

fn default_recycle_every() -> u32 {
    50
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: None,
            isolation: IsolationMode::default(),
            max_retries: default_max_retries(),
            recycle_every: default_recycle_every(),
            metrics_path: None,
            attempt_timeout_ms: None,
        }
    }
}

/// `[platform]` section: which automation backend drives the captures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider")]
pub enum PlatformConfig {
    #[serde(rename = "command")]
    Command(CommandPlatformConfig),
    #[serde(rename = "dry-run")]
    DryRun(DryRunPlatformConfig),
}

impl Default for PlatformConfig {
    fn default() -> Self {
        PlatformConfig::Command(CommandPlatformConfig::default())
    }
}

/// An external capture helper invoked once per attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandPlatformConfig {
    #[serde(default = "default_helper_program")]
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Where per-context profile directories are created. OS temp dir if unset.
    #[serde(default)]
    pub scratch_dir: Option<String>,

    /// Where the helper writes screenshots; passed through in every request.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Bytes of helper stderr kept in failure messages.
    #[serde(default = "default_stderr_tail")]
    pub stderr_tail_bytes: usize,
}

fn default_helper_program() -> String {
    "shotrun-capture".to_string()
}

fn default_output_dir() -> String {
    "./screenshots".to_string()
}

fn default_stderr_tail() -> usize {
    2048
}

impl Default for CommandPlatformConfig {
    fn default() -> Self {
        Self {
            program: default_helper_program(),
            args: Vec::new(),
            scratch_dir: None,
            output_dir: default_output_dir(),
            stderr_tail_bytes: default_stderr_tail(),
        }
    }
}

/// Simulated captures for rehearsing a run without a browser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DryRunPlatformConfig {
    /// Simulated milliseconds per unit of estimated cost.
    #[serde(default = "default_ms_per_cost")]
    pub ms_per_cost: f64,

    /// Paths whose first `fail_attempts` attempts fail.
    #[serde(default)]
    pub fail_paths: Vec<String>,

    #[serde(default = "default_fail_attempts")]
    pub fail_attempts: u32,
}

fn default_ms_per_cost() -> f64 {
    0.1
}

fn default_fail_attempts() -> u32 {
    1
}

impl Default for DryRunPlatformConfig {
    fn default() -> Self {
        Self {
            ms_per_cost: default_ms_per_cost(),
            fail_paths: Vec::new(),
            fail_attempts: default_fail_attempts(),
        }
    }
}

impl AppConfig {
    /// Scheduler settings as a run config; output switches are left to the caller.
    pub fn to_run_config(&self) -> RunConfig {
        let s = &self.scheduler;
        RunConfig {
            workers: s.workers,
            isolation_mode: s.isolation,
            max_retries: s.max_retries,
            recycle_every: s.recycle_every,
            metrics_path: s
                .metrics_path
                .as_deref()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            attempt_timeout_ms: s.attempt_timeout_ms,
            executor: self.executor.clone(),
            output: OutputOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::types::WaitStrategy;

    #[test]
    fn empty_toml_yields_defaults() {
        let cfg: AppConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.scheduler.max_retries, 1);
        assert_eq!(cfg.scheduler.recycle_every, 50);
        assert_eq!(cfg.scheduler.isolation, IsolationMode::Fast);
        assert!(matches!(cfg.platform, PlatformConfig::Command(_)));
        assert_eq!(cfg.executor, ExecutorOptions::default());
    }

    #[test]
    fn parses_full_document() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [logging]
            level = "debug"

            [scheduler]
            workers = 4
            isolation = "strict"
            max_retries = 2
            recycle_every = 0
            metrics_path = "out/metrics.json"
            attempt_timeout_ms = 60000

            [executor]
            navigation_timeout_ms = 5000
            wait_strategy = "network-idle"
            headless = false

            [platform]
            provider = "dry-run"
            fail_paths = ["components/flaky"]
            "#,
        )
        .unwrap();

        assert_eq!(cfg.logging.level, "debug");
        let run = cfg.to_run_config();
        assert_eq!(run.workers, Some(4));
        assert_eq!(run.isolation_mode, IsolationMode::Strict);
        assert_eq!(run.max_retries, 2);
        assert_eq!(run.recycle_every, 0);
        assert_eq!(run.metrics_path, Some(PathBuf::from("out/metrics.json")));
        assert_eq!(run.attempt_timeout_ms, Some(60_000));
        assert_eq!(run.executor.navigation_timeout_ms, 5000);
        assert_eq!(run.executor.ready_timeout_ms, 10_000);
        assert_eq!(run.executor.wait_strategy, WaitStrategy::NetworkIdle);
        assert!(!run.executor.headless);

        let PlatformConfig::DryRun(dry) = cfg.platform else {
            panic!("expected dry-run platform");
        };
        assert_eq!(dry.fail_paths, vec!["components/flaky".to_string()]);
        assert_eq!(dry.fail_attempts, 1);
    }

    #[test]
    fn unknown_isolation_is_rejected() {
        let res: Result<AppConfig, _> = toml::from_str("[scheduler]\nisolation = \"paranoid\"");
        assert!(res.is_err());
    }
}
