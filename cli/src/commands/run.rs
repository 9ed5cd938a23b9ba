use std::path::{Path, PathBuf};

use shotrun_core::api::{
    build_tasks, AppConfig, CliError, CommandPlatformConfig, DryRunPlatformConfig,
    IsolationMode, OutputOptions, PlatformConfig, RunConfig, RunOutcome, Scheduler,
    StreamFormat, Summary, Task, TaskSpec,
};
use shotrun_plugins::factory::build_backend_for;

use super::cli::RunArgs;

/// Read a JSON array of task specs and turn it into tasks.
pub fn load_tasks(path: &Path) -> Result<Vec<Task>, CliError> {
    let body = std::fs::read_to_string(path)
        .map_err(|e| CliError::Tasks(format!("reading {}: {e}", path.display())))?;
    let specs: Vec<TaskSpec> = serde_json::from_str(&body)
        .map_err(|e| CliError::Tasks(format!("parsing {}: {e}", path.display())))?;
    Ok(build_tasks(specs)?)
}

/// Fold command line flags over the loaded config.
pub fn apply_overrides(args: &RunArgs, cfg: &mut AppConfig) {
    let s = &mut cfg.scheduler;
    if let Some(n) = args.workers {
        s.workers = Some(n);
    }
    if let Some(mode) = args.isolation {
        s.isolation = IsolationMode::from(mode);
    }
    if let Some(n) = args.max_retries {
        s.max_retries = n;
    }
    if let Some(n) = args.recycle_every {
        s.recycle_every = n;
    }
    if let Some(p) = &args.metrics_path {
        s.metrics_path = Some(p.clone());
    }
    if let Some(ms) = args.attempt_timeout_ms {
        s.attempt_timeout_ms = Some(ms);
    }

    if args.dry_run {
        if !matches!(cfg.platform, PlatformConfig::DryRun(_)) {
            cfg.platform = PlatformConfig::DryRun(DryRunPlatformConfig::default());
        }
    } else if let Some(program) = &args.helper {
        let mut command = match &cfg.platform {
            PlatformConfig::Command(c) => c.clone(),
            PlatformConfig::DryRun(_) => CommandPlatformConfig::default(),
        };
        command.program = program.clone();
        command.args = args.helper_args.clone();
        cfg.platform = PlatformConfig::Command(command);
    }
}

pub fn run_config(args: &RunArgs, cfg: &AppConfig) -> Result<RunConfig, CliError> {
    run_config_for(args, cfg, atty::is(atty::Stream::Stdout))
}

/// Bars are only drawn when stdout is a terminal.
fn run_config_for(args: &RunArgs, cfg: &AppConfig, stdout_tty: bool) -> Result<RunConfig, CliError> {
    let stream_format: StreamFormat = args.stream_format.parse()?;
    let mut run = cfg.to_run_config();
    run.metrics_path = run
        .metrics_path
        .map(|p| PathBuf::from(shellexpand::tilde(&p.to_string_lossy()).to_string()));
    run.output = OutputOptions {
        stream_format,
        quiet: args.quiet,
        progress_bar: args.progress && stdout_tty,
    };
    Ok(run)
}

pub async fn run(args: RunArgs, mut cfg: AppConfig) -> Result<i32, CliError> {
    apply_overrides(&args, &mut cfg);
    let run_cfg = run_config(&args, &cfg)?;
    let stream_format = run_cfg.output.stream_format;

    let tasks_path = PathBuf::from(shellexpand::tilde(&args.tasks).to_string());
    let tasks = load_tasks(&tasks_path)?;
    tracing::info!(tasks = tasks.len(), path = %tasks_path.display(), "task list loaded");

    let backend = build_backend_for(&cfg.platform);
    let scheduler = Scheduler::builder(backend.platform, backend.executor)
        .config(run_cfg)
        .build();

    let outcome = scheduler.run(tasks).await?;

    if stream_format == StreamFormat::Text {
        print!("{}", render_summary(&outcome));
    }

    Ok(if outcome.all_succeeded() { 0 } else { 1 })
}

/// Human-readable end-of-run report.
pub fn render_summary(outcome: &RunOutcome) -> String {
    use std::fmt::Write;

    let s: &Summary = &outcome.summary;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "\n{} of {} captured ({} failed, {} retries, {} recycles) in {:.1}s",
        s.successful,
        s.total_tasks,
        s.failed,
        s.retries,
        s.recycles,
        s.duration_ms / 1000.0
    );
    let _ = writeln!(
        out,
        "workers: {} ({} isolation), screenshots: {}",
        s.worker_count, s.isolation_mode, s.screenshots
    );
    if s.attempts > 0 {
        let a = &s.metrics.attempt_ms;
        let _ = writeln!(
            out,
            "attempt ms: avg {:.0}, p50 {:.0}, p95 {:.0}, max {:.0}",
            a.avg_ms, a.p50_ms, a.p95_ms, a.max_ms
        );
    }
    for f in &outcome.failures {
        let _ = writeln!(out, "  FAIL {} (attempt {}): {}", f.path, f.attempt, f.error);
    }
    if let Some(e) = &outcome.metrics_error {
        let _ = writeln!(out, "warning: {e}");
    }
    out
}
