use clap::{Args as ClapArgs, Parser, Subcommand};

use shotrun_core::api::IsolationMode;

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationArg {
    Fast,
    Strict,
}

impl From<IsolationArg> for IsolationMode {
    fn from(arg: IsolationArg) -> Self {
        match arg {
            IsolationArg::Fast => IsolationMode::Fast,
            IsolationArg::Strict => IsolationMode::Strict,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "shotrun", version, about = "Schedule visual captures across parallel workers")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file to use instead of ~/.shotrun/config.toml / ./shotrun.toml.
    #[arg(long, global = true)]
    pub config: Option<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// JSON file holding an array of tasks.
    #[arg(long)]
    pub tasks: String,

    /// Worker count; omit to size from CPU and memory.
    #[arg(long, allow_negative_numbers = true)]
    pub workers: Option<i64>,

    #[arg(long, value_enum)]
    pub isolation: Option<IsolationArg>,

    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Recycle a fast-mode context after this many successes (0 disables).
    #[arg(long)]
    pub recycle_every: Option<u32>,

    #[arg(long)]
    pub metrics_path: Option<String>,

    /// Fail an attempt that runs longer than this.
    #[arg(long)]
    pub attempt_timeout_ms: Option<u64>,

    /// Simulate captures instead of driving a browser.
    #[arg(long, default_value_t = false, conflicts_with = "helper")]
    pub dry_run: bool,

    /// Capture helper program (command platform).
    #[arg(long)]
    pub helper: Option<String>,

    /// Extra argument for the capture helper. Can be specified multiple times.
    #[arg(long = "helper-arg", action = clap::ArgAction::Append, allow_hyphen_values = true)]
    pub helper_args: Vec<String>,

    #[arg(long, default_value = "text")]
    pub stream_format: String,

    /// Suppress per-task progress lines.
    #[arg(long, default_value_t = false)]
    pub quiet: bool,

    /// Draw a progress bar (text output only).
    #[arg(long, default_value_t = false)]
    pub progress: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct PlanArgs {
    #[arg(long, allow_negative_numbers = true)]
    pub workers: Option<i64>,

    /// Also preview dispatch order for this task file.
    #[arg(long)]
    pub tasks: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Capture every task in a task file.
    Run(RunArgs),
    /// Show the worker plan this host would get.
    Plan(PlanArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_flags() {
        let args = Args::try_parse_from([
            "shotrun",
            "run",
            "--tasks",
            "tasks.json",
            "--workers",
            "4",
            "--isolation",
            "strict",
            "--max-retries",
            "2",
            "--helper",
            "node",
            "--helper-arg",
            "capture.js",
            "--helper-arg",
            "--no-sandbox",
            "--quiet",
        ])
        .unwrap();

        let Commands::Run(run) = args.command else {
            panic!("expected run");
        };
        assert_eq!(run.tasks, "tasks.json");
        assert_eq!(run.workers, Some(4));
        assert_eq!(run.isolation, Some(IsolationArg::Strict));
        assert_eq!(run.max_retries, Some(2));
        assert_eq!(run.helper.as_deref(), Some("node"));
        assert_eq!(run.helper_args, vec!["capture.js", "--no-sandbox"]);
        assert!(run.quiet);
        assert!(!run.dry_run);
    }

    #[test]
    fn dry_run_conflicts_with_helper() {
        let res = Args::try_parse_from([
            "shotrun", "run", "--tasks", "t.json", "--dry-run", "--helper", "node",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn negative_workers_reach_validation() {
        let args =
            Args::try_parse_from(["shotrun", "plan", "--workers", "-2"]).unwrap();
        let Commands::Plan(plan) = args.command else {
            panic!("expected plan");
        };
        assert_eq!(plan.workers, Some(-2));
    }
}
