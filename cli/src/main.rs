use clap::Parser;
mod commands;
use commands::cli;
use shotrun_core::api::{AppConfig, CliError, SchedulerError};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            exit_code_for_error(&e)
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, CliError> {
    let args = cli::Args::parse();
    let cfg = load_config(args.config.as_deref())?;
    init_tracing(&cfg.logging).map_err(CliError::Command)?;

    match args.command {
        cli::Commands::Run(run_args) => commands::run::run(run_args, cfg).await,
        cli::Commands::Plan(plan_args) => commands::plan::plan(plan_args, cfg.scheduler.workers),
    }
}

fn load_config(explicit: Option<&str>) -> Result<AppConfig, CliError> {
    let loaded = match explicit {
        Some(path) => {
            let path = PathBuf::from(shellexpand::tilde(path).to_string());
            shotrun_core::config::load_file(&path).and_then(|mut cfg| {
                shotrun_core::config::apply_env_overrides(&mut cfg, |k| std::env::var(k).ok())?;
                Ok(cfg)
            })
        }
        None => shotrun_core::config::load_default(),
    };
    loaded.map_err(|e| CliError::Config(e.to_string()))
}

fn exit_code_for_error(e: &CliError) -> i32 {
    // 0: every task captured
    // 1: run completed, some tasks failed (returned as a normal exit code)
    // 11: config / input error
    // 20: platform / IO error
    // 50: internal/uncategorized
    match e {
        CliError::Config(_) => 11,
        CliError::Tasks(_) => 11,
        CliError::Scheduler(se) => match se {
            SchedulerError::InvalidConfiguration(_) => 11,
            SchedulerError::Fatal(_) => 20,
            SchedulerError::Artifact { .. } => 20,
        },
        CliError::Io(_) => 20,
        CliError::Command(_) => 20,
        CliError::Anyhow(_) => 50,
    }
}

fn init_tracing(logging: &shotrun_core::config::LoggingConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(logging.level.clone()).map_err(|e| e.to_string())?,
    };

    let mut maybe_writer = None;

    if logging.file {
        let dir = match logging
            .directory
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(d) => PathBuf::from(shellexpand::tilde(d).to_string()),
            None => std::env::temp_dir().join("shotrun"),
        };

        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let file_name = format!("shotrun.{}.log", std::process::id());
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    if !logging.console && maybe_writer.is_none() {
        return Err("logging disabled for both console and file".to_string());
    }

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });

    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}
