//! Captures driven by an external helper program.
//!
//! Each execution context is a private profile directory the helper runs
//! its browser against. One attempt = one helper process: it gets a JSON
//! request on stdin and answers with a JSON result on stdout.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use shotrun_core::api::{
    AttemptRequest, AutomationPlatform, CommandPlatformConfig, ExecutionContext, ExecutionError,
    ExecutionResult, ExecutorOptions, PhaseTimings, PlatformHandle, TaskExecutor, TaskPayload,
};

pub struct CommandPlatform {
    scratch_dir: Option<PathBuf>,
}

impl CommandPlatform {
    pub fn new(cfg: &CommandPlatformConfig) -> Self {
        Self {
            scratch_dir: cfg
                .scratch_dir
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .map(|s| PathBuf::from(shellexpand::tilde(s).to_string())),
        }
    }
}

#[async_trait]
impl AutomationPlatform for CommandPlatform {
    fn name(&self) -> &str {
        "command"
    }

    async fn launch(&self, _options: &ExecutorOptions) -> Result<Arc<dyn PlatformHandle>> {
        let base = self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir);
        let root = base.join(format!("shotrun-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("creating scratch dir {}", root.display()))?;

        tracing::debug!(target: "shotrun.platform", root = %root.display(), "command platform ready");
        Ok(Arc::new(CommandHandle {
            root,
            next_id: AtomicUsize::new(0),
        }))
    }
}

struct CommandHandle {
    root: PathBuf,
    next_id: AtomicUsize,
}

#[async_trait]
impl PlatformHandle for CommandHandle {
    async fn new_context(&self, worker_id: usize) -> Result<Box<dyn ExecutionContext>> {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        let id = format!("w{worker_id}-p{n}");
        let dir = self.root.join(&id);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating profile dir {}", dir.display()))?;
        Ok(Box::new(ProfileContext { id, dir }))
    }

    async fn shutdown(&self) -> Result<()> {
        remove_dir_if_exists(&self.root).await
    }
}

/// A browser profile directory owned by one worker.
pub struct ProfileContext {
    id: String,
    dir: PathBuf,
}

impl ProfileContext {
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ExecutionContext for ProfileContext {
    fn id(&self) -> &str {
        &self.id
    }

    /// Empty the profile: storage, caches, cookies and service workers all
    /// live under it.
    async fn reset(&mut self) -> Result<()> {
        remove_dir_if_exists(&self.dir).await?;
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        remove_dir_if_exists(&self.dir).await
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

async fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("removing {}", dir.display())),
    }
}

/// What the helper reads from stdin.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HelperRequest<'a> {
    task_id: &'a str,
    path: &'a str,
    attempt: u32,
    worker_id: usize,
    profile_dir: &'a Path,
    output_dir: &'a str,
    payload: &'a TaskPayload,
    options: &'a ExecutorOptions,
}

/// What the helper writes to stdout on success.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct HelperResponse {
    screenshot_count: u32,
    timings: PhaseTimings,
}

pub struct CommandExecutor {
    program: String,
    args: Vec<String>,
    output_dir: String,
    stderr_tail_bytes: usize,
}

impl CommandExecutor {
    pub fn new(cfg: &CommandPlatformConfig) -> Self {
        Self {
            program: cfg.program.clone(),
            args: cfg.args.clone(),
            output_dir: shellexpand::tilde(&cfg.output_dir).to_string(),
            stderr_tail_bytes: cfg.stderr_tail_bytes,
        }
    }
}

#[async_trait]
impl TaskExecutor for CommandExecutor {
    fn name(&self) -> &str {
        "command"
    }

    async fn execute(
        &self,
        context: &mut dyn ExecutionContext,
        request: AttemptRequest<'_>,
    ) -> Result<ExecutionResult, ExecutionError> {
        let profile = context
            .as_any_mut()
            .downcast_mut::<ProfileContext>()
            .ok_or_else(|| {
                ExecutionError::Session("command executor needs a profile context".into())
            })?;

        let body = serde_json::to_vec(&HelperRequest {
            task_id: request.task.id(),
            path: request.task.path(),
            attempt: request.attempt,
            worker_id: request.worker_id,
            profile_dir: profile.dir(),
            output_dir: &self.output_dir,
            payload: request.task.payload(),
            options: request.options,
        })
        .map_err(|e| ExecutionError::failed(format!("encoding helper request: {e}")))?;

        let started = Instant::now();
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecutionError::failed(format!("spawning {}: {e}", self.program)))?;

        // Feed stdin while stdout/stderr drain; a helper that logs before
        // reading its request must not stall on a full pipe.
        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                // A helper that exits without reading stdin surfaces through its exit status.
                let _ = stdin.write_all(&body).await;
                let _ = stdin.shutdown().await;
            }
        };
        let ((), output) = tokio::join!(feed, child.wait_with_output());
        let output = output?;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        if !output.status.success() {
            let code = output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExecutionError::failed(format!(
                "capture helper exited with {code}: {}",
                tail(stderr.trim(), self.stderr_tail_bytes)
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let response = parse_response(&stdout)?;
        let mut timings = response.timings;
        if timings.total_ms <= 0.0 {
            timings.total_ms = elapsed_ms;
        }

        Ok(ExecutionResult {
            worker_id: request.worker_id,
            attempt: request.attempt,
            screenshot_count: response.screenshot_count,
            timings,
        })
    }
}

/// The helper may log before its result; the last non-empty line wins.
fn parse_response(stdout: &str) -> Result<HelperResponse, ExecutionError> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| ExecutionError::failed("capture helper printed no result"))?;
    serde_json::from_str(line)
        .map_err(|e| ExecutionError::failed(format!("invalid helper result: {e}: {line}")))
}

/// Last `max` bytes of `s`, cut on a char boundary.
fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}
