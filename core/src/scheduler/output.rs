use chrono::Local;
use serde::Serialize;

use super::progress::ProgressMonitor;
use super::types::{
    FailureRecord, IsolationMode, OutputOptions, QueueItem, RecycleRecord, RetryRecord,
    StreamFormat, SuccessRecord, Summary,
};

/// One JSONL progress event.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProgressEvent<'a> {
    v: u8,
    #[serde(rename = "type")]
    event_type: &'a str,
    ts: String,
    run_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    worker_id: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attempt: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<serde_json::Value>,
}

impl<'a> ProgressEvent<'a> {
    fn new(event_type: &'a str, run_id: &'a str) -> Self {
        Self {
            v: 1,
            event_type,
            ts: Local::now().to_rfc3339(),
            run_id,
            path: None,
            worker_id: None,
            attempt: None,
            error: None,
            metadata: None,
        }
    }
}

/// Turns scheduler events into operator-facing lines: plain text, JSONL, or
/// nothing (quiet), plus a `tracing` event for each.
pub struct RunReporter {
    run_id: String,
    opts: OutputOptions,
    progress: ProgressMonitor,
}

impl RunReporter {
    pub fn new(run_id: &str, opts: &OutputOptions, total_tasks: usize, worker_count: usize) -> Self {
        let bar = opts.progress_bar
            && !opts.quiet
            && opts.stream_format == StreamFormat::Text
            && total_tasks > 0;
        Self {
            run_id: run_id.to_string(),
            opts: opts.clone(),
            progress: ProgressMonitor::new(total_tasks, worker_count, bar),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn run_start(&self, total_tasks: usize, worker_count: usize, mode: IsolationMode) {
        tracing::info!(
            target: "shotrun.run",
            run_id = %self.run_id,
            total_tasks,
            worker_count,
            isolation = %mode,
            "capture run started"
        );
        match self.opts.stream_format {
            StreamFormat::Jsonl => {
                self.emit_json(&run_start_event(&self.run_id, total_tasks, worker_count, mode))
            }
            StreamFormat::Text if !self.opts.quiet => self.progress.println(&format!(
                "▶ capturing {total_tasks} tasks with {worker_count} workers ({mode} isolation)"
            )),
            StreamFormat::Text => {}
        }
    }

    pub fn attempt_start(&self, worker_id: usize, item: &QueueItem) {
        tracing::debug!(
            target: "shotrun.run",
            worker_id,
            path = item.path(),
            attempt = item.attempt,
            queue = %item.queue_type,
            "attempt started"
        );
        self.progress.worker_busy(worker_id, item.path(), item.attempt);
    }

    pub fn worker_done(&self, worker_id: usize) {
        self.progress.worker_done(worker_id);
    }

    pub fn success(&self, rec: &SuccessRecord, done: usize, total: usize) {
        tracing::info!(
            target: "shotrun.run",
            worker_id = rec.worker_id,
            path = %rec.path,
            attempt = rec.attempt,
            attempt_ms = rec.attempt_ms,
            screenshots = rec.screenshot_count,
            "capture succeeded"
        );
        self.progress.task_succeeded();
        let line = format!(
            "[{done}/{total}] ok    {} (worker {}, attempt {}, {:.0}ms, {} screenshots)",
            rec.path, rec.worker_id, rec.attempt, rec.attempt_ms, rec.screenshot_count
        );
        self.emit(&line, &success_event(&self.run_id, rec, done, total));
    }

    pub fn retry(&self, rec: &RetryRecord) {
        tracing::warn!(
            target: "shotrun.run",
            worker_id = rec.worker_id,
            path = %rec.path,
            attempt = rec.attempt,
            error = %rec.error,
            "capture failed, retrying"
        );
        self.progress.task_retried();
        let line = format!(
            "        retry {} (worker {}, attempt {}): {}",
            rec.path, rec.worker_id, rec.attempt, rec.error
        );
        self.emit(&line, &retry_event(&self.run_id, rec));
    }

    pub fn failure(&self, rec: &FailureRecord, done: usize, total: usize) {
        tracing::error!(
            target: "shotrun.run",
            worker_id = rec.worker_id,
            path = %rec.path,
            attempt = rec.attempt,
            error = %rec.error,
            "capture failed permanently"
        );
        self.progress.task_failed();
        let line = format!(
            "[{done}/{total}] FAIL  {} (worker {}, attempt {}): {}",
            rec.path, rec.worker_id, rec.attempt, rec.error
        );
        self.emit(&line, &failure_event(&self.run_id, rec, done, total));
    }

    pub fn recycle(&self, rec: &RecycleRecord) {
        tracing::info!(
            target: "shotrun.session",
            worker_id = rec.worker_id,
            after_successes = rec.after_successes,
            recycle_ms = rec.recycle_ms,
            "worker context recycled"
        );
        let line = format!(
            "        recycle worker {} after {} captures ({:.0}ms)",
            rec.worker_id, rec.after_successes, rec.recycle_ms
        );
        self.emit(&line, &recycle_event(&self.run_id, rec));
    }

    pub fn run_end(&self, summary: &Summary) {
        tracing::info!(
            target: "shotrun.run",
            run_id = %self.run_id,
            successful = summary.successful,
            failed = summary.failed,
            retries = summary.retries,
            recycles = summary.recycles,
            duration_ms = summary.duration_ms,
            "capture run finished"
        );
        self.progress.finish(summary.failed == 0);
        if self.opts.stream_format == StreamFormat::Jsonl {
            self.emit_json(&run_end_event(&self.run_id, summary));
        }
    }

    fn emit(&self, line: &str, ev: &ProgressEvent<'_>) {
        match self.opts.stream_format {
            StreamFormat::Jsonl => self.emit_json(ev),
            StreamFormat::Text if !self.opts.quiet => self.progress.println(line),
            StreamFormat::Text => {}
        }
    }

    fn emit_json(&self, ev: &ProgressEvent<'_>) {
        if let Ok(line) = serde_json::to_string(ev) {
            println!("{line}");
        }
    }
}

fn run_start_event(
    run_id: &str,
    total_tasks: usize,
    worker_count: usize,
    mode: IsolationMode,
) -> ProgressEvent<'_> {
    let mut ev = ProgressEvent::new("run.start", run_id);
    ev.metadata = Some(serde_json::json!({
        "totalTasks": total_tasks,
        "workerCount": worker_count,
        "isolationMode": mode,
    }));
    ev
}

fn success_event<'a>(
    run_id: &'a str,
    rec: &'a SuccessRecord,
    done: usize,
    total: usize,
) -> ProgressEvent<'a> {
    let mut ev = ProgressEvent::new("task.success", run_id);
    ev.path = Some(rec.path.as_str());
    ev.worker_id = Some(rec.worker_id);
    ev.attempt = Some(rec.attempt);
    ev.metadata = Some(serde_json::json!({
        "attemptMs": rec.attempt_ms,
        "queueWaitMs": rec.queue_wait_ms,
        "screenshotCount": rec.screenshot_count,
        "done": done,
        "total": total,
    }));
    ev
}

fn retry_event<'a>(run_id: &'a str, rec: &'a RetryRecord) -> ProgressEvent<'a> {
    let mut ev = ProgressEvent::new("task.retry", run_id);
    ev.path = Some(rec.path.as_str());
    ev.worker_id = Some(rec.worker_id);
    ev.attempt = Some(rec.attempt);
    ev.error = Some(rec.error.as_str());
    ev.metadata = Some(serde_json::json!({ "errorKind": rec.error_kind }));
    ev
}

fn failure_event<'a>(
    run_id: &'a str,
    rec: &'a FailureRecord,
    done: usize,
    total: usize,
) -> ProgressEvent<'a> {
    let mut ev = ProgressEvent::new("task.failure", run_id);
    ev.path = Some(rec.path.as_str());
    ev.worker_id = Some(rec.worker_id);
    ev.attempt = Some(rec.attempt);
    ev.error = Some(rec.error.as_str());
    ev.metadata = Some(serde_json::json!({
        "errorKind": rec.error_kind,
        "done": done,
        "total": total,
    }));
    ev
}

fn recycle_event<'a>(run_id: &'a str, rec: &RecycleRecord) -> ProgressEvent<'a> {
    let mut ev = ProgressEvent::new("worker.recycle", run_id);
    ev.worker_id = Some(rec.worker_id);
    ev.metadata = Some(serde_json::json!({
        "afterSuccesses": rec.after_successes,
        "recycleMs": rec.recycle_ms,
    }));
    ev
}

fn run_end_event<'a>(run_id: &'a str, summary: &Summary) -> ProgressEvent<'a> {
    let mut ev = ProgressEvent::new("run.end", run_id);
    ev.metadata = Some(serde_json::json!({
        "totalTasks": summary.total_tasks,
        "successful": summary.successful,
        "failed": summary.failed,
        "retries": summary.retries,
        "durationMs": summary.duration_ms,
    }));
    ev
}
