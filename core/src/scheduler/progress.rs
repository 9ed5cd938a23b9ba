use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Visual progress for a capture run
///
/// One overall bar plus one spinner per worker showing what it is capturing.
pub struct ProgressMonitor {
    /// Multi-progress container
    multi: MultiProgress,
    /// Overall progress bar
    overall: ProgressBar,
    /// Per-worker spinners, index = worker_id - 1
    worker_bars: Vec<ProgressBar>,
    /// Whether monitoring is enabled
    enabled: bool,
    succeeded: AtomicUsize,
    retried: AtomicUsize,
    failed: AtomicUsize,
}

impl ProgressMonitor {
    /// Create a new progress monitor
    ///
    /// # Arguments
    ///
    /// * `total_tasks` - Total number of tasks to capture
    /// * `worker_count` - Number of worker loops
    /// * `enabled` - Whether to draw anything (disabled for jsonl output)
    pub fn new(total_tasks: usize, worker_count: usize, enabled: bool) -> Self {
        if !enabled {
            return Self {
                multi: MultiProgress::new(),
                overall: ProgressBar::hidden(),
                worker_bars: Vec::new(),
                enabled: false,
                succeeded: AtomicUsize::new(0),
                retried: AtomicUsize::new(0),
                failed: AtomicUsize::new(0),
            };
        }

        let multi = MultiProgress::new();
        let overall = multi.add(ProgressBar::new(total_tasks as u64));
        overall.set_style(
            ProgressStyle::default_bar()
                .template(
                    "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} captures ({percent}%) {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓▒░  "),
        );
        overall.set_message("Starting...");

        let spinner_style = ProgressStyle::default_spinner()
            .template("  {spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);

        let worker_bars = (1..=worker_count)
            .map(|worker_id| {
                let bar = multi.add(ProgressBar::new_spinner());
                bar.set_style(spinner_style.clone());
                bar.set_message(format!("worker {worker_id}: idle"));
                bar.enable_steady_tick(Duration::from_millis(100));
                bar
            })
            .collect();

        Self {
            multi,
            overall,
            worker_bars,
            enabled: true,
            succeeded: AtomicUsize::new(0),
            retried: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    /// Show what a worker is currently capturing
    pub fn worker_busy(&self, worker_id: usize, path: &str, attempt: u32) {
        if let Some(bar) = self.worker_bar(worker_id) {
            bar.set_message(format!("worker {worker_id}: {path} (attempt {attempt})"));
        }
    }

    /// Mark a worker as having drained the queue
    pub fn worker_done(&self, worker_id: usize) {
        if let Some(bar) = self.worker_bar(worker_id) {
            bar.finish_with_message(format!("worker {worker_id}: done"));
        }
    }

    /// Advance the overall bar by one successful task
    pub fn task_succeeded(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        self.advance();
    }

    /// Count a retry; the overall position does not move
    pub fn task_retried(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
        self.refresh_message();
    }

    /// Advance the overall bar by one permanently failed task
    pub fn task_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.advance();
    }

    /// `(succeeded, retried, failed)` so far
    pub fn counts(&self) -> (usize, usize, usize) {
        (
            self.succeeded.load(Ordering::Relaxed),
            self.retried.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
        )
    }

    fn advance(&self) {
        if self.enabled {
            self.overall.inc(1);
        }
        self.refresh_message();
    }

    fn refresh_message(&self) {
        if self.enabled {
            let (ok, retry, fail) = self.counts();
            self.overall
                .set_message(format!("ok {ok} | retry {retry} | fail {fail}"));
        }
    }

    /// Print a line without tearing the bars
    pub fn println(&self, line: &str) {
        if self.enabled {
            let _ = self.multi.println(line);
        } else {
            println!("{line}");
        }
    }

    /// Finish overall progress
    pub fn finish(&self, success: bool) {
        if !self.enabled {
            return;
        }

        let msg = if success {
            "✅ All captures completed"
        } else {
            "❌ Some captures failed"
        };

        self.overall.finish_with_message(msg.to_string());
    }

    fn worker_bar(&self, worker_id: usize) -> Option<&ProgressBar> {
        if !self.enabled {
            return None;
        }
        worker_id
            .checked_sub(1)
            .and_then(|idx| self.worker_bars.get(idx))
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        // Ensure all spinners are cleaned up
        for bar in self.worker_bars.drain(..) {
            bar.finish_and_clear();
        }
    }
}
