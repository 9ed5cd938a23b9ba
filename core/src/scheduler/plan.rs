use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

use super::types::{AdaptivePolicy, PolicyMode};

/// Hard ceiling on auto-resolved workers.
pub const MAX_AUTO_WORKERS: usize = 16;

/// Memory budgeted per worker's browser context.
pub const MEMORY_PER_WORKER_GB: f64 = 1.5;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Host resources the auto plan is derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemFacts {
    pub cpu_count: usize,
    pub total_memory_gb: f64,
}

impl SystemFacts {
    pub fn new(cpu_count: usize, total_memory_gb: f64) -> Self {
        Self {
            cpu_count,
            total_memory_gb,
        }
    }

    /// Read CPU count and total memory from the running host.
    pub fn probe() -> Self {
        let mut sys = sysinfo::System::new();
        sys.refresh_memory();
        let total_memory_gb = sys.total_memory() as f64 / BYTES_PER_GB;
        let cpu_count = num_cpus::get().max(1);

        tracing::debug!(cpu_count, total_memory_gb, "probed host resources");
        Self {
            cpu_count,
            total_memory_gb,
        }
    }
}

/// Effective worker count plus the rationale behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerPlan {
    pub worker_count: usize,
    pub adaptive_policy: AdaptivePolicy,
}

/// Decide how many workers to run.
///
/// A requested count is taken as-is once validated. Otherwise one core is
/// kept for the orchestrator and host browser process, each worker is
/// budgeted [`MEMORY_PER_WORKER_GB`], and the result is capped at
/// [`MAX_AUTO_WORKERS`]. Never returns 0.
pub fn resolve(requested: Option<i64>, facts: &SystemFacts) -> Result<WorkerPlan, SchedulerError> {
    let cpu_bound = facts.cpu_count.saturating_sub(1).max(1);
    let memory_bound = memory_bound(facts.total_memory_gb);

    let (worker_count, mode) = match requested {
        Some(n) if n >= 1 => (n as usize, PolicyMode::Manual),
        Some(n) => {
            return Err(SchedulerError::invalid(format!(
                "worker count must be an integer >= 1, got {n}"
            )))
        }
        None => (
            cpu_bound.min(memory_bound).min(MAX_AUTO_WORKERS).max(1),
            PolicyMode::Auto,
        ),
    };

    Ok(WorkerPlan {
        worker_count,
        adaptive_policy: AdaptivePolicy {
            mode,
            cpu_count: facts.cpu_count,
            cpu_bound,
            total_memory_gb: (facts.total_memory_gb * 100.0).round() / 100.0,
            memory_bound,
        },
    })
}

fn memory_bound(total_memory_gb: f64) -> usize {
    if !total_memory_gb.is_finite() || total_memory_gb <= 0.0 {
        return 1;
    }
    ((total_memory_gb / MEMORY_PER_WORKER_GB).floor() as usize).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_count_is_taken_verbatim() {
        let plan = resolve(Some(32), &SystemFacts::new(2, 1.0)).unwrap();
        assert_eq!(plan.worker_count, 32);
        assert_eq!(plan.adaptive_policy.mode, PolicyMode::Manual);
    }

    #[test]
    fn manual_count_below_one_is_invalid() {
        for bad in [0, -1] {
            let err = resolve(Some(bad), &SystemFacts::new(8, 16.0)).unwrap_err();
            assert!(matches!(err, SchedulerError::InvalidConfiguration(_)));
        }
    }

    #[test]
    fn auto_reserves_a_core() {
        let plan = resolve(None, &SystemFacts::new(4, 64.0)).unwrap();
        assert_eq!(plan.worker_count, 3);
        assert_eq!(plan.adaptive_policy.mode, PolicyMode::Auto);
        assert_eq!(plan.adaptive_policy.cpu_bound, 3);
    }

    #[test]
    fn auto_is_memory_bound() {
        let plan = resolve(None, &SystemFacts::new(32, 7.9)).unwrap();
        assert_eq!(plan.adaptive_policy.memory_bound, 5);
        assert_eq!(plan.worker_count, 5);
    }

    #[test]
    fn auto_caps_at_sixteen() {
        let plan = resolve(None, &SystemFacts::new(128, 512.0)).unwrap();
        assert_eq!(plan.worker_count, MAX_AUTO_WORKERS);
    }

    #[test]
    fn auto_never_returns_zero() {
        let plan = resolve(None, &SystemFacts::new(1, 0.5)).unwrap();
        assert_eq!(plan.worker_count, 1);
        assert_eq!(plan.adaptive_policy.cpu_bound, 1);
        assert_eq!(plan.adaptive_policy.memory_bound, 1);

        let plan = resolve(None, &SystemFacts::new(0, 0.0)).unwrap();
        assert_eq!(plan.worker_count, 1);
    }

    #[test]
    fn probe_reports_at_least_one_cpu() {
        assert!(SystemFacts::probe().cpu_count >= 1);
    }
}
