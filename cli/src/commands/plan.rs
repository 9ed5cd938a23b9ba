use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use shotrun_core::api::{resolve, CliError, QueueState, SystemFacts, Task, WorkerPlan};

use super::cli::PlanArgs;
use super::run::load_tasks;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanReport {
    system: SystemFacts,
    plan: WorkerPlan,
    #[serde(skip_serializing_if = "Option::is_none")]
    dispatch_order: Option<Vec<DispatchPreview>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DispatchPreview {
    id: String,
    path: String,
    estimated_cost: u64,
}

pub fn plan(args: PlanArgs, configured_workers: Option<i64>) -> Result<i32, CliError> {
    let tasks = match &args.tasks {
        Some(p) => Some(load_tasks(&PathBuf::from(shellexpand::tilde(p).to_string()))?),
        None => None,
    };
    let report = build_report(
        args.workers.or(configured_workers),
        SystemFacts::probe(),
        tasks,
    )?;
    let body =
        serde_json::to_string_pretty(&report).map_err(|e| CliError::Command(e.to_string()))?;
    println!("{body}");
    Ok(0)
}

fn build_report(
    workers: Option<i64>,
    facts: SystemFacts,
    tasks: Option<Vec<Task>>,
) -> Result<PlanReport, CliError> {
    let plan = resolve(workers, &facts)?;
    Ok(PlanReport {
        system: facts,
        plan,
        dispatch_order: tasks.map(dispatch_order),
    })
}

/// First-pass dispatch order, taken from the run queue itself.
fn dispatch_order(tasks: Vec<Task>) -> Vec<DispatchPreview> {
    let mut queue = QueueState::new(tasks.into_iter().map(Arc::new));
    std::iter::from_fn(|| queue.get_next_task())
        .map(|item| DispatchPreview {
            id: item.task.id().to_string(),
            path: item.task.path().to_string(),
            estimated_cost: item.task.estimated_cost(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use shotrun_core::api::TaskPayload;

    fn task(path: &str, cost: u64) -> Task {
        Task::new(path, path, TaskPayload::new(format!("http://x/{path}"))).with_estimated_cost(cost)
    }

    #[test]
    fn report_shape_without_tasks() {
        let report = build_report(Some(3), SystemFacts::new(8, 16.0), None).unwrap();
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["system"]["cpuCount"], 8);
        assert_eq!(json["plan"]["workerCount"], 3);
        assert_eq!(json["plan"]["adaptivePolicy"]["mode"], "manual");
        assert!(json.get("dispatchOrder").is_none());
    }

    #[test]
    fn dispatch_order_is_heaviest_first_with_later_ties_first() {
        let tasks = vec![task("a", 100), task("b", 300), task("c", 100), task("d", 200)];
        let report = build_report(None, SystemFacts::new(4, 16.0), Some(tasks)).unwrap();
        let json = serde_json::to_value(&report).unwrap();

        let order: Vec<&str> = json["dispatchOrder"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["path"].as_str().unwrap())
            .collect();
        assert_eq!(order, vec!["b", "d", "c", "a"]);
        assert_eq!(json["dispatchOrder"][0]["estimatedCost"], 300);
        assert_eq!(json["plan"]["workerCount"], 3);
    }

    #[test]
    fn invalid_worker_count_is_rejected() {
        let err = build_report(Some(0), SystemFacts::new(4, 16.0), None).unwrap_err();
        assert!(matches!(err, CliError::Scheduler(_)));
    }
}
