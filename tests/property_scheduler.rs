use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use pipedag::dag::{TaskGraph, TaskTable};
use pipedag::dag::Scheduler;
use pipedag::engine::{CoreCommand, CoreRun, RunEvent, RunOptions, RunStatus, TaskOutcome};
use pipedag::exec::WorkError;
use pipedag::types::FailurePolicy;
use pipedag_test_utils::builders::TaskTableBuilder;

// Strategy to generate a valid DAG.
// We ensure acyclicity by only allowing task N to depend on tasks 0..N-1.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = TaskTable> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_tasks),
            num_tasks,
        )
        .prop_map(move |raw_deps| {
            let mut builder = TaskTableBuilder::new();
            for (i, potential_deps) in raw_deps.into_iter().enumerate() {
                let deps: BTreeSet<String> = potential_deps
                    .into_iter()
                    .filter(|_| i > 0)
                    .map(|d| format!("task_{}", d % i.max(1)))
                    .collect();
                let deps: Vec<&str> = deps.iter().map(|s| s.as_str()).collect();
                builder = builder.task(&format!("task_{i}"), &deps);
            }
            // A group over every task makes the whole table the closure.
            let all: Vec<String> = (0..num_tasks).map(|i| format!("task_{i}")).collect();
            let all: Vec<&str> = all.iter().map(|s| s.as_str()).collect();
            builder.group("all", &[], &all).build()
        })
    })
}

struct Simulation {
    dispatch_order: Vec<String>,
    dispatch_counts: HashMap<String, usize>,
    max_running: usize,
    status: RunStatus,
    failed: BTreeSet<String>,
    not_run: BTreeSet<String>,
}

/// Drive the pure core, completing in-flight tasks in an order chosen by
/// `picks`, failing the tasks in `failing`. Checks dependency order as it
/// goes.
fn simulate(
    graph: Arc<TaskGraph>,
    options: RunOptions,
    picks: &[usize],
    failing: &HashSet<String>,
) -> Simulation {
    let mut core = CoreRun::new(Scheduler::new(Arc::clone(&graph), "all", 1, &options).unwrap());
    let mut in_flight: Vec<String> = Vec::new();
    let mut succeeded: HashSet<String> = HashSet::new();
    let mut sim = Simulation {
        dispatch_order: Vec::new(),
        dispatch_counts: HashMap::new(),
        max_running: 0,
        status: RunStatus::Succeeded,
        failed: BTreeSet::new(),
        not_run: BTreeSet::new(),
    };

    let mut step = core.start();
    let mut pick = 0usize;
    loop {
        for command in step.commands.drain(..) {
            let CoreCommand::DispatchTasks(tasks) = command;
            for task in tasks {
                for dep in graph.dependencies_of(&task.name) {
                    assert!(
                        succeeded.contains(dep),
                        "{} dispatched before dependency {} succeeded",
                        task.name,
                        dep
                    );
                }
                *sim.dispatch_counts.entry(task.name.clone()).or_default() += 1;
                sim.dispatch_order.push(task.name.clone());
                in_flight.push(task.name);
            }
        }
        sim.max_running = sim.max_running.max(in_flight.len());

        if !step.keep_running {
            assert!(in_flight.is_empty(), "run finished with tasks in flight");
            break;
        }
        assert!(!in_flight.is_empty(), "run waiting with nothing in flight");

        let idx = picks.get(pick).copied().unwrap_or(0) % in_flight.len();
        pick += 1;
        let task = in_flight.remove(idx);
        let outcome = if failing.contains(&task) {
            TaskOutcome::Failed(WorkError::new(format!("{task} failed")))
        } else {
            succeeded.insert(task.clone());
            TaskOutcome::Success
        };
        step = core.step(RunEvent::TaskCompleted {
            task,
            outcome,
            elapsed: Duration::ZERO,
        });
    }

    let report = core.into_report(Duration::ZERO);
    sim.status = report.status;
    sim.failed = report.failures().into_keys().collect();
    sim.not_run = report.not_run().into_iter().collect();
    sim
}

/// Every task that is `failed` or transitively depends on one.
fn tainted(graph: &TaskGraph, failed: &BTreeSet<String>) -> HashSet<String> {
    let mut out = HashSet::new();
    let mut stack: Vec<String> = failed.iter().cloned().collect();
    while let Some(name) = stack.pop() {
        if out.insert(name.clone()) {
            stack.extend(graph.dependents_of(&name).iter().cloned());
        }
    }
    out
}

proptest! {
    #[test]
    fn every_task_runs_exactly_once_in_dependency_order(
        table in dag_strategy(12),
        picks in proptest::collection::vec(any::<usize>(), 0..64),
        limit in proptest::option::of(1usize..4),
    ) {
        let graph = Arc::new(TaskGraph::build(&table).unwrap());
        let options = RunOptions { max_concurrency: limit, ..RunOptions::default() };
        let sim = simulate(Arc::clone(&graph), options, &picks, &HashSet::new());

        prop_assert_eq!(sim.status, RunStatus::Succeeded);
        prop_assert_eq!(sim.dispatch_order.len(), graph.len());
        for name in graph.tasks() {
            prop_assert_eq!(sim.dispatch_counts.get(name).copied(), Some(1));
        }
        if let Some(limit) = limit {
            prop_assert!(sim.max_running <= limit);
        }
    }

    #[test]
    fn dependents_of_failed_tasks_never_run(
        table in dag_strategy(12),
        picks in proptest::collection::vec(any::<usize>(), 0..64),
        failing_idx in proptest::collection::vec(0usize..12, 1..4),
        halt in any::<bool>(),
    ) {
        let graph = Arc::new(TaskGraph::build(&table).unwrap());
        let failing: HashSet<String> = failing_idx
            .iter()
            .map(|i| format!("task_{i}"))
            .filter(|name| graph.contains(name))
            .collect();
        let policy = if halt { FailurePolicy::Halt } else { FailurePolicy::Continue };
        let options = RunOptions { max_concurrency: None, failure_policy: policy };

        let sim = simulate(Arc::clone(&graph), options, &picks, &failing);

        for count in sim.dispatch_counts.values() {
            prop_assert_eq!(*count, 1);
        }
        // Reported failures are exactly the failing tasks that were dispatched.
        let dispatched_failing: BTreeSet<String> = failing
            .iter()
            .filter(|name| sim.dispatch_counts.contains_key(*name))
            .cloned()
            .collect();
        prop_assert_eq!(&sim.failed, &dispatched_failing);

        let blocked = tainted(&graph, &sim.failed);
        for name in sim.dispatch_counts.keys() {
            if !sim.failed.contains(name) {
                prop_assert!(!blocked.contains(name), "{} ran after a dependency failed", name);
            }
        }

        if sim.failed.is_empty() {
            prop_assert_eq!(sim.status, RunStatus::Succeeded);
        } else {
            prop_assert_eq!(sim.status, RunStatus::Failed);
            prop_assert!(sim.not_run.contains("all"));
        }

        if !halt {
            // Under Continue, everything not downstream of a failure runs.
            for name in graph.tasks() {
                if !blocked.contains(name) {
                    prop_assert!(sim.dispatch_counts.contains_key(name), "{} never ran", name);
                }
            }
        }
    }
}
