use std::time::Duration;

use pipedag::engine::{Orchestrator, RunEvent, RunOptions, RunStatus, TaskReport};
use pipedag::exec::TransformRegistry;
use pipedag::types::FailurePolicy;
use pipedag_test_utils::builders::TaskTableBuilder;
use pipedag_test_utils::fake_executor::{ExecutionLog, FakeExecutor, RecordingTransform};
use pipedag_test_utils::{init_tracing, with_timeout};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// The executor is faked, but construction still checks transform names.
fn orchestrator(table: &pipedag::dag::TaskTable, options: RunOptions) -> Orchestrator {
    let registry = TransformRegistry::new().with("record", RecordingTransform::default());
    Orchestrator::new(table, registry, ".", options).unwrap()
}

fn bundle_orchestrator(options: RunOptions) -> Orchestrator {
    let table = TaskTableBuilder::new()
        .task("clean", &[])
        .task("compileStyles", &["clean"])
        .task("compileScripts", &["clean"])
        .task("bundle", &["compileStyles", "compileScripts"])
        .build();
    orchestrator(&table, options)
}

fn channel() -> (mpsc::Sender<RunEvent>, mpsc::Receiver<RunEvent>) {
    mpsc::channel(64)
}

#[tokio::test]
async fn bundle_runs_clean_then_both_compiles_concurrently_then_bundle() {
    init_tracing();
    let orch = bundle_orchestrator(RunOptions::default());
    let log = ExecutionLog::new();
    let (tx, rx) = channel();
    let executor = FakeExecutor::new(tx, log.clone()).default_delay(Duration::from_millis(50));

    let report = with_timeout(orch.run_with("bundle", executor, rx, CancellationToken::new()))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Succeeded);
    assert_eq!(
        report.succeeded(),
        vec!["bundle", "clean", "compileScripts", "compileStyles"]
    );

    let clean = log.execution("clean").unwrap();
    let styles = log.execution("compileStyles").unwrap();
    let scripts = log.execution("compileScripts").unwrap();
    let bundle = log.execution("bundle").unwrap();

    assert!(clean.finished <= styles.started);
    assert!(clean.finished <= scripts.started);
    assert!(styles.overlaps(&scripts), "independent compiles should overlap");
    assert!(styles.finished <= bundle.started);
    assert!(scripts.finished <= bundle.started);
    assert_eq!(log.max_in_flight(), 2);
}

#[tokio::test]
async fn failing_compile_blocks_bundle_and_reports_only_itself() {
    init_tracing();
    let orch = bundle_orchestrator(RunOptions::default());
    let log = ExecutionLog::new();
    let (tx, rx) = channel();
    let executor = FakeExecutor::new(tx, log.clone())
        .failing("compileScripts", "Unexpected token in app.js")
        .delay("compileStyles", Duration::from_millis(80));

    let report = with_timeout(orch.run_with("bundle", executor, rx, CancellationToken::new()))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Failed);
    let failures = report.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(
        failures["compileScripts"].message(),
        "Unexpected token in app.js"
    );
    assert!(matches!(report.task("clean"), Some(TaskReport::Succeeded { .. })));
    assert!(matches!(
        report.task("compileStyles"),
        Some(TaskReport::Succeeded { .. })
    ));
    assert_eq!(report.task("bundle"), Some(&TaskReport::NotRun));
    assert_eq!(log.count("bundle"), 0);

    match report.into_result() {
        Err(pipedag::errors::PipedagError::TransformFailure { failures }) => {
            assert_eq!(
                failures,
                vec![(
                    "compileScripts".to_string(),
                    "Unexpected token in app.js".to_string()
                )]
            );
        }
        other => panic!("expected TransformFailure, got {other:?}"),
    }
}

#[tokio::test]
async fn concurrency_bound_of_one_serialises_independent_tasks() {
    init_tracing();
    let table = TaskTableBuilder::new()
        .task("images", &[])
        .task("fonts", &[])
        .task("styles", &[])
        .group("assets", &[], &["images", "fonts", "styles"])
        .build();
    let orch = orchestrator(
        &table,
        RunOptions {
            max_concurrency: Some(1),
            ..RunOptions::default()
        },
    );
    let log = ExecutionLog::new();
    let (tx, rx) = channel();
    let executor = FakeExecutor::new(tx, log.clone()).default_delay(Duration::from_millis(10));

    let report = with_timeout(orch.run_with("assets", executor, rx, CancellationToken::new()))
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(log.max_in_flight(), 1);
    assert_eq!(log.started().len(), 4);
}

#[tokio::test]
async fn unbounded_run_dispatches_all_independent_tasks_at_once() {
    init_tracing();
    let table = TaskTableBuilder::new()
        .task("images", &[])
        .task("fonts", &[])
        .task("styles", &[])
        .group("assets", &[], &["images", "fonts", "styles"])
        .build();
    let orch = orchestrator(&table, RunOptions::default());
    let log = ExecutionLog::new();
    let (tx, rx) = channel();
    let executor = FakeExecutor::new(tx, log.clone()).default_delay(Duration::from_millis(50));

    let report = with_timeout(orch.run_with("assets", executor, rx, CancellationToken::new()))
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(log.max_in_flight(), 3);
}

#[tokio::test]
async fn continue_policy_completes_unaffected_branch() {
    init_tracing();
    let table = TaskTableBuilder::new()
        .task("clean", &[])
        .task("compileStyles", &["clean"])
        .task("compileScripts", &["clean"])
        .task("minifyStyles", &["compileStyles"])
        .task("bundle", &["minifyStyles", "compileScripts"])
        .build();
    let orch = orchestrator(
        &table,
        RunOptions {
            max_concurrency: None,
            failure_policy: FailurePolicy::Continue,
        },
    );
    let log = ExecutionLog::new();
    let (tx, rx) = channel();
    // compileScripts fails first; minifyStyles is only released afterwards.
    let executor = FakeExecutor::new(tx, log.clone())
        .failing("compileScripts", "boom")
        .delay("compileStyles", Duration::from_millis(50));

    let report = with_timeout(orch.run_with("bundle", executor, rx, CancellationToken::new()))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(
        report.succeeded(),
        vec!["clean", "compileStyles", "minifyStyles"]
    );
    assert_eq!(report.not_run(), vec!["bundle"]);
}

#[tokio::test]
async fn halt_policy_skips_work_released_after_the_failure() {
    init_tracing();
    let table = TaskTableBuilder::new()
        .task("clean", &[])
        .task("compileStyles", &["clean"])
        .task("compileScripts", &["clean"])
        .task("minifyStyles", &["compileStyles"])
        .task("bundle", &["minifyStyles", "compileScripts"])
        .build();
    let orch = orchestrator(&table, RunOptions::default());
    let log = ExecutionLog::new();
    let (tx, rx) = channel();
    let executor = FakeExecutor::new(tx, log.clone())
        .failing("compileScripts", "boom")
        .delay("compileStyles", Duration::from_millis(50));

    let report = with_timeout(orch.run_with("bundle", executor, rx, CancellationToken::new()))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.succeeded(), vec!["clean", "compileStyles"]);
    assert_eq!(report.not_run(), vec!["bundle", "minifyStyles"]);
    assert_eq!(log.count("minifyStyles"), 0);
}

#[tokio::test]
async fn pre_cancelled_token_dispatches_nothing() {
    init_tracing();
    let orch = bundle_orchestrator(RunOptions::default());
    let log = ExecutionLog::new();
    let (tx, rx) = channel();
    let executor = FakeExecutor::new(tx, log.clone());

    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = with_timeout(orch.run_with("bundle", executor, rx, cancel))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Cancelled);
    assert!(log.started().is_empty());
    assert_eq!(report.not_run().len(), 4);
    assert!(matches!(
        report.into_result(),
        Err(pipedag::errors::PipedagError::Cancelled)
    ));
}

#[tokio::test]
async fn cancel_mid_run_lets_in_flight_tasks_finish() {
    init_tracing();
    let orch = bundle_orchestrator(RunOptions::default());
    let log = ExecutionLog::new();
    let (tx, rx) = channel();
    let executor = FakeExecutor::new(tx, log.clone())
        .delay("compileStyles", Duration::from_millis(150))
        .delay("compileScripts", Duration::from_millis(150));

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });
    }

    let report = with_timeout(orch.run_with("bundle", executor, rx, cancel))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Cancelled);
    assert_eq!(
        report.succeeded(),
        vec!["clean", "compileScripts", "compileStyles"]
    );
    assert_eq!(report.not_run(), vec!["bundle"]);
    assert_eq!(log.count("bundle"), 0);
}

#[tokio::test]
async fn each_run_gets_a_fresh_state_and_increasing_run_id() {
    init_tracing();
    let orch = bundle_orchestrator(RunOptions::default());

    let mut ids = Vec::new();
    for _ in 0..2 {
        let log = ExecutionLog::new();
        let (tx, rx) = channel();
        let executor = FakeExecutor::new(tx, log.clone());
        let report = with_timeout(orch.run_with("bundle", executor, rx, CancellationToken::new()))
            .await
            .unwrap();
        assert!(report.is_success());
        assert_eq!(log.started().len(), 4);
        ids.push(report.run_id);
    }
    assert!(ids[0] < ids[1]);
}
