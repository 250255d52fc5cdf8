use pipedag::dag::{TaskGraph, Work};
use pipedag::engine::{Orchestrator, RunOptions};
use pipedag::errors::PipedagError;
use pipedag::exec::TransformRegistry;
use pipedag_test_utils::builders::TaskTableBuilder;
use pipedag_test_utils::fake_executor::{ExecutionLog, RecordingTransform};
use tokio_util::sync::CancellationToken;

fn bundle_table() -> pipedag::dag::TaskTable {
    TaskTableBuilder::new()
        .task("clean", &[])
        .task("compileStyles", &["clean"])
        .task("compileScripts", &["clean"])
        .task("bundle", &["compileStyles", "compileScripts"])
        .build()
}

#[test]
fn unknown_dependency_is_reported_with_both_names() {
    let table = TaskTableBuilder::new()
        .task("a", &[])
        .task("b", &["a", "missing"])
        .build();

    match TaskGraph::build(&table) {
        Err(PipedagError::UnknownDependency { task, dependency }) => {
            assert_eq!(task, "b");
            assert_eq!(dependency, "missing");
        }
        other => panic!("expected UnknownDependency, got {other:?}"),
    }
}

#[test]
fn unknown_group_member_is_an_unknown_dependency() {
    let table = TaskTableBuilder::new()
        .task("styles", &[])
        .group("build", &[], &["styles", "scripts"])
        .build();

    assert!(matches!(
        TaskGraph::build(&table),
        Err(PipedagError::UnknownDependency { ref task, ref dependency })
            if task == "build" && dependency == "scripts"
    ));
}

#[test]
fn cycle_reports_its_members_sorted() {
    let table = TaskTableBuilder::new()
        .task("root", &[])
        .task("c", &["b"])
        .task("a", &["c", "root"])
        .task("b", &["a"])
        .build();

    match TaskGraph::build(&table) {
        Err(PipedagError::CyclicDependency { members }) => {
            assert_eq!(members, vec!["a", "b", "c"]);
        }
        other => panic!("expected CyclicDependency, got {other:?}"),
    }
}

#[test]
fn self_dependency_is_a_cycle() {
    let table = TaskTableBuilder::new().task("loop", &["loop"]).build();

    match TaskGraph::build(&table) {
        Err(PipedagError::CyclicDependency { members }) => assert_eq!(members, vec!["loop"]),
        other => panic!("expected CyclicDependency, got {other:?}"),
    }
}

#[test]
fn group_membership_can_close_a_cycle() {
    // "all" waits on "a" as a member, and "a" waits on "all".
    let table = TaskTableBuilder::new()
        .task("a", &["all"])
        .group("all", &[], &["a"])
        .build();

    assert!(matches!(
        TaskGraph::build(&table),
        Err(PipedagError::CyclicDependency { .. })
    ));
}

#[test]
fn group_members_become_dependencies() {
    let table = TaskTableBuilder::new()
        .task("clean", &[])
        .task("styles", &[])
        .task("scripts", &[])
        .group("build", &["clean"], &["styles", "scripts", "clean"])
        .build();

    let graph = TaskGraph::build(&table).unwrap();
    assert_eq!(
        graph.dependencies_of("build"),
        &["clean".to_string(), "styles".to_string(), "scripts".to_string()]
    );
    assert!(matches!(graph.work_of("build"), Some(Work::Group(_))));
    assert!(graph.dependents_of("styles").contains(&"build".to_string()));
}

#[test]
fn closure_contains_target_and_transitive_dependencies_only() {
    let table = TaskTableBuilder::new()
        .task("clean", &[])
        .task("compileStyles", &["clean"])
        .task("compileScripts", &["clean"])
        .task("bundle", &["compileStyles", "compileScripts"])
        .task("deploy", &["bundle"])
        .task("unrelated", &[])
        .build();
    let graph = TaskGraph::build(&table).unwrap();

    let mut closure: Vec<_> = graph.closure("bundle").unwrap().into_iter().collect();
    closure.sort();
    assert_eq!(closure, vec!["bundle", "clean", "compileScripts", "compileStyles"]);

    assert!(matches!(
        graph.closure("nope"),
        Err(PipedagError::UnknownTask(name)) if name == "nope"
    ));
}

#[test]
fn waves_follow_dependency_levels() {
    let graph = TaskGraph::build(&bundle_table()).unwrap();

    let waves = graph.waves("bundle").unwrap();
    assert_eq!(
        waves,
        vec![
            vec!["clean".to_string()],
            vec!["compileScripts".to_string(), "compileStyles".to_string()],
            vec!["bundle".to_string()],
        ]
    );
}

#[tokio::test]
async fn cyclic_table_is_rejected_before_any_work_runs() {
    let log = ExecutionLog::new();
    let spy = RecordingTransform::new(log.clone());
    let registry = TransformRegistry::new().with("record", spy.clone());

    let table = TaskTableBuilder::new()
        .task("a", &["b"])
        .task("b", &["a"])
        .task("c", &[])
        .build();

    let result = Orchestrator::new(&table, registry, ".", RunOptions::default());
    assert!(matches!(result, Err(PipedagError::CyclicDependency { .. })));
    assert!(spy.requests().is_empty());
    assert!(log.started().is_empty());
}

#[test]
fn unregistered_transform_is_rejected_at_construction() {
    let table = TaskTableBuilder::new()
        .transform("styles", &[], "sass")
        .build();

    let result = Orchestrator::new(&table, TransformRegistry::new(), ".", RunOptions::default());
    assert!(matches!(
        result,
        Err(PipedagError::UnknownTransform { ref task, ref transform })
            if task == "styles" && transform == "sass"
    ));
}

#[tokio::test]
async fn running_an_unknown_target_fails_without_dispatch() {
    let log = ExecutionLog::new();
    let registry = TransformRegistry::new().with("record", RecordingTransform::new(log.clone()));
    let orchestrator =
        Orchestrator::new(&bundle_table(), registry, ".", RunOptions::default()).unwrap();

    let result = orchestrator.run("deploy", CancellationToken::new()).await;
    assert!(matches!(result, Err(PipedagError::UnknownTask(name)) if name == "deploy"));
    assert!(log.started().is_empty());
}
