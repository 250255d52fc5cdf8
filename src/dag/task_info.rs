// src/dag/task_info.rs

//! Task definitions and per-run task state.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::engine::TaskName;
use crate::exec::TransformOptions;

/// Reference to a registered transform plus the paths and options it runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformRef {
    /// Name the transform is registered under (e.g. `"copy"`, `"shell"`).
    pub transform: String,
    /// Input path patterns, relative to the project root.
    pub inputs: Vec<String>,
    /// Output directory, relative to the project root.
    pub output_dir: Option<PathBuf>,
    pub options: TransformOptions,
}

impl TransformRef {
    pub fn new(transform: impl Into<String>) -> Self {
        Self {
            transform: transform.into(),
            inputs: Vec::new(),
            output_dir: None,
            options: TransformOptions::default(),
        }
    }
}

/// The unit of work attached to a task.
#[derive(Debug, Clone, PartialEq)]
pub enum Work {
    /// Delegate to an external collaborator.
    Transform(TransformRef),
    /// Run these tasks concurrently; done when all of them are done.
    Group(Vec<TaskName>),
}

/// Static description of a task: what it waits for and what it does.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDef {
    /// Direct dependencies (the `after = [...]` list).
    pub deps: Vec<TaskName>,
    pub work: Work,
}

impl TaskDef {
    pub fn transform(deps: Vec<TaskName>, work: TransformRef) -> Self {
        Self {
            deps,
            work: Work::Transform(work),
        }
    }

    pub fn group(deps: Vec<TaskName>, members: Vec<TaskName>) -> Self {
        Self {
            deps,
            work: Work::Group(members),
        }
    }
}

/// Input to the graph builder: every registered task keyed by name.
pub type TaskTable = BTreeMap<TaskName, TaskDef>;

/// Per-run state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Part of the run, waiting on dependencies (or never released).
    Pending,
    /// Dispatched to the executor.
    Running,
    Succeeded,
    Failed,
}

/// Description of a task that the scheduler wants the executor to run now.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub name: TaskName,
    pub work: Work,
    /// Identifier of the run this dispatch belongs to.
    pub run_id: u64,
}
