// src/engine/report.rs

//! Per-task outcome collection and the aggregated run result.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use crate::dag::{Scheduler, TaskState};
use crate::engine::TaskName;
use crate::errors::{PipedagError, Result};
use crate::exec::WorkError;

/// Final status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Succeeded,
    Failed,
    /// The caller cancelled the run; treated as a failure by the CLI.
    Cancelled,
}

/// What happened to one task of the run.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskReport {
    Succeeded { elapsed: Duration },
    Failed { error: WorkError, elapsed: Duration },
    /// Never dispatched (blocked by a failure, or dispatch was halted).
    NotRun,
}

/// Aggregated result of a run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: u64,
    pub target: TaskName,
    pub status: RunStatus,
    /// Every task in the closure of `target`.
    pub tasks: BTreeMap<TaskName, TaskReport>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// Failed tasks with their verbatim error descriptors.
    pub fn failures(&self) -> BTreeMap<TaskName, WorkError> {
        self.tasks
            .iter()
            .filter_map(|(name, report)| match report {
                TaskReport::Failed { error, .. } => Some((name.clone(), error.clone())),
                _ => None,
            })
            .collect()
    }

    /// Names of tasks that succeeded, sorted.
    pub fn succeeded(&self) -> Vec<TaskName> {
        self.tasks_matching(|r| matches!(r, TaskReport::Succeeded { .. }))
    }

    /// Names of tasks that never ran, sorted.
    pub fn not_run(&self) -> Vec<TaskName> {
        self.tasks_matching(|r| matches!(r, TaskReport::NotRun))
    }

    pub fn task(&self, name: &str) -> Option<&TaskReport> {
        self.tasks.get(name)
    }

    fn tasks_matching(&self, pred: impl Fn(&TaskReport) -> bool) -> Vec<TaskName> {
        self.tasks
            .iter()
            .filter(|(_, r)| pred(r))
            .map(|(n, _)| n.clone())
            .collect()
    }

    /// Convert a non-successful report into the matching error.
    pub fn into_result(self) -> Result<RunReport> {
        match self.status {
            RunStatus::Succeeded => Ok(self),
            RunStatus::Cancelled => Err(PipedagError::Cancelled),
            RunStatus::Failed => Err(PipedagError::TransformFailure {
                failures: self
                    .failures()
                    .into_iter()
                    .map(|(name, err)| (name, err.to_string()))
                    .collect(),
            }),
        }
    }

    /// Human-readable summary, one line per task.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let status = match self.status {
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "FAILED",
            RunStatus::Cancelled => "CANCELLED",
        };
        let _ = writeln!(
            out,
            "run #{} of '{}' {} in {:.2?}",
            self.run_id, self.target, status, self.elapsed
        );
        for (name, report) in &self.tasks {
            let _ = match report {
                TaskReport::Succeeded { elapsed } => writeln!(out, "  ok      {name} ({elapsed:.2?})"),
                TaskReport::Failed { error, elapsed } => {
                    writeln!(out, "  failed  {name} ({elapsed:.2?}): {error}")
                }
                TaskReport::NotRun => writeln!(out, "  skipped {name}"),
            };
        }
        out
    }
}

/// Collects task outcomes as completion events arrive.
#[derive(Debug, Default)]
pub struct RunRecorder {
    outcomes: BTreeMap<TaskName, TaskReport>,
    cancelled: bool,
}

impl RunRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, task: &str, elapsed: Duration) {
        self.outcomes
            .insert(task.to_string(), TaskReport::Succeeded { elapsed });
    }

    pub fn record_failure(&mut self, task: &str, error: WorkError, elapsed: Duration) {
        self.outcomes
            .insert(task.to_string(), TaskReport::Failed { error, elapsed });
    }

    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Build the final report for every task of the scheduler's run.
    ///
    /// Tasks that are not terminal in the scheduler are reported as
    /// [`TaskReport::NotRun`].
    pub fn finish(self, scheduler: &Scheduler, elapsed: Duration) -> RunReport {
        let mut outcomes = self.outcomes;
        let mut tasks = BTreeMap::new();
        let mut all_succeeded = true;

        for name in scheduler.tasks_in_run() {
            let report = match scheduler.state_of(&name) {
                Some(TaskState::Succeeded) | Some(TaskState::Failed) => {
                    outcomes.remove(&name).unwrap_or(TaskReport::NotRun)
                }
                _ => TaskReport::NotRun,
            };
            if !matches!(report, TaskReport::Succeeded { .. }) {
                all_succeeded = false;
            }
            tasks.insert(name, report);
        }

        let status = if self.cancelled {
            RunStatus::Cancelled
        } else if all_succeeded {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        };

        RunReport {
            run_id: scheduler.run_id(),
            target: scheduler.target().to_string(),
            status,
            tasks,
            elapsed,
        }
    }
}
