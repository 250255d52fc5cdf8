// src/dag/state_manager.rs

//! Per-run state management for tasks in the scheduler.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, info};

use crate::dag::task_info::{ScheduledTask, TaskState};
use crate::dag::TaskGraph;
use crate::engine::TaskName;

/// Scheduler bookkeeping for one task of the current run.
#[derive(Debug, Clone)]
pub struct RunTask {
    pub state: TaskState,
    /// Dependencies that have not yet succeeded in this run.
    pub remaining_deps: usize,
}

/// Manages per-run state transitions for tasks.
///
/// Only tasks in the closure of the run target are present in `tasks`.
pub struct StateManager<'a> {
    graph: &'a TaskGraph,
    tasks: &'a mut HashMap<TaskName, RunTask>,
    ready: &'a mut VecDeque<TaskName>,
    run_id: u64,
}

impl<'a> StateManager<'a> {
    pub fn new(
        graph: &'a TaskGraph,
        tasks: &'a mut HashMap<TaskName, RunTask>,
        ready: &'a mut VecDeque<TaskName>,
        run_id: u64,
    ) -> Self {
        Self {
            graph,
            tasks,
            ready,
            run_id,
        }
    }

    /// Initialise in-degrees for every task in `closure` and seed the ready
    /// set with those that have no dependencies.
    pub fn seed(&mut self, closure: &HashSet<TaskName>) {
        let mut names: Vec<&TaskName> = closure.iter().collect();
        names.sort();

        for name in names {
            let remaining_deps = self.graph.dependencies_of(name).len();
            self.tasks.insert(
                name.clone(),
                RunTask {
                    state: TaskState::Pending,
                    remaining_deps,
                },
            );
            if remaining_deps == 0 {
                debug!(task = %name, run_id = self.run_id, "no dependencies; ready");
                self.ready.push_back(name.clone());
            }
        }
    }

    /// Record that `task` succeeded and decrement the in-degree of its
    /// dependents, moving newly unblocked ones into the ready set.
    pub fn release_dependents(&mut self, task: &str) {
        for dependent in self.graph.dependents_of(task) {
            let Some(entry) = self.tasks.get_mut(dependent) else {
                // Dependent is outside the closure of this run's target.
                continue;
            };

            entry.remaining_deps = entry.remaining_deps.saturating_sub(1);
            if entry.remaining_deps == 0 && entry.state == TaskState::Pending {
                debug!(
                    task = %dependent,
                    run_id = self.run_id,
                    "dependencies satisfied; ready"
                );
                self.ready.push_back(dependent.clone());
            }
        }
    }

    /// Every task in this run that transitively depends on `failed_task`.
    ///
    /// These tasks can never be released (their in-degree never reaches zero)
    /// so this is purely informational; states are left untouched.
    pub fn blocked_dependents(&self, failed_task: &str) -> Vec<TaskName> {
        let mut stack: Vec<&TaskName> = self.graph.dependents_of(failed_task).iter().collect();
        let mut seen: HashSet<&TaskName> = HashSet::new();
        let mut blocked = Vec::new();

        while let Some(name) = stack.pop() {
            if !self.tasks.contains_key(name) || !seen.insert(name) {
                continue;
            }
            blocked.push(name.clone());
            stack.extend(self.graph.dependents_of(name).iter());
        }

        blocked.sort();
        blocked
    }

    /// Pop ready tasks while fewer than `limit` tasks are running, mark them
    /// `Running` and return them as `ScheduledTask`s.
    pub fn take_dispatchable(&mut self, running: &mut usize, limit: usize) -> Vec<ScheduledTask> {
        let mut dispatched = Vec::new();

        while *running < limit {
            let Some(name) = self.ready.pop_front() else {
                break;
            };
            let Some(entry) = self.tasks.get_mut(&name) else {
                continue;
            };
            let Some(work) = self.graph.work_of(&name) else {
                continue;
            };

            info!(task = %name, run_id = self.run_id, "dispatching task");
            entry.state = TaskState::Running;
            *running += 1;
            dispatched.push(ScheduledTask {
                name,
                work: work.clone(),
                run_id: self.run_id,
            });
        }

        dispatched
    }
}
