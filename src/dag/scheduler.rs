use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::dag::graph::TaskGraph;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::{RunTask, StateManager};
use crate::dag::task_info::ScheduledTask;
use crate::dag::task_info::TaskState;
use crate::engine::{RunOptions, TaskName};
use crate::errors::Result;
use crate::types::FailurePolicy;

/// Scheduler holds the immutable graph plus the mutable state of one run.
///
/// It is responsible for:
/// - restricting the run to the closure of the target task
/// - tracking the remaining in-degree of every task in that closure
/// - releasing tasks whose dependencies all succeeded, up to the
///   concurrency bound
/// - stopping dispatch after a failure (per [`FailurePolicy`]) or a
///   cancellation request
#[derive(Debug)]
pub struct Scheduler {
    graph: Arc<TaskGraph>,
    target: TaskName,
    run_id: u64,
    tasks: HashMap<TaskName, RunTask>,
    ready: VecDeque<TaskName>,
    running: usize,
    limit: usize,
    policy: FailurePolicy,
    /// Set once no further task may be dispatched.
    halted: bool,
}

impl Scheduler {
    /// Prepare a run of `target` over a validated graph.
    ///
    /// Fails with `UnknownTask` if the target is not registered.
    pub fn new(
        graph: Arc<TaskGraph>,
        target: &str,
        run_id: u64,
        options: &RunOptions,
    ) -> Result<Self> {
        let closure = graph.closure(target)?;

        let mut tasks = HashMap::with_capacity(closure.len());
        let mut ready = VecDeque::new();
        StateManager::new(&graph, &mut tasks, &mut ready, run_id).seed(&closure);

        let limit = options.max_concurrency.map(|n| n.max(1)).unwrap_or(usize::MAX);

        debug!(
            run_target = %target,
            run_id,
            tasks = closure.len(),
            max_concurrency = ?options.max_concurrency,
            "scheduler: prepared run"
        );

        Ok(Self {
            graph,
            target: target.to_string(),
            run_id,
            tasks,
            ready,
            running: 0,
            limit,
            policy: options.failure_policy,
            halted: false,
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Number of tasks currently dispatched and not yet completed.
    pub fn running_count(&self) -> usize {
        self.running
    }

    /// Whether dispatch has been stopped by a failure or cancellation.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// State of a task in this run, or `None` if it is outside the closure.
    pub fn state_of(&self, task: &str) -> Option<TaskState> {
        self.tasks.get(task).map(|t| t.state)
    }

    /// Names of all tasks participating in this run, sorted.
    pub fn tasks_in_run(&self) -> Vec<TaskName> {
        let mut names: Vec<TaskName> = self.tasks.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether every dependency of `task` has succeeded in this run.
    ///
    /// Returns `None` if the task is not part of the run.
    pub fn deps_satisfied(&self, task: &str) -> Option<bool> {
        self.tasks.get(task)?;
        Some(self.graph.dependencies_of(task).iter().all(|dep| {
            matches!(self.state_of(dep), Some(TaskState::Succeeded))
        }))
    }

    /// The run is over once nothing is in flight and nothing more can be
    /// dispatched.
    pub fn is_finished(&self) -> bool {
        self.running == 0 && (self.halted || self.ready.is_empty())
    }

    /// Dispatch the initially ready tasks.
    pub fn start(&mut self) -> SchedulerStep {
        info!(run_target = %self.target, run_id = self.run_id, "scheduler: starting run");
        let newly_scheduled = self.dispatch();
        SchedulerStep {
            newly_scheduled,
            newly_blocked: Vec::new(),
            run_just_finished: self.is_finished(),
        }
    }

    /// Stop dispatching new work. In-flight tasks still report completion.
    pub fn halt(&mut self) -> SchedulerStep {
        if !self.halted {
            info!(
                run_id = self.run_id,
                in_flight = self.running,
                "scheduler: halting dispatch"
            );
        }
        self.halted = true;
        SchedulerStep {
            newly_scheduled: Vec::new(),
            newly_blocked: Vec::new(),
            run_just_finished: self.is_finished(),
        }
    }

    /// Handle completion of a dispatched task.
    pub fn step_completion(&mut self, task: &str, succeeded: bool) -> SchedulerStep {
        let mut newly_blocked = Vec::new();

        match self.state_of(task) {
            Some(TaskState::Running) => {
                self.running -= 1;
                if let Some(entry) = self.tasks.get_mut(task) {
                    entry.state = if succeeded {
                        TaskState::Succeeded
                    } else {
                        TaskState::Failed
                    };
                }

                let mut manager =
                    StateManager::new(&self.graph, &mut self.tasks, &mut self.ready, self.run_id);

                if succeeded {
                    debug!(task = %task, run_id = self.run_id, "task succeeded");
                    manager.release_dependents(task);
                } else {
                    newly_blocked = manager.blocked_dependents(task);
                    warn!(
                        task = %task,
                        run_id = self.run_id,
                        blocked = ?newly_blocked,
                        "task failed; dependents will not run"
                    );
                    if self.policy == FailurePolicy::Halt {
                        self.halted = true;
                    }
                }
            }
            Some(state) => {
                warn!(
                    task = %task,
                    ?state,
                    "completion for task that is not running; ignoring"
                );
            }
            None => {
                warn!(task = %task, "completion for task outside this run; ignoring");
            }
        }

        let newly_scheduled = self.dispatch();
        let run_just_finished = self.is_finished();
        if run_just_finished {
            info!(run_id = self.run_id, "scheduler: no work left in flight; run finished");
        }

        SchedulerStep {
            newly_scheduled,
            newly_blocked,
            run_just_finished,
        }
    }

    fn dispatch(&mut self) -> Vec<ScheduledTask> {
        if self.halted {
            return Vec::new();
        }
        let mut manager =
            StateManager::new(&self.graph, &mut self.tasks, &mut self.ready, self.run_id);
        manager.take_dispatchable(&mut self.running, self.limit)
    }
}
