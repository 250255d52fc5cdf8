// src/dag/scheduler_step.rs

use crate::dag::task_info::ScheduledTask;
use crate::engine::TaskName;

/// What changed when the scheduler was started or fed one completion.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Tasks released to the executor, in dispatch order.
    pub newly_scheduled: Vec<ScheduledTask>,
    /// Pending tasks that can no longer run because something they
    /// transitively depend on just failed.
    pub newly_blocked: Vec<TaskName>,
    /// Nothing is in flight and nothing more will be dispatched.
    pub run_just_finished: bool,
}
