// src/dag/mod.rs

//! Task graph representation and scheduling.
//!
//! - [`graph`] validates a task table and holds the immutable DAG.
//! - [`scheduler`] contains the per-run state machine that decides
//!   which tasks are ready to run, and when dependents can be released.
//! - [`task_info`] provides task definitions and scheduled task types.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`state_manager`] manages per-run in-degree bookkeeping.

pub mod graph;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub mod task_info;

pub use graph::TaskGraph;
pub use scheduler::Scheduler;
pub use scheduler_step::SchedulerStep;
pub use task_info::{ScheduledTask, TaskDef, TaskState, TaskTable, TransformRef, Work};
