// src/engine/mod.rs

//! Orchestration engine for pipedag.
//!
//! This module ties together:
//! - the per-run scheduler (`dag::Scheduler`)
//! - the result aggregator ([`report`])
//! - the runtime event loop that reacts to:
//!   - task completion events from the executor
//!   - cancellation requests from the caller
//! - the [`orchestrator`] entry point that owns the validated graph and the
//!   transform registry.
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`]. [`queue`] holds the debounce queue used by the
//! watch hook.

use std::time::Duration;

use crate::exec::WorkError;
use crate::types::FailurePolicy;

/// Canonical task name type used throughout the engine.
pub type TaskName = String;

/// Outcome of a task's work as seen by the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Success,
    Failed(WorkError),
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success)
    }
}

/// Options that shape a single run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Maximum number of simultaneously running tasks. `None` means bounded
    /// only by the ready set.
    pub max_concurrency: Option<usize>,
    pub failure_policy: FailurePolicy,
}

/// Events flowing into the runtime from executors and the caller.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// A dispatched task finished with a concrete outcome.
    TaskCompleted {
        task: TaskName,
        outcome: TaskOutcome,
        elapsed: Duration,
    },
    /// The caller asked for the run to stop dispatching new work.
    CancelRequested,
}

pub mod core;
pub mod event_handlers;
pub mod orchestrator;
pub mod queue;
pub mod report;
pub mod runtime;

pub use core::CoreRun;
pub use event_handlers::{CoreCommand, CoreStep};
pub use orchestrator::Orchestrator;
pub use queue::TriggerQueue;
pub use report::{RunRecorder, RunReport, RunStatus, TaskReport};
pub use runtime::Runtime;
