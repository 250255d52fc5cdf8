// src/engine/core.rs

//! Pure core run state machine.
//!
//! This module contains a synchronous, deterministic "core" that consumes
//! [`RunEvent`]s and produces:
//! - an updated scheduler/recorder state
//! - a list of commands describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading completion events from channels
//! - sending `ScheduledTask`s to the executor
//! - turning a cancellation token into a `CancelRequested` event
//!
//! The core is intended to be unit tested without any Tokio, channels,
//! filesystem, or processes.

use std::time::Duration;

use crate::dag::Scheduler;
use crate::engine::event_handlers::{
    handle_cancel, handle_run_start, handle_task_completion, CoreStep,
};
use crate::engine::report::{RunRecorder, RunReport};
use crate::engine::RunEvent;

/// Pure core state for one run.
///
/// This owns:
/// - the per-run scheduler
/// - the outcome recorder
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRun {
    scheduler: Scheduler,
    recorder: RunRecorder,
}

impl CoreRun {
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            scheduler,
            recorder: RunRecorder::new(),
        }
    }

    /// Read-only access to the scheduler (for tests and diagnostics).
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn is_finished(&self) -> bool {
        self.scheduler.is_finished()
    }

    /// Dispatch the initial ready set.
    pub fn start(&mut self) -> CoreStep {
        handle_run_start(&mut self.scheduler)
    }

    /// Handle a single event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RunEvent) -> CoreStep {
        match event {
            RunEvent::TaskCompleted {
                task,
                outcome,
                elapsed,
            } => handle_task_completion(
                &mut self.scheduler,
                &mut self.recorder,
                task,
                outcome,
                elapsed,
            ),
            RunEvent::CancelRequested => handle_cancel(&mut self.scheduler, &mut self.recorder),
        }
    }

    /// Consume the core and produce the aggregated report.
    pub fn into_report(self, elapsed: Duration) -> RunReport {
        self.recorder.finish(&self.scheduler, elapsed)
    }
}
