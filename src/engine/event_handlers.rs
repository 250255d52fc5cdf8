// src/engine/event_handlers.rs

//! Event handling logic for the core run state machine.

use std::time::Duration;

use tracing::{info, warn};

use crate::dag::{ScheduledTask, Scheduler, SchedulerStep};
use crate::engine::report::RunRecorder;
use crate::engine::{TaskName, TaskOutcome};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Send these tasks to the executor.
    DispatchTasks(Vec<ScheduledTask>),
}

/// Decision returned by the core after handling a single event.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep waiting for events.
    pub keep_running: bool,
}

impl CoreStep {
    fn from_scheduler_step(step: SchedulerStep) -> Self {
        let mut commands = Vec::new();
        if !step.newly_scheduled.is_empty() {
            commands.push(CoreCommand::DispatchTasks(step.newly_scheduled));
        }
        CoreStep {
            commands,
            keep_running: !step.run_just_finished,
        }
    }
}

/// Seed the run: dispatch every task that has no dependencies.
pub fn handle_run_start(scheduler: &mut Scheduler) -> CoreStep {
    CoreStep::from_scheduler_step(scheduler.start())
}

/// Handle a task completion event.
///
/// The outcome is recorded before the scheduler releases dependents, so the
/// report always reflects every observed completion.
pub fn handle_task_completion(
    scheduler: &mut Scheduler,
    recorder: &mut RunRecorder,
    task: TaskName,
    outcome: TaskOutcome,
    elapsed: Duration,
) -> CoreStep {
    let succeeded = outcome.is_success();

    match outcome {
        TaskOutcome::Success => {
            info!(task = %task, run_id = scheduler.run_id(), ?elapsed, "task succeeded");
            recorder.record_success(&task, elapsed);
        }
        TaskOutcome::Failed(error) => {
            warn!(
                task = %task,
                run_id = scheduler.run_id(),
                ?elapsed,
                error = %error,
                "task failed"
            );
            recorder.record_failure(&task, error, elapsed);
        }
    }

    CoreStep::from_scheduler_step(scheduler.step_completion(&task, succeeded))
}

/// Handle a cancellation request: stop dispatching, wait for in-flight work.
pub fn handle_cancel(scheduler: &mut Scheduler, recorder: &mut RunRecorder) -> CoreStep {
    if !recorder.is_cancelled() {
        info!(
            run_id = scheduler.run_id(),
            in_flight = scheduler.running_count(),
            "cancellation requested; waiting for in-flight tasks"
        );
    }
    recorder.mark_cancelled();
    CoreStep::from_scheduler_step(scheduler.halt())
}
