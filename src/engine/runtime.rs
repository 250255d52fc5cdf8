use std::fmt;
use std::time::Instant;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::dag::ScheduledTask;
use crate::errors::{PipedagError, Result};
use crate::exec::ExecutorBackend;

use super::core::CoreRun;
use super::report::RunReport;
use super::{CoreCommand, RunEvent};

/// Drives one run's scheduler in response to `RunEvent`s, and delegates
/// actual work to an `ExecutorBackend`.
///
/// This is a pure IO shell around `CoreRun`, which contains all the
/// scheduling semantics. This struct handles async IO: reading events from
/// channels, watching the cancellation token and dispatching tasks to the
/// executor.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRun,
    event_rx: mpsc::Receiver<RunEvent>,
    executor: E,
    cancel: CancellationToken,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(
        core: CoreRun,
        event_rx: mpsc::Receiver<RunEvent>,
        executor: E,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            core,
            event_rx,
            executor,
            cancel,
        }
    }

    /// Main event loop.
    ///
    /// - Dispatches the initial ready set.
    /// - Consumes `RunEvent`s from `event_rx` (and the cancellation token).
    /// - Feeds them into the core and executes the commands it returns.
    /// - Returns the aggregated report once nothing is left in flight.
    pub async fn run(mut self) -> Result<RunReport> {
        let started = Instant::now();
        let run_id = self.core.scheduler().run_id();
        info!(run_id, "run started");

        // A token cancelled before the run began means nothing is dispatched.
        let mut cancel_seen = self.cancel.is_cancelled();
        if cancel_seen {
            self.core.step(RunEvent::CancelRequested);
        }

        let step = self.core.start();
        for command in step.commands {
            self.execute_command(command).await?;
        }
        let mut keep_running = step.keep_running;

        while keep_running {
            let event = tokio::select! {
                biased;

                _ = self.cancel.cancelled(), if !cancel_seen => {
                    cancel_seen = true;
                    RunEvent::CancelRequested
                }
                event = self.event_rx.recv() => match event {
                    Some(e) => e,
                    None => {
                        return Err(PipedagError::Other(anyhow!(
                            "completion channel closed with {} task(s) in flight",
                            self.core.scheduler().running_count()
                        )));
                    }
                },
            };

            debug!(?event, "runtime received event");

            let step = self.core.step(event);
            for command in step.commands {
                self.execute_command(command).await?;
            }
            keep_running = step.keep_running;
        }

        let report = self.core.into_report(started.elapsed());
        info!(run_id, status = ?report.status, "run finished");
        Ok(report)
    }

    /// Execute a single command from the core.
    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::DispatchTasks(tasks) => self.spawn_ready(tasks).await,
        }
    }

    async fn spawn_ready(&mut self, tasks: Vec<ScheduledTask>) -> Result<()> {
        if tasks.is_empty() {
            return Ok(());
        }

        let names: Vec<_> = tasks.iter().map(|t| t.name.as_str()).collect();
        debug!(?names, "spawning ready tasks");

        self.executor.spawn_ready_tasks(tasks).await
    }
}
