// src/watch/hook.rs

//! Watch-triggered re-runs.
//!
//! [`HookCore`] is the pure debounce state machine:
//!
//! ```text
//! Idle --change--> Running --run finished--> Idle
//!                  Running --change--> Running (+1 queued re-run, at most)
//!                  Running --run finished, queued--> Running
//! ```
//!
//! [`WatchHook`] is the async shell that feeds it change events and run
//! completions and executes the [`HookCommand`]s it returns.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::{Orchestrator, RunReport, RunStatus, TaskName, TriggerQueue};
use crate::errors::Result;
use crate::watch::patterns::WatchProfile;
use crate::watch::reload::ReloadNotifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookState {
    Idle,
    Running,
}

/// What the shell should do in response to an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookCommand {
    /// Start a fresh run of this task.
    StartRun(TaskName),
    /// Tell the live-reload collaborator that this path changed.
    Reload(String),
}

#[derive(Debug)]
pub struct HookCore {
    profile: WatchProfile,
    state: HookState,
    queue: TriggerQueue,
}

impl HookCore {
    pub fn new(profile: WatchProfile) -> Self {
        Self {
            profile,
            state: HookState::Idle,
            queue: TriggerQueue::new(),
        }
    }

    pub fn profile(&self) -> &WatchProfile {
        &self.profile
    }

    pub fn state(&self) -> HookState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == HookState::Running
    }

    /// Whether a re-run is waiting for the current run to finish.
    pub fn has_queued_run(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Start `task` outside the change flow (the profile's initial run).
    /// While a run is active it is queued like any other trigger.
    pub fn begin_run(&mut self, task: &str) -> Vec<HookCommand> {
        match self.state {
            HookState::Idle => {
                self.state = HookState::Running;
                vec![HookCommand::StartRun(task.to_string())]
            }
            HookState::Running => {
                self.queue.record_trigger(task);
                Vec::new()
            }
        }
    }

    /// React to a changed path (relative to the project root).
    pub fn on_change(&mut self, rel_path: &str) -> Vec<HookCommand> {
        let class = self.profile.classify(rel_path);
        let mut commands = Vec::new();

        if class.reload {
            commands.push(HookCommand::Reload(rel_path.to_string()));
        }
        if !class.trigger {
            if class.is_ignored() {
                debug!(path = %rel_path, "change outside watch patterns");
            }
            return commands;
        }

        match self.state {
            HookState::Idle => {
                info!(path = %rel_path, run_target = %self.profile.target(), "change detected; starting run");
                self.state = HookState::Running;
                commands.push(HookCommand::StartRun(self.profile.target().to_string()));
            }
            HookState::Running => {
                let created = self.queue.record_trigger(self.profile.target());
                debug!(path = %rel_path, created, "run in progress; re-run queued");
            }
        }
        commands
    }

    /// React to the active run finishing (whatever its status).
    pub fn on_run_finished(&mut self) -> Vec<HookCommand> {
        if self.state == HookState::Idle {
            warn!("run finished while hook idle; ignoring");
            return Vec::new();
        }

        let queued = self.queue.drain_pending();
        if queued.is_empty() {
            self.state = HookState::Idle;
            return Vec::new();
        }

        info!(?queued, "starting queued re-run");
        queued.into_iter().map(HookCommand::StartRun).collect()
    }

    /// Forget any queued re-run (used on shutdown).
    pub fn drop_queued(&mut self) {
        let dropped = self.queue.drain_pending();
        if !dropped.is_empty() {
            debug!(?dropped, "dropping queued re-run");
        }
    }
}

enum HookEvent {
    Cancelled,
    Changed(String),
    ChangesClosed,
    RunFinished(Option<Result<RunReport>>),
}

/// Async driver for [`HookCore`].
pub struct WatchHook<N: ReloadNotifier> {
    core: HookCore,
    orchestrator: Arc<Orchestrator>,
    notifier: N,
    cancel: CancellationToken,
    initial_run: Option<TaskName>,
}

impl<N: ReloadNotifier> std::fmt::Debug for WatchHook<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHook")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<N: ReloadNotifier> WatchHook<N> {
    pub fn new(
        profile: WatchProfile,
        orchestrator: Arc<Orchestrator>,
        notifier: N,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            core: HookCore::new(profile),
            orchestrator,
            notifier,
            cancel,
            initial_run: None,
        }
    }

    /// Run `task` as soon as the hook starts. Changes arriving meanwhile
    /// queue the usual single re-run; if the run fails the hook stops.
    pub fn with_initial_run(mut self, task: Option<TaskName>) -> Self {
        self.initial_run = task;
        self
    }

    /// Consume change events until `changes` closes, the token is cancelled
    /// or the initial run fails, then let the active run (and any queued
    /// re-run, unless stopping) finish.
    ///
    /// Returns the reports of every run the hook started, in order.
    pub async fn run(mut self, mut changes: mpsc::Receiver<String>) -> Result<Vec<RunReport>> {
        let (done_tx, mut done_rx) = mpsc::channel::<Result<RunReport>>(1);
        let mut reports = Vec::new();
        let mut changes_open = true;
        let mut stopping = false;
        let mut initial_pending = false;

        info!(profile = %self.core.profile().name(), "watch hook started");

        if let Some(task) = self.initial_run.take() {
            info!(task = %task, "starting initial run");
            let commands = self.core.begin_run(&task);
            self.execute(commands, &done_tx);
            initial_pending = true;
        }

        loop {
            if !self.core.is_running() && (!changes_open || stopping) {
                break;
            }

            // Changes are preferred so that events arriving during a run are
            // queued before its completion is processed.
            let event = tokio::select! {
                biased;

                _ = self.cancel.cancelled(), if !stopping => HookEvent::Cancelled,
                change = changes.recv(), if changes_open && !stopping => match change {
                    Some(path) => HookEvent::Changed(path),
                    None => HookEvent::ChangesClosed,
                },
                done = done_rx.recv(), if self.core.is_running() => HookEvent::RunFinished(done),
            };

            match event {
                HookEvent::Cancelled => {
                    stopping = true;
                    self.core.drop_queued();
                }
                HookEvent::Changed(path) => {
                    let commands = self.core.on_change(&path);
                    self.execute(commands, &done_tx);
                }
                HookEvent::ChangesClosed => {
                    debug!("change channel closed");
                    changes_open = false;
                }
                HookEvent::RunFinished(done) => {
                    let was_initial = std::mem::take(&mut initial_pending);
                    match done {
                        Some(Ok(report)) => {
                            info!(run_id = report.run_id, status = ?report.status, "watch-triggered run finished");
                            if !report.is_success() {
                                warn!(run_id = report.run_id, failures = ?report.failures(), "watch-triggered run did not succeed");
                            }
                            if was_initial && report.status == RunStatus::Failed {
                                warn!(run_id = report.run_id, "initial run failed; stopping watch");
                                stopping = true;
                            }
                            reports.push(report);
                        }
                        Some(Err(err)) if was_initial => return Err(err),
                        Some(Err(err)) => warn!(error = %err, "watch-triggered run could not complete"),
                        None => warn!("run completion channel closed"),
                    }
                    if stopping {
                        self.core.drop_queued();
                    }
                    let commands = self.core.on_run_finished();
                    self.execute(commands, &done_tx);
                }
            }
        }

        info!(runs = reports.len(), "watch hook stopped");
        Ok(reports)
    }

    fn execute(&self, commands: Vec<HookCommand>, done_tx: &mpsc::Sender<Result<RunReport>>) {
        for command in commands {
            match command {
                HookCommand::Reload(path) => self.notifier.reload(&path),
                HookCommand::StartRun(target) => {
                    let orchestrator = Arc::clone(&self.orchestrator);
                    let cancel = self.cancel.clone();
                    let done_tx = done_tx.clone();
                    tokio::spawn(async move {
                        let result = orchestrator.run(&target, cancel).await;
                        let _ = done_tx.send(result).await;
                    });
                }
            }
        }
    }
}
