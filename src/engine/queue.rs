use std::collections::BTreeSet;

use tracing::debug;

use super::TaskName;

/// Queue of re-run triggers that arrive while a run is already executing.
///
/// Semantics:
/// - At most one future run is ever queued. Every trigger recorded while a
///   run is active is merged into that single pending batch, so N change
///   events collapse into exactly one re-run.
/// - When the hook becomes idle it calls `drain_pending()` to obtain the
///   targets for the next run.
#[derive(Debug, Default)]
pub struct TriggerQueue {
    pending: Option<BTreeSet<TaskName>>,
}

impl TriggerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if there is no queued re-run.
    pub fn is_empty(&self) -> bool {
        self.pending.is_none()
    }

    /// Record that `task` should run again once the current run finishes.
    ///
    /// Returns `true` if this created the pending batch, `false` if it was
    /// merged into an existing one.
    pub fn record_trigger(&mut self, task: &str) -> bool {
        match self.pending.as_mut() {
            Some(batch) => {
                let inserted = batch.insert(task.to_string());
                debug!(task = %task, inserted, "merged trigger into queued re-run");
                false
            }
            None => {
                let mut batch = BTreeSet::new();
                batch.insert(task.to_string());
                self.pending = Some(batch);
                debug!(task = %task, "queued re-run");
                true
            }
        }
    }

    /// Take the queued batch (if any), leaving the queue empty.
    pub fn drain_pending(&mut self) -> Vec<TaskName> {
        let tasks: Vec<TaskName> = self
            .pending
            .take()
            .map(|batch| batch.into_iter().collect())
            .unwrap_or_default();
        if !tasks.is_empty() {
            debug!(drained = tasks.len(), "drained queued re-run");
        }
        tasks
    }
}
