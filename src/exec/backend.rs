// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of invoking transforms
//! directly. This makes it easy to swap in a fake executor in tests while
//! keeping the production executor implementation here.
//!
//! - `TransformExecutor` is the default implementation used by pipedag. It
//!   spawns one Tokio task per scheduled task, invokes the registered
//!   transform and reports `TaskCompleted` back to the runtime.
//! - Tests can provide their own `ExecutorBackend` that, for example, records
//!   which tasks were scheduled and directly emits `TaskCompleted` events.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::dag::{ScheduledTask, Work};
use crate::engine::{RunEvent, TaskOutcome};
use crate::errors::Result;
use crate::exec::transform::{TransformRegistry, WorkError, WorkRequest};

/// Trait abstracting how scheduled tasks are executed.
///
/// Production code uses [`TransformExecutor`]; tests can provide their own
/// implementation that doesn't touch the filesystem.
pub trait ExecutorBackend: Send {
    /// Dispatch the given tasks for execution.
    ///
    /// Must not wait for the tasks to finish: completion is reported
    /// asynchronously through `RunEvent::TaskCompleted`.
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Real executor backend: runs each task's transform on the Tokio runtime.
pub struct TransformExecutor {
    transforms: Arc<TransformRegistry>,
    root: PathBuf,
    runtime_tx: mpsc::Sender<RunEvent>,
}

impl TransformExecutor {
    pub fn new(
        transforms: Arc<TransformRegistry>,
        root: impl Into<PathBuf>,
        runtime_tx: mpsc::Sender<RunEvent>,
    ) -> Self {
        Self {
            transforms,
            root: root.into(),
            runtime_tx,
        }
    }
}

impl ExecutorBackend for TransformExecutor {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            for task in tasks {
                let transforms = Arc::clone(&self.transforms);
                let root = self.root.clone();
                let tx = self.runtime_tx.clone();

                tokio::spawn(async move {
                    let name = task.name.clone();
                    let run_id = task.run_id;
                    let started = Instant::now();

                    // Run the work in its own task so a panicking transform is
                    // observed as a JoinError instead of a lost completion.
                    let handle = tokio::spawn(run_work(task, transforms, root));
                    let outcome = match handle.await {
                        Ok(Ok(())) => TaskOutcome::Success,
                        Ok(Err(err)) => TaskOutcome::Failed(err),
                        Err(join_err) => {
                            error!(task = %name, run_id, error = %join_err, "transform panicked");
                            TaskOutcome::Failed(WorkError::new(format!(
                                "transform panicked: {join_err}"
                            )))
                        }
                    };

                    let event = RunEvent::TaskCompleted {
                        task: name.clone(),
                        outcome,
                        elapsed: started.elapsed(),
                    };
                    if tx.send(event).await.is_err() {
                        warn!(task = %name, run_id, "runtime gone; dropping completion");
                    }
                });
            }
            Ok(())
        })
    }
}

/// Execute the work attached to a scheduled task.
async fn run_work(
    task: ScheduledTask,
    transforms: Arc<TransformRegistry>,
    root: PathBuf,
) -> std::result::Result<(), WorkError> {
    match &task.work {
        Work::Group(members) => {
            debug!(task = %task.name, ?members, "group complete; all members succeeded");
            Ok(())
        }
        Work::Transform(work) => {
            let transform = transforms.get(&work.transform).ok_or_else(|| {
                WorkError::new(format!("unknown transform '{}'", work.transform))
            })?;
            debug!(
                task = %task.name,
                run_id = task.run_id,
                transform = %work.transform,
                "invoking transform"
            );
            let request = WorkRequest::new(task.name.clone(), task.run_id, &root, work);
            transform.run(request).await
        }
    }
}
