// src/engine/orchestrator.rs

//! Entry point owning the validated graph and the transform registry.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::ConfigFile;
use crate::dag::{Scheduler, TaskGraph, TaskTable, Work};
use crate::engine::{CoreRun, RunEvent, RunOptions, RunReport, Runtime};
use crate::errors::{PipedagError, Result};
use crate::exec::{ExecutorBackend, TransformExecutor, TransformRegistry};

/// Capacity of the per-run completion channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Runs targets of a fixed task table.
///
/// Construction validates everything that can be checked statically
/// (dependencies, cycles, transform names), so a failure inside
/// [`Orchestrator::run`] is always a task failure or a cancellation.
#[derive(Debug)]
pub struct Orchestrator {
    graph: Arc<TaskGraph>,
    transforms: Arc<TransformRegistry>,
    root: PathBuf,
    options: RunOptions,
    run_counter: AtomicU64,
}

impl Orchestrator {
    pub fn new(
        tasks: &TaskTable,
        transforms: TransformRegistry,
        root: impl Into<PathBuf>,
        options: RunOptions,
    ) -> Result<Self> {
        let graph = TaskGraph::build(tasks)?;

        for name in graph.tasks() {
            if let Some(Work::Transform(work)) = graph.work_of(name) {
                if !transforms.contains(&work.transform) {
                    return Err(PipedagError::UnknownTransform {
                        task: name.to_string(),
                        transform: work.transform.clone(),
                    });
                }
            }
        }

        Ok(Self {
            graph: Arc::new(graph),
            transforms: Arc::new(transforms),
            root: root.into(),
            options,
            run_counter: AtomicU64::new(0),
        })
    }

    /// Build from a validated config; `[config]` supplies the run options.
    pub fn from_config(cfg: &ConfigFile, transforms: TransformRegistry) -> Result<Self> {
        let options = RunOptions {
            max_concurrency: cfg.config.max_concurrency,
            failure_policy: cfg.config.failure_policy,
        };
        Self::new(&cfg.to_task_table(), transforms, cfg.root(), options)
    }

    /// Override the run options (e.g. from CLI flags).
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn options(&self) -> RunOptions {
        self.options
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run `target` and every task it transitively depends on.
    ///
    /// Returns the aggregated report for completed runs, whatever their
    /// status; `Err` only for an unknown target or a broken runtime.
    pub async fn run(&self, target: &str, cancel: CancellationToken) -> Result<RunReport> {
        let (tx, rx) = mpsc::channel::<RunEvent>(EVENT_CHANNEL_CAPACITY);
        let executor = TransformExecutor::new(Arc::clone(&self.transforms), self.root.clone(), tx);
        self.run_with(target, executor, rx, cancel).await
    }

    /// Run `target` with a caller-provided executor backend.
    ///
    /// `events` must receive the backend's `TaskCompleted` events.
    pub async fn run_with<E: ExecutorBackend>(
        &self,
        target: &str,
        executor: E,
        events: mpsc::Receiver<RunEvent>,
        cancel: CancellationToken,
    ) -> Result<RunReport> {
        let run_id = self.run_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let scheduler = Scheduler::new(Arc::clone(&self.graph), target, run_id, &self.options)?;
        info!(run_target = %target, run_id, "starting run");

        let core = CoreRun::new(scheduler);
        Runtime::new(core, events, executor, cancel).run().await
    }
}
