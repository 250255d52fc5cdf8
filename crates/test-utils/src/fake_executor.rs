use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Semaphore};
use pipedag::dag::ScheduledTask;
use pipedag::engine::{RunEvent, TaskOutcome};
use pipedag::errors::Result;
use pipedag::exec::{ExecutorBackend, Transform, WorkError, WorkFuture, WorkRequest};

/// One task execution as observed by a fake.
#[derive(Debug, Clone)]
pub struct Execution {
    pub task: String,
    pub started: Instant,
    pub finished: Instant,
}

impl Execution {
    /// Whether the two executions were in flight at the same time.
    pub fn overlaps(&self, other: &Execution) -> bool {
        self.started < other.finished && other.started < self.finished
    }
}

/// Shared record of what ran, when, and how many at once.
#[derive(Debug, Clone, Default)]
pub struct ExecutionLog {
    started: Arc<Mutex<Vec<String>>>,
    finished: Arc<Mutex<Vec<Execution>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn begin(&self, task: &str) -> Instant {
        self.started.lock().unwrap().push(task.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Instant::now()
    }

    fn end(&self, task: &str, started: Instant) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.finished.lock().unwrap().push(Execution {
            task: task.to_string(),
            started,
            finished: Instant::now(),
        });
    }

    /// Task names in start order.
    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    /// Finished executions in completion order.
    pub fn finished(&self) -> Vec<Execution> {
        self.finished.lock().unwrap().clone()
    }

    pub fn execution(&self, task: &str) -> Option<Execution> {
        self.finished().into_iter().find(|e| e.task == task)
    }

    pub fn count(&self, task: &str) -> usize {
        self.started().iter().filter(|t| t.as_str() == task).count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// A fake executor that:
/// - records which tasks were "run" and when
/// - reports `TaskCompleted` after an optional per-task delay, failing the
///   tasks it was told to fail.
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RunEvent>,
    log: ExecutionLog,
    failures: HashMap<String, String>,
    delays: HashMap<String, Duration>,
    default_delay: Duration,
}

impl FakeExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RunEvent>, log: ExecutionLog) -> Self {
        Self {
            runtime_tx,
            log,
            failures: HashMap::new(),
            delays: HashMap::new(),
            default_delay: Duration::ZERO,
        }
    }

    pub fn failing(mut self, task: &str, message: &str) -> Self {
        self.failures.insert(task.to_string(), message.to_string());
        self
    }

    pub fn delay(mut self, task: &str, delay: Duration) -> Self {
        self.delays.insert(task.to_string(), delay);
        self
    }

    pub fn default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            for t in tasks {
                let tx = self.runtime_tx.clone();
                let log = self.log.clone();
                let delay = self.delays.get(&t.name).copied().unwrap_or(self.default_delay);
                let failure = self.failures.get(&t.name).cloned();

                tokio::spawn(async move {
                    let started = log.begin(&t.name);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    log.end(&t.name, started);

                    let outcome = match failure {
                        Some(message) => TaskOutcome::Failed(WorkError::new(message)),
                        None => TaskOutcome::Success,
                    };
                    let _ = tx
                        .send(RunEvent::TaskCompleted {
                            task: t.name.clone(),
                            outcome,
                            elapsed: started.elapsed(),
                        })
                        .await;
                });
            }
            Ok(())
        })
    }
}

/// Transform that records every invocation, optionally sleeping and failing.
#[derive(Clone, Default)]
pub struct RecordingTransform {
    log: ExecutionLog,
    requests: Arc<Mutex<Vec<WorkRequest>>>,
    failing: Arc<HashSet<String>>,
    delay: Duration,
}

impl RecordingTransform {
    pub fn new(log: ExecutionLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    /// Fail these tasks with `"<task> failed"`.
    pub fn failing(mut self, tasks: &[&str]) -> Self {
        self.failing = Arc::new(tasks.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn requests(&self) -> Vec<WorkRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Transform for RecordingTransform {
    fn run(&self, request: WorkRequest) -> WorkFuture {
        let this = self.clone();
        Box::pin(async move {
            let task = request.task.clone();
            this.requests.lock().unwrap().push(request);
            let started = this.log.begin(&task);
            if !this.delay.is_zero() {
                tokio::time::sleep(this.delay).await;
            }
            this.log.end(&task, started);

            if this.failing.contains(&task) {
                Err(WorkError::new(format!("{task} failed")))
            } else {
                Ok(())
            }
        })
    }
}

/// Transform that blocks until the test opens the gate, one permit per
/// invocation. Each start is announced on the `started` channel.
#[derive(Clone)]
pub struct GatedTransform {
    gate: Arc<Semaphore>,
    started_tx: mpsc::UnboundedSender<String>,
}

impl GatedTransform {
    pub fn new() -> (Self, GateControl) {
        let gate = Arc::new(Semaphore::new(0));
        let (started_tx, started_rx) = mpsc::unbounded_channel();
        (
            Self {
                gate: Arc::clone(&gate),
                started_tx,
            },
            GateControl { gate, started_rx },
        )
    }
}

impl Transform for GatedTransform {
    fn run(&self, request: WorkRequest) -> WorkFuture {
        let gate = Arc::clone(&self.gate);
        let _ = self.started_tx.send(request.task.clone());
        Box::pin(async move {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| WorkError::new(e.to_string()))?;
            permit.forget();
            Ok::<(), WorkError>(())
        })
    }
}

/// Test-side handle of a [`GatedTransform`].
pub struct GateControl {
    gate: Arc<Semaphore>,
    started_rx: mpsc::UnboundedReceiver<String>,
}

impl GateControl {
    /// Wait until the next invocation has started; returns its task name.
    pub async fn wait_started(&mut self) -> String {
        self.started_rx.recv().await.expect("gated transform dropped")
    }

    /// Let one blocked (or future) invocation complete.
    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    /// Invocations started but not yet observed through `wait_started`.
    pub fn pending_starts(&mut self) -> usize {
        let mut n = 0;
        while self.started_rx.try_recv().is_ok() {
            n += 1;
        }
        n
    }
}

/// Transform that panics; the executor must still report a completion.
#[derive(Clone, Copy, Default)]
pub struct PanickingTransform;

impl Transform for PanickingTransform {
    fn run(&self, request: WorkRequest) -> WorkFuture {
        Box::pin(explode(request.task))
    }
}

async fn explode(task: String) -> std::result::Result<(), WorkError> {
    panic!("transform for {task} blew up")
}
