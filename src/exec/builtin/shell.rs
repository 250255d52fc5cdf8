// src/exec/builtin/shell.rs

//! External command runner: the bridge to every real compiler, minifier,
//! image optimiser or uploader.

use std::collections::{BTreeMap, VecDeque};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::exec::ready::ReadyCondition;
use crate::exec::transform::{Transform, WorkError, WorkFuture, WorkRequest};

/// Number of stderr lines kept for the failure descriptor.
const STDERR_TAIL_LINES: usize = 20;

/// How long stderr may stay open after the shell itself exited.
const PIPE_DRAIN_TIMEOUT: Duration = Duration::from_millis(200);

/// Runs `options.cmd` through the platform shell in the project root.
///
/// The request is exported to the command's environment:
///
/// | variable                     | value                              |
/// |------------------------------|------------------------------------|
/// | `PIPEDAG_TASK`               | task name                          |
/// | `PIPEDAG_INPUTS`             | input patterns, space separated    |
/// | `PIPEDAG_OUTPUT_DIR`         | absolute output directory          |
/// | `PIPEDAG_COMPRESSION_LEVEL`  | compression level                  |
/// | `PIPEDAG_CACHE_BUSTING`      | `true` / `false`                   |
/// | `PIPEDAG_BROWSERS`           | browser targets, comma separated   |
/// | `PIPEDAG_MANIFEST`           | absolute manifest path             |
///
/// plus everything in `options.env`. A non-zero exit is a failure whose
/// descriptor carries the exit code and the tail of stderr.
///
/// With `ready_on_stdout` or `ready_after` set the command is long-lived:
/// the task succeeds once it is ready and the process is left running. Exiting
/// before that is judged by the exit code as usual.
#[derive(Debug, Clone, Copy, Default)]
pub struct Shell;

impl Transform for Shell {
    fn run(&self, request: WorkRequest) -> WorkFuture {
        Box::pin(run_command(request))
    }
}

/// Environment handed to the command for `request`.
pub fn command_env(request: &WorkRequest) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    env.insert("PIPEDAG_TASK".to_string(), request.task.clone());
    env.insert("PIPEDAG_INPUTS".to_string(), request.inputs.join(" "));
    if let Ok(out) = request.output_path() {
        env.insert(
            "PIPEDAG_OUTPUT_DIR".to_string(),
            out.to_string_lossy().into_owned(),
        );
    }
    if let Some(level) = request.options.compression_level {
        env.insert("PIPEDAG_COMPRESSION_LEVEL".to_string(), level.to_string());
    }
    env.insert(
        "PIPEDAG_CACHE_BUSTING".to_string(),
        request.options.cache_busting().to_string(),
    );
    if !request.options.browsers().is_empty() {
        env.insert(
            "PIPEDAG_BROWSERS".to_string(),
            request.options.browsers().join(","),
        );
    }
    if request.options.manifest.is_some() {
        if let Ok(manifest) = request.manifest_path() {
            env.insert(
                "PIPEDAG_MANIFEST".to_string(),
                manifest.to_string_lossy().into_owned(),
            );
        }
    }
    env.extend(
        request
            .options
            .env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone())),
    );
    env
}

async fn run_command(request: WorkRequest) -> Result<(), WorkError> {
    let cmd_line = request.options.cmd.clone().ok_or_else(|| {
        WorkError::new(format!("task '{}' uses the shell transform without `cmd`", request.task))
    })?;
    let ready = ReadyCondition::from_options(&request.options).map_err(WorkError::new)?;

    info!(
        task = %request.task,
        run_id = request.run_id,
        cmd = %cmd_line,
        long_lived = ready.is_some(),
        "starting task process"
    );

    // Build a shell command appropriate for the platform.
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(&cmd_line);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(&cmd_line);
        c
    };

    cmd.current_dir(&request.root)
        .envs(command_env(&request))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning process for task '{}'", request.task))?;

    // Forward stdout to the log; a long-lived task also watches it for its
    // ready line.
    let (ready_tx, ready_rx) = oneshot::channel::<()>();
    if let Some(stdout) = child.stdout.take() {
        let task_name = request.task.clone();
        let condition = ready.clone();
        tokio::spawn(async move {
            let mut ready_tx = Some(ready_tx);
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(task = %task_name, "{}", line);
                if condition.as_ref().is_some_and(|c| c.matches_line(&line)) {
                    if let Some(tx) = ready_tx.take() {
                        debug!(task = %task_name, "stdout matched ready_on_stdout");
                        let _ = tx.send(());
                    }
                }
            }
        });
    }

    // Always consume stderr so buffers don't fill; keep the tail for errors.
    let tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
    let stderr_reader = child.stderr.take().map(|stderr| {
        let task_name = request.task.clone();
        let tail = Arc::clone(&tail);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(task = %task_name, "stderr: {}", line);
                let mut tail = tail.lock().unwrap_or_else(PoisonError::into_inner);
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        })
    });

    let exit = match &ready {
        Some(condition) => tokio::select! {
            status = child.wait() => Some(status),
            () = become_ready(condition.after, ready_rx) => None,
        },
        None => Some(child.wait().await),
    };

    let Some(status) = exit else {
        info!(
            task = %request.task,
            run_id = request.run_id,
            "long-lived task ready; process keeps running"
        );
        keep_running(child, request.task.clone());
        return Ok(());
    };
    let status =
        status.with_context(|| format!("waiting for process of task '{}'", request.task))?;

    // A backgrounded grandchild may hold stderr open long after the shell
    // exited.
    if let Some(reader) = stderr_reader {
        let abort = reader.abort_handle();
        if timeout(PIPE_DRAIN_TIMEOUT, reader).await.is_err() {
            debug!(task = %request.task, "stderr still open after exit; not waiting for it");
            abort.abort();
        }
    }
    let tail: Vec<String> = tail
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .drain(..)
        .collect();

    let code = status.code().unwrap_or(-1);
    info!(
        task = %request.task,
        run_id = request.run_id,
        exit_code = code,
        success = status.success(),
        "task process exited"
    );

    if status.success() {
        return Ok(());
    }

    let mut message = format!("command `{cmd_line}` exited with code {code}");
    if !tail.is_empty() {
        message.push_str(": ");
        message.push_str(&tail.join("\n"));
    }
    Err(WorkError::new(message))
}

/// Resolves once the readiness condition fires. A stdout monitor that ended
/// without a match never resolves.
async fn become_ready(after: Option<Duration>, on_stdout: oneshot::Receiver<()>) {
    let stdout_ready = async {
        if on_stdout.await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    match after {
        Some(delay) => tokio::select! {
            () = sleep(delay) => {}
            () = stdout_ready => {}
        },
        None => stdout_ready.await,
    }
}

/// Keep a ready long-lived process alive; it is killed when the runtime
/// shuts down.
fn keep_running(mut child: Child, task: String) {
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => info!(
                task = %task,
                exit_code = status.code().unwrap_or(-1),
                "long-lived process exited"
            ),
            Err(e) => warn!(task = %task, error = %e, "failed to wait for long-lived process"),
        }
    });
}
