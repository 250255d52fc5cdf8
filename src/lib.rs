// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod types;
pub mod watch;

use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::dag::{TaskGraph, Work};
use crate::engine::{Orchestrator, RunStatus};
use crate::exec::TransformRegistry;
use crate::fs::{FileSystem, RealFileSystem};
use crate::watch::{profile_from_config, spawn_watcher, LogReloadNotifier, WatchHook, WatchProfile};

/// Capacity of the watcher -> hook change channel.
const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the orchestrator with the built-in transforms
/// - (for watch profiles) the file watcher and the re-run hook
/// - Ctrl-C handling
///
/// A run that does not succeed is returned as an error so the process exits
/// non-zero.
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)?;

    let Some(target) = args.run_target() else {
        print!("{}", render_help(&cfg));
        return Ok(());
    };

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let mut orchestrator =
        Orchestrator::from_config(&cfg, TransformRegistry::with_builtins(fs))?;
    let mut options = orchestrator.options();
    if let Some(n) = args.max_concurrency {
        options.max_concurrency = Some(n as usize);
    }
    if let Some(policy) = args.failure_policy {
        options.failure_policy = policy;
    }
    orchestrator = orchestrator.with_options(options);

    let profile = profile_from_config(&cfg, target)?;

    if args.dry_run {
        let plan_target = profile.as_ref().map(|p| p.target()).unwrap_or(target);
        print!("{}", render_plan(orchestrator.graph(), plan_target)?);
        debug!("dry-run complete (no execution)");
        return Ok(());
    }

    // Ctrl-C → stop dispatching; in-flight tasks settle.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("Ctrl+C received; cancelling");
            cancel.cancel();
        });
    }

    match profile {
        Some(profile) => run_watch(&cfg, orchestrator, profile, cancel).await,
        None => {
            let report = orchestrator.run(target, cancel).await?;
            print!("{}", report.render());
            report.into_result()?;
            Ok(())
        }
    }
}

/// Run a watch profile: the optional initial task, then re-runs of the
/// profile's target on every qualifying change until cancelled.
///
/// The watcher starts before the initial run so that edits made while it
/// builds queue a re-run instead of being lost.
async fn run_watch(
    cfg: &ConfigFile,
    orchestrator: Orchestrator,
    profile: WatchProfile,
    cancel: CancellationToken,
) -> Result<()> {
    let orchestrator = Arc::new(orchestrator);
    let initial = profile.initial_run().map(str::to_string);

    let (changes_tx, changes_rx) = mpsc::channel::<String>(CHANGE_CHANNEL_CAPACITY);
    let _watcher = spawn_watcher(cfg.root(), changes_tx)?;
    info!(
        profile = %profile.name(),
        run_target = %profile.target(),
        "watching for changes (Ctrl+C to stop)"
    );

    let hook = WatchHook::new(profile, orchestrator, LogReloadNotifier, cancel)
        .with_initial_run(initial.clone());
    let reports = hook.run(changes_rx).await?;
    for report in &reports {
        print!("{}", report.render());
    }

    if initial.is_some() {
        if let Some(first) = reports.into_iter().next() {
            if first.status == RunStatus::Failed {
                first.into_result()?;
            }
        }
    }
    Ok(())
}

/// Task and watch profile listing printed for `pipedag help`.
pub fn render_help(cfg: &ConfigFile) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "usage: pipedag [OPTIONS] [TARGET]");
    let _ = writeln!(out);
    let _ = writeln!(out, "tasks ({}):", cfg.task.len());
    for (name, task) in cfg.task.iter() {
        let kind = match (&task.group, task.effective_transform()) {
            (Some(members), _) => format!("group [{}]", members.join(", ")),
            (None, Some(transform)) => transform.to_string(),
            (None, None) => "?".to_string(),
        };
        let _ = write!(out, "  {name:<24} {kind}");
        if let Some(description) = &task.description {
            let _ = write!(out, " - {description}");
        }
        let _ = writeln!(out);
        if !task.after.is_empty() {
            let _ = writeln!(out, "  {:<24} after: {}", "", task.after.join(", "));
        }
    }

    if !cfg.watch.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "watch profiles ({}):", cfg.watch.len());
        for (name, watch) in cfg.watch.iter() {
            let _ = write!(out, "  {name:<24} re-runs {}", watch.target);
            if let Some(initial) = &watch.run {
                let _ = write!(out, " (after running {initial})");
            }
            let _ = writeln!(out);
        }
    }
    out
}

/// Dry-run output: the waves `target` would run in.
pub fn render_plan(graph: &TaskGraph, target: &str) -> crate::errors::Result<String> {
    let waves = graph.waves(target)?;
    let mut out = String::new();
    let _ = writeln!(out, "pipedag dry-run: {target}");
    for (idx, wave) in waves.iter().enumerate() {
        let _ = writeln!(out, "  step {}:", idx + 1);
        for name in wave {
            let work = match graph.work_of(name) {
                Some(Work::Transform(work)) => work.transform.clone(),
                Some(Work::Group(_)) => "group".to_string(),
                None => "?".to_string(),
            };
            let _ = writeln!(out, "    - {name} ({work})");
        }
    }
    Ok(out)
}
