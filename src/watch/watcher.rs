// src/watch/watcher.rs

use std::path::{Path, PathBuf};

use anyhow::Result;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Handle for the filesystem watcher.
///
/// This exists mainly so the underlying `RecommendedWatcher` is kept alive for
/// as long as needed. Dropping this handle will stop file watching and close
/// the change channel.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

/// Spawn a filesystem watcher that observes `root` recursively and forwards
/// every changed path, relative to `root` with forward slashes, on
/// `changes_tx`.
///
/// Access-only events are dropped; everything else (create, modify, remove,
/// rename) is forwarded. Matching against watch profiles happens downstream.
pub fn spawn_watcher(
    root: impl Into<PathBuf>,
    changes_tx: mpsc::Sender<String>,
) -> Result<WatcherHandle> {
    let root = root.into();
    // Canonicalize once so we have a stable base path.
    let root = root.canonicalize().unwrap_or(root);

    // Channel from the blocking notify callback into the async world.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if event_tx.send(event).is_err() {
                    debug!("watch forwarder gone; dropping notify event");
                }
            }
            Err(err) => warn!(error = %err, "file watch error"),
        },
        Config::default(),
    )?;

    watcher.watch(&root, RecursiveMode::Recursive)?;
    info!("file watcher started on {:?}", root);

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if event.kind.is_access() {
                continue;
            }
            debug!(?event, "received notify event");

            for path in event.paths {
                let Some(rel) = relative_str(&root, &path) else {
                    debug!(?path, "changed path outside watch root; ignoring");
                    continue;
                };
                if changes_tx.send(rel).await.is_err() {
                    debug!("change receiver dropped; stopping watcher loop");
                    return;
                }
            }
        }
        debug!("watcher event loop finished");
    });

    Ok(WatcherHandle { _inner: watcher })
}

/// `path` relative to `root` with forward slashes.
///
/// Falls back to comparing canonical paths, since some platforms report
/// events under a different absolute prefix (symlinked temp dirs on macOS).
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    let slash = |p: &Path| p.to_string_lossy().replace('\\', "/");

    if let Ok(rel) = path.strip_prefix(root) {
        return Some(slash(rel));
    }
    let root_canon = root.canonicalize().ok()?;
    // Removed files cannot be canonicalized; try their parent instead.
    let path_canon = path.canonicalize().ok().or_else(|| {
        let parent = path.parent()?.canonicalize().ok()?;
        Some(parent.join(path.file_name()?))
    })?;
    path_canon.strip_prefix(&root_canon).ok().map(slash)
}
