// src/watch/reload.rs

use tracing::info;

/// Live-reload collaborator notified when a changed path matches a profile's
/// `reload` patterns.
///
/// Called from the watch hook's event loop, so implementations should hand
/// the notification off rather than block.
pub trait ReloadNotifier: Send + Sync {
    fn reload(&self, changed: &str);
}

/// Notifier that only logs; used when no live-reload server is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReloadNotifier;

impl ReloadNotifier for LogReloadNotifier {
    fn reload(&self, changed: &str) {
        info!(path = %changed, "live reload");
    }
}
