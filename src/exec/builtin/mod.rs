// src/exec/builtin/mod.rs

//! Transforms shipped with pipedag.
//!
//! None of these know anything about file formats; they move, delete, hash
//! and rewrite files, or hand the work to an external command:
//!
//! - [`clean`]: delete output paths.
//! - [`copy`]: copy matching inputs into an output directory.
//! - [`shell`]: run an external command with inputs/options in its env.
//! - [`revision`]: content-hash filenames and write the manifest, then
//!   rewrite references using that manifest.

pub mod clean;
pub mod copy;
pub mod revision;
pub mod shell;

use std::sync::Arc;

use crate::exec::transform::{TransformRegistry, WorkError, WorkFuture};
use crate::fs::FileSystem;

pub use clean::Clean;
pub use copy::CopyFiles;
pub use revision::{RevReplace, Revision};
pub use shell::Shell;

impl TransformRegistry {
    /// Registry pre-populated with the built-in transforms.
    pub fn with_builtins(fs: Arc<dyn FileSystem>) -> Self {
        TransformRegistry::new()
            .with("clean", Clean::new(Arc::clone(&fs)))
            .with("copy", CopyFiles::new(Arc::clone(&fs)))
            .with("revision", Revision::new(Arc::clone(&fs)))
            .with("rev-replace", RevReplace::new(fs))
            .with("shell", Shell)
    }
}

/// Run synchronous filesystem work off the async executor threads.
pub(crate) fn blocking<F>(work: F) -> WorkFuture
where
    F: FnOnce() -> anyhow::Result<()> + Send + 'static,
{
    Box::pin(async move {
        tokio::task::spawn_blocking(work)
            .await
            .map_err(|e| WorkError::new(format!("blocking work did not complete: {e}")))?
            .map_err(WorkError::from)
    })
}
