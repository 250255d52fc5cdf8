// src/exec/transform.rs

//! The work descriptor contract every external collaborator implements.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::dag::TransformRef;
use crate::engine::TaskName;

/// Error descriptor reported by a transform. Kept verbatim in run reports.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct WorkError(String);

impl WorkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl From<anyhow::Error> for WorkError {
    fn from(err: anyhow::Error) -> Self {
        Self(format!("{err:#}"))
    }
}

impl From<std::io::Error> for WorkError {
    fn from(err: std::io::Error) -> Self {
        Self(err.to_string())
    }
}

/// Options recognised by collaborators.
///
/// Every field is optional so task-level values can be layered over the
/// `[default]` section with [`TransformOptions::merged_over`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TransformOptions {
    /// Compression / minification level handed to the collaborator.
    #[serde(default)]
    pub compression_level: Option<u32>,
    /// Whether output filenames get a content hash (default `true`).
    #[serde(default)]
    pub cache_busting: Option<bool>,
    /// Browser-compatibility targets (e.g. `"last 2 versions"`).
    #[serde(default)]
    pub browsers: Option<Vec<String>>,
    /// Location of the path-rewrite manifest, relative to the project root.
    #[serde(default)]
    pub manifest: Option<PathBuf>,
    /// Command line for the `shell` transform.
    #[serde(default)]
    pub cmd: Option<String>,
    /// Replacement extension for copied files (without the dot).
    #[serde(default)]
    pub extension: Option<String>,
    /// Extra environment variables for the `shell` transform.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Regex on stdout marking a long-lived `shell` task as ready.
    #[serde(default)]
    pub ready_on_stdout: Option<String>,
    /// Delay (`"500ms"`, `"3s"`, ...) after which a long-lived `shell` task
    /// counts as ready.
    #[serde(default)]
    pub ready_after: Option<String>,
}

impl TransformOptions {
    /// Fill every unset field of `self` from `defaults`.
    pub fn merged_over(&self, defaults: &TransformOptions) -> TransformOptions {
        let mut env = defaults.env.clone();
        env.extend(self.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        TransformOptions {
            compression_level: self.compression_level.or(defaults.compression_level),
            cache_busting: self.cache_busting.or(defaults.cache_busting),
            browsers: self.browsers.clone().or_else(|| defaults.browsers.clone()),
            manifest: self.manifest.clone().or_else(|| defaults.manifest.clone()),
            cmd: self.cmd.clone().or_else(|| defaults.cmd.clone()),
            extension: self.extension.clone().or_else(|| defaults.extension.clone()),
            env,
            ready_on_stdout: self
                .ready_on_stdout
                .clone()
                .or_else(|| defaults.ready_on_stdout.clone()),
            ready_after: self.ready_after.clone().or_else(|| defaults.ready_after.clone()),
        }
    }

    pub fn cache_busting(&self) -> bool {
        self.cache_busting.unwrap_or(true)
    }

    pub fn browsers(&self) -> &[String] {
        self.browsers.as_deref().unwrap_or(&[])
    }
}

/// Everything a transform needs for one invocation.
#[derive(Debug, Clone)]
pub struct WorkRequest {
    pub task: TaskName,
    pub run_id: u64,
    /// Project root; inputs and output paths are relative to it.
    pub root: PathBuf,
    pub inputs: Vec<String>,
    pub output_dir: Option<PathBuf>,
    pub options: TransformOptions,
}

impl WorkRequest {
    pub fn new(task: TaskName, run_id: u64, root: &Path, work: &TransformRef) -> Self {
        Self {
            task,
            run_id,
            root: root.to_path_buf(),
            inputs: work.inputs.clone(),
            output_dir: work.output_dir.clone(),
            options: work.options.clone(),
        }
    }

    /// Absolute output directory, or an error if the task did not declare one.
    pub fn output_path(&self) -> Result<PathBuf, WorkError> {
        self.output_dir
            .as_ref()
            .map(|dir| self.resolve(dir))
            .ok_or_else(|| WorkError::new(format!("task '{}' has no output_dir", self.task)))
    }

    /// Resolve a project-relative path against the root.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        self.root.join(path)
    }

    /// Manifest location: the configured path, or
    /// `<output_dir>/rev-manifest.json`.
    pub fn manifest_path(&self) -> Result<PathBuf, WorkError> {
        match &self.options.manifest {
            Some(path) => Ok(self.resolve(path)),
            None => Ok(self.output_path()?.join(DEFAULT_MANIFEST_NAME)),
        }
    }
}

/// Manifest filename used when no `manifest` option is given.
pub const DEFAULT_MANIFEST_NAME: &str = "rev-manifest.json";

pub type WorkFuture = Pin<Box<dyn Future<Output = Result<(), WorkError>> + Send>>;

/// A unit of external work: compile, minify, compress, hash, upload...
///
/// Implementations must be safe to invoke concurrently with other transforms
/// operating on disjoint paths, and must always return an outcome.
pub trait Transform: Send + Sync {
    fn run(&self, request: WorkRequest) -> WorkFuture;
}

/// Named transforms available to tasks.
#[derive(Clone, Default)]
pub struct TransformRegistry {
    transforms: HashMap<String, Arc<dyn Transform>>,
}

impl fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformRegistry")
            .field("names", &self.names())
            .finish()
    }
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a transform under `name`.
    pub fn register(&mut self, name: impl Into<String>, transform: impl Transform + 'static) {
        self.transforms.insert(name.into(), Arc::new(transform));
    }

    pub fn with(mut self, name: impl Into<String>, transform: impl Transform + 'static) -> Self {
        self.register(name, transform);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Transform>> {
        self.transforms.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.transforms.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.transforms.keys().map(|s| s.as_str()).collect();
        names.sort();
        names
    }
}
