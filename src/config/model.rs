// src/config/model.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::dag::{TaskDef, TaskTable, TransformRef};
use crate::exec::TransformOptions;
use crate::types::FailurePolicy;

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [config]
/// max_concurrency = 4
/// failure_policy = "halt"
///
/// [default]
/// output_dir = "dist"
/// browsers = ["last 2 versions"]
///
/// [task.clean]
/// transform = "clean"
/// inputs = ["dist"]
///
/// [task.compileStyles]
/// after = ["clean"]
/// cmd = "sass src/scss:dist/css"
///
/// [task.build-develop]
/// group = ["compileStyles", "compileScripts"]
///
/// [watch."develop:watch"]
/// run = "develop"
/// target = "build-develop"
/// patterns = ["src/**"]
/// reload = ["src/**/*.html"]
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    /// Global behaviour config from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// Defaults applied to every transform task from `[default]`.
    #[serde(default)]
    pub default: DefaultSection,

    /// All tasks from `[task.<name>]`, keyed by task name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,

    /// Watch profiles from `[watch.<name>]`.
    #[serde(default)]
    pub watch: BTreeMap<String, WatchConfig>,
}

impl RawConfigFile {
    /// Task table for the graph builder, with `[default]` merged in.
    pub fn to_task_table(&self) -> TaskTable {
        build_task_table(&self.default, &self.task)
    }
}

/// Validated configuration.
///
/// Only constructed through `TryFrom<RawConfigFile>` (see `validate.rs`), so
/// holding one means the task graph is known to be well-formed.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub default: DefaultSection,
    pub task: BTreeMap<String, TaskConfig>,
    pub watch: BTreeMap<String, WatchConfig>,
    /// Directory that task paths are relative to.
    pub root: PathBuf,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            config: raw.config,
            default: raw.default,
            task: raw.task,
            watch: raw.watch,
            root: PathBuf::from("."),
        }
    }

    /// Same configuration with paths resolved against `root`.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn to_task_table(&self) -> TaskTable {
        build_task_table(&self.default, &self.task)
    }

    pub fn watch_profile(&self, name: &str) -> Option<&WatchConfig> {
        self.watch.get(name)
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigSection {
    /// Maximum number of tasks running at once. Unbounded when omitted.
    #[serde(default)]
    pub max_concurrency: Option<usize>,

    /// `"halt"` (default) or `"continue"`.
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

/// `[default]` section.
///
/// Every transform option may appear here; task-level values win.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DefaultSection {
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    #[serde(flatten)]
    pub options: TransformOptions,
}

/// `[task.<name>]` section.
///
/// A task either names a transform (`transform = "copy"`, or the `cmd`
/// shorthand for `shell`) or is a `group` of other tasks run concurrently.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskConfig {
    /// Dependency list: this task waits for all tasks listed here.
    #[serde(default)]
    pub after: Vec<String>,

    #[serde(default)]
    pub transform: Option<String>,

    /// Members of a group task.
    #[serde(default)]
    pub group: Option<Vec<String>>,

    #[serde(default)]
    pub inputs: Vec<String>,

    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Shown by `pipedag help`.
    #[serde(default)]
    pub description: Option<String>,

    #[serde(flatten)]
    pub options: TransformOptions,
}

impl TaskConfig {
    /// Transform to invoke: explicit `transform`, else `shell` when `cmd` is
    /// set.
    pub fn effective_transform(&self) -> Option<&str> {
        match (&self.transform, &self.options.cmd) {
            (Some(name), _) => Some(name.as_str()),
            (None, Some(_)) => Some("shell"),
            (None, None) => None,
        }
    }

    pub fn is_group(&self) -> bool {
        self.group.is_some()
    }
}

/// `[watch.<name>]` section: a watch profile selectable from the CLI.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WatchConfig {
    /// Task run once before watching starts (e.g. serve + initial build).
    #[serde(default)]
    pub run: Option<String>,

    /// Task re-run on every qualifying change.
    pub target: String,

    /// Paths (relative to the root) whose changes trigger a re-run.
    #[serde(default)]
    pub patterns: Vec<String>,

    #[serde(default)]
    pub exclude: Vec<String>,

    /// Narrower set of paths that also trigger a live-reload notification.
    #[serde(default)]
    pub reload: Vec<String>,
}

fn build_task_table(defaults: &DefaultSection, tasks: &BTreeMap<String, TaskConfig>) -> TaskTable {
    tasks
        .iter()
        .map(|(name, task)| {
            let def = match &task.group {
                Some(members) => TaskDef::group(task.after.clone(), members.clone()),
                None => TaskDef::transform(
                    task.after.clone(),
                    TransformRef {
                        transform: task.effective_transform().unwrap_or_default().to_string(),
                        inputs: task.inputs.clone(),
                        output_dir: task
                            .output_dir
                            .clone()
                            .or_else(|| defaults.output_dir.clone()),
                        options: task.options.merged_over(&defaults.options),
                    },
                ),
            };
            (name.clone(), def)
        })
        .collect()
}
