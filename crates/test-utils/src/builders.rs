#![allow(dead_code)]

use std::path::PathBuf;

use pipedag::config::{ConfigFile, RawConfigFile, TaskConfig, WatchConfig};
use pipedag::dag::{TaskDef, TaskTable, TransformRef};
use pipedag::errors::Result;
use pipedag::types::FailurePolicy;

/// Transform name used by [`TaskTableBuilder::task`].
pub const DEFAULT_TEST_TRANSFORM: &str = "record";

/// Builder for a `TaskTable` fed straight to `TaskGraph` / `Orchestrator`.
#[derive(Debug, Default)]
pub struct TaskTableBuilder {
    table: TaskTable,
}

impl TaskTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Task running [`DEFAULT_TEST_TRANSFORM`] after `deps`.
    pub fn task(self, name: &str, deps: &[&str]) -> Self {
        self.transform(name, deps, DEFAULT_TEST_TRANSFORM)
    }

    pub fn transform(mut self, name: &str, deps: &[&str], transform: &str) -> Self {
        self.table.insert(
            name.to_string(),
            TaskDef::transform(strings(deps), TransformRef::new(transform)),
        );
        self
    }

    pub fn with_ref(mut self, name: &str, deps: &[&str], work: TransformRef) -> Self {
        self.table
            .insert(name.to_string(), TaskDef::transform(strings(deps), work));
        self
    }

    pub fn group(mut self, name: &str, deps: &[&str], members: &[&str]) -> Self {
        self.table.insert(
            name.to_string(),
            TaskDef::group(strings(deps), strings(members)),
        );
        self
    }

    pub fn build(self) -> TaskTable {
        self.table
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
    root: Option<PathBuf>,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
            root: None,
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn with_watch(mut self, name: &str, watch: WatchConfig) -> Self {
        self.config.watch.insert(name.to_string(), watch);
        self
    }

    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.config.config.max_concurrency = Some(n);
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.config.failure_policy = policy;
        self
    }

    pub fn default_output_dir(mut self, dir: &str) -> Self {
        self.config.default.output_dir = Some(PathBuf::from(dir));
        self
    }

    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        let root = self.root;
        let cfg = ConfigFile::try_from(self.config)?;
        Ok(match root {
            Some(root) => cfg.with_root(root),
            None => cfg,
        })
    }

    pub fn build(self) -> ConfigFile {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    /// Task running `transform`.
    pub fn transform(name: &str) -> Self {
        Self {
            task: TaskConfig {
                transform: Some(name.to_string()),
                ..TaskConfig::default()
            },
        }
    }

    /// Shell task (`cmd = "..."`).
    pub fn cmd(cmd: &str) -> Self {
        let mut task = TaskConfig::default();
        task.options.cmd = Some(cmd.to_string());
        Self { task }
    }

    pub fn group(members: &[&str]) -> Self {
        Self {
            task: TaskConfig {
                group: Some(strings(members)),
                ..TaskConfig::default()
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn input(mut self, pattern: &str) -> Self {
        self.task.inputs.push(pattern.to_string());
        self
    }

    pub fn output_dir(mut self, dir: &str) -> Self {
        self.task.output_dir = Some(PathBuf::from(dir));
        self
    }

    pub fn description(mut self, text: &str) -> Self {
        self.task.description = Some(text.to_string());
        self
    }

    pub fn cache_busting(mut self, on: bool) -> Self {
        self.task.options.cache_busting = Some(on);
        self
    }

    pub fn manifest(mut self, path: &str) -> Self {
        self.task.options.manifest = Some(PathBuf::from(path));
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.task.options.env.insert(key.to_string(), value.to_string());
        self
    }

    /// Make a `cmd` task long-lived, ready once stdout matches `pattern`.
    pub fn ready_on_stdout(mut self, pattern: &str) -> Self {
        self.task.options.ready_on_stdout = Some(pattern.to_string());
        self
    }

    /// Make a `cmd` task long-lived, ready after `delay` (e.g. `"200ms"`).
    pub fn ready_after(mut self, delay: &str) -> Self {
        self.task.options.ready_after = Some(delay.to_string());
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}

/// Builder for `WatchConfig`.
pub struct WatchConfigBuilder {
    watch: WatchConfig,
}

impl WatchConfigBuilder {
    pub fn new(target: &str) -> Self {
        Self {
            watch: WatchConfig {
                target: target.to_string(),
                ..WatchConfig::default()
            },
        }
    }

    pub fn run_first(mut self, task: &str) -> Self {
        self.watch.run = Some(task.to_string());
        self
    }

    pub fn pattern(mut self, pattern: &str) -> Self {
        self.watch.patterns.push(pattern.to_string());
        self
    }

    pub fn exclude(mut self, pattern: &str) -> Self {
        self.watch.exclude.push(pattern.to_string());
        self
    }

    pub fn reload(mut self, pattern: &str) -> Self {
        self.watch.reload.push(pattern.to_string());
        self
    }

    pub fn build(self) -> WatchConfig {
        self.watch
    }
}
