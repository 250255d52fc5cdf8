// src/errors.rs

//! Crate-wide error types.

use thiserror::Error;

use crate::engine::TaskName;

#[derive(Error, Debug)]
pub enum PipedagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: TaskName, dependency: TaskName },

    #[error("cycle detected in task graph: {}", members.join(" -> "))]
    CyclicDependency { members: Vec<TaskName> },

    #[error("Task not found: {0}")]
    UnknownTask(TaskName),

    #[error("task '{task}' references unknown transform '{transform}'")]
    UnknownTransform { task: TaskName, transform: String },

    #[error("run failed: {}", format_failures(failures))]
    TransformFailure { failures: Vec<(TaskName, String)> },

    #[error("run cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn format_failures(failures: &[(TaskName, String)]) -> String {
    failures
        .iter()
        .map(|(task, err)| format!("{task}: {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, PipedagError>;
