// src/config/validate.rs

use globset::Glob;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::dag::TaskGraph;
use crate::exec::ready::ReadyCondition;
use crate::errors::{PipedagError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::PipedagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_global_config(cfg)?;
    validate_task_work(cfg)?;
    validate_watch_profiles(cfg)?;
    // Unknown `after` / group references and cycles.
    TaskGraph::build(&cfg.to_task_table())?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(PipedagError::ConfigError(
            "config must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.max_concurrency == Some(0) {
        return Err(PipedagError::ConfigError(
            "[config].max_concurrency must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_task_work(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        match (task.effective_transform(), &task.group) {
            (Some(_), Some(_)) => {
                return Err(PipedagError::ConfigError(format!(
                    "task '{name}' declares both a transform and a group"
                )));
            }
            (None, None) => {
                return Err(PipedagError::ConfigError(format!(
                    "task '{name}' needs one of `transform`, `cmd` or `group`"
                )));
            }
            (None, Some(members)) if members.is_empty() => {
                return Err(PipedagError::ConfigError(format!(
                    "group task '{name}' has no members"
                )));
            }
            _ => {}
        }

        let options = task.options.merged_over(&cfg.default.options);
        if let Err(e) = ReadyCondition::from_options(&options) {
            return Err(PipedagError::ConfigError(format!("task '{name}': {e}")));
        }
    }
    Ok(())
}

fn validate_watch_profiles(cfg: &RawConfigFile) -> Result<()> {
    for (name, profile) in cfg.watch.iter() {
        if cfg.task.contains_key(name) {
            return Err(PipedagError::ConfigError(format!(
                "watch profile '{name}' has the same name as a task"
            )));
        }
        for task in std::iter::once(&profile.target).chain(profile.run.iter()) {
            if !cfg.task.contains_key(task) {
                return Err(PipedagError::ConfigError(format!(
                    "watch profile '{name}' refers to unknown task '{task}'"
                )));
            }
        }
        if profile.patterns.is_empty() {
            return Err(PipedagError::ConfigError(format!(
                "watch profile '{name}' has no patterns"
            )));
        }
        for pattern in profile
            .patterns
            .iter()
            .chain(profile.exclude.iter())
            .chain(profile.reload.iter())
        {
            Glob::new(pattern).map_err(|e| {
                PipedagError::ConfigError(format!(
                    "watch profile '{name}' has invalid pattern '{pattern}': {e}"
                ))
            })?;
        }
    }
    Ok(())
}
