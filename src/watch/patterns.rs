// src/watch/patterns.rs

use std::fmt;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::config::model::{ConfigFile, WatchConfig};
use crate::engine::TaskName;

/// How a changed path relates to a watch profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChangeClass {
    /// The path matches the trigger patterns: re-run the target.
    pub trigger: bool,
    /// The path matches the reload patterns: notify the live-reload client.
    pub reload: bool,
}

impl ChangeClass {
    pub fn is_ignored(&self) -> bool {
        !self.trigger && !self.reload
    }
}

/// Compiled glob patterns for one `[watch.<name>]` profile.
///
/// Patterns are relative to the project root; the watcher passes relative
/// paths with forward slashes (e.g. `"src/scss/app.scss"`) into
/// [`WatchProfile::classify`]. `exclude` applies to both trigger and reload
/// matches.
#[derive(Clone)]
pub struct WatchProfile {
    name: String,
    run: Option<TaskName>,
    target: TaskName,
    trigger_set: GlobSet,
    exclude_set: Option<GlobSet>,
    reload_set: Option<GlobSet>,
}

impl fmt::Debug for WatchProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchProfile")
            .field("name", &self.name)
            .field("run", &self.run)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl WatchProfile {
    pub fn new(name: impl Into<String>, cfg: &WatchConfig) -> Result<Self> {
        let name = name.into();
        let trigger_set = build_globset(&cfg.patterns)
            .with_context(|| format!("building trigger globset for watch profile {name}"))?;
        let exclude_set = optional_globset(&cfg.exclude)
            .with_context(|| format!("building exclude globset for watch profile {name}"))?;
        let reload_set = optional_globset(&cfg.reload)
            .with_context(|| format!("building reload globset for watch profile {name}"))?;

        Ok(Self {
            name,
            run: cfg.run.clone(),
            target: cfg.target.clone(),
            trigger_set,
            exclude_set,
            reload_set,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Task run once before watching starts.
    pub fn initial_run(&self) -> Option<&str> {
        self.run.as_deref()
    }

    /// Task re-run on every qualifying change.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn classify(&self, rel_path: &str) -> ChangeClass {
        if let Some(exclude) = &self.exclude_set {
            if exclude.is_match(rel_path) {
                return ChangeClass::default();
            }
        }
        ChangeClass {
            trigger: self.trigger_set.is_match(rel_path),
            reload: self
                .reload_set
                .as_ref()
                .map(|set| set.is_match(rel_path))
                .unwrap_or(false),
        }
    }
}

/// Compile the profile named `name` from a loaded config.
pub fn profile_from_config(cfg: &ConfigFile, name: &str) -> Result<Option<WatchProfile>> {
    cfg.watch_profile(name)
        .map(|watch| WatchProfile::new(name, watch))
        .transpose()
}

fn optional_globset(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    build_globset(patterns).map(Some)
}

/// Build a GlobSet from simple string patterns.
fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}
