// src/exec/ready.rs

//! Readiness for long-lived commands.
//!
//! A dev server or a file-sync daemon never exits on its own. Such a task
//! declares when it counts as done:
//!
//! - `ready_on_stdout`: a regex matched against each stdout line.
//! - `ready_after`: a fixed delay after the process started.
//!
//! Whichever fires first completes the task; the process keeps running in
//! the background until pipedag exits.

use std::time::Duration;

use regex::Regex;

use crate::exec::transform::TransformOptions;

/// Parsed readiness condition of a long-lived task.
#[derive(Debug, Clone)]
pub struct ReadyCondition {
    pub on_stdout: Option<Regex>,
    pub after: Option<Duration>,
}

impl ReadyCondition {
    /// `Ok(None)` for an ordinary run-to-exit task.
    pub fn from_options(options: &TransformOptions) -> Result<Option<Self>, String> {
        let on_stdout = options
            .ready_on_stdout
            .as_deref()
            .map(|pattern| {
                Regex::new(pattern)
                    .map_err(|e| format!("invalid ready_on_stdout regex '{pattern}': {e}"))
            })
            .transpose()?;
        let after = options
            .ready_after
            .as_deref()
            .map(|s| parse_duration(s).map_err(|e| format!("invalid ready_after '{s}': {e}")))
            .transpose()?;

        if on_stdout.is_none() && after.is_none() {
            return Ok(None);
        }
        Ok(Some(Self { on_stdout, after }))
    }

    pub fn matches_line(&self, line: &str) -> bool {
        self.on_stdout.as_ref().is_some_and(|re| re.is_match(line))
    }
}

/// Parse a duration like `"250ms"`, `"3s"`, `"1m"` or `"2h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }

    let idx = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| "missing unit suffix (ms, s, m or h)".to_string())?;
    let (number, unit) = s.split_at(idx);
    let value: u64 = number
        .parse()
        .map_err(|e| format!("invalid number '{number}': {e}"))?;

    match unit.trim().to_ascii_lowercase().as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        other => Err(format!("unsupported unit '{other}' (expected ms, s, m or h)")),
    }
}
