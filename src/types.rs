// src/types.rs

use std::str::FromStr;

use serde::Deserialize;

/// What the scheduler does with undispatched work once a task has failed.
///
/// - `Halt` (default): the run is marked failed, in-flight tasks settle, and
///   nothing new is dispatched.
/// - `Continue`: tasks that do not transitively depend on a failed task keep
///   being dispatched. Dependents of the failed task never start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    #[default]
    Halt,
    Continue,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "halt" => Ok(FailurePolicy::Halt),
            "continue" => Ok(FailurePolicy::Continue),
            other => Err(format!(
                "invalid failure policy '{other}' (expected \"halt\" or \"continue\")"
            )),
        }
    }
}
