// src/watch/mod.rs

//! File watching and watch-triggered re-runs.
//!
//! This module is responsible for:
//! - Compiling a watch profile's trigger / exclude / reload glob patterns.
//! - Wiring up a cross-platform filesystem watcher (`notify`).
//! - Debouncing changes into re-runs of the profile's target (at most one
//!   queued re-run while a run is active) and forwarding reload
//!   notifications.
//!
//! It does **not** know how runs are scheduled; it asks the
//! [`Orchestrator`](crate::engine::Orchestrator) for a fresh run.

pub mod hook;
pub mod patterns;
pub mod reload;
pub mod watcher;

pub use hook::{HookCommand, HookCore, HookState, WatchHook};
pub use patterns::{profile_from_config, ChangeClass, WatchProfile};
pub use reload::{LogReloadNotifier, ReloadNotifier};
pub use watcher::{spawn_watcher, WatcherHandle};
