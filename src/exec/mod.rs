// src/exec/mod.rs

//! Work execution layer.
//!
//! This module is responsible for actually running the work attached to
//! scheduled tasks and reporting back to the orchestration runtime via
//! `RunEvent`s.
//!
//! - [`transform`] defines the work descriptor contract (`Transform`,
//!   `WorkRequest`, `WorkError`) and the name -> transform registry.
//! - [`builtin`] holds the transforms shipped with pipedag.
//! - [`ready`] decides when a long-lived command (dev server, file sync)
//!   counts as done while its process keeps running.
//! - [`backend`] provides the `ExecutorBackend` trait and the concrete
//!   `TransformExecutor` that the runtime uses in production, and which
//!   tests can replace with a fake implementation.

pub mod backend;
pub mod builtin;
pub mod ready;
pub mod transform;

pub use backend::{ExecutorBackend, TransformExecutor};
pub use transform::{
    Transform, TransformOptions, TransformRegistry, WorkError, WorkFuture, WorkRequest,
};
