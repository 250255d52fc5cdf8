// src/config/mod.rs

//! Configuration loading and validation for pipedag.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate task work, watch profiles and graph correctness (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, parse_str};
pub use model::{
    ConfigFile, ConfigSection, DefaultSection, RawConfigFile, TaskConfig, WatchConfig,
};
