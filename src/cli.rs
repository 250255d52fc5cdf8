// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::types::FailurePolicy;

/// Command-line arguments for `pipedag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "pipedag",
    version,
    about = "Run dependency-ordered build tasks, optionally re-running them on file changes.",
    long_about = None
)]
pub struct CliArgs {
    /// Task or watch profile to run (e.g. `build-production`,
    /// `develop:watch`). `help` or nothing lists what is available.
    #[arg(value_name = "TARGET")]
    pub target: Option<String>,

    /// Path to the config file (TOML).
    ///
    /// Default: `Pipedag.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Pipedag.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PIPEDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Maximum number of tasks running at once; overrides
    /// `[config].max_concurrency`.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub max_concurrency: Option<u64>,

    /// `halt` or `continue`; overrides `[config].failure_policy`.
    #[arg(long, value_name = "POLICY")]
    pub failure_policy: Option<FailurePolicy>,

    /// Parse + validate, print the execution plan, but don't run anything.
    #[arg(long)]
    pub dry_run: bool,
}

impl CliArgs {
    /// Target to run, or `None` when the task listing was asked for.
    pub fn run_target(&self) -> Option<&str> {
        match self.target.as_deref() {
            None | Some("help") => None,
            Some(target) => Some(target),
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
