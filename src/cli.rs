// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::default_config_path;

/// Command-line arguments for `workerbridge`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "workerbridge",
    version,
    about = "Run an external worker process and report its result.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Bridge.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value_os_t = default_config_path())]
    pub config: PathBuf,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `WORKERBRIDGE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the configured workers, but don't run anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Print progress, error and result events as JSON lines while the
    /// worker runs, instead of only the final outcome.
    #[arg(long)]
    pub stream: bool,

    /// Input file handed to the worker. The file is copied into the scratch
    /// directory and the copy is deleted once the run ends.
    #[arg(long = "input", value_name = "PATH")]
    pub inputs: Vec<String>,

    /// Write a binary payload to this file instead of printing it.
    #[arg(long, value_name = "PATH")]
    pub output: Option<String>,

    /// Name of the `[worker.<name>]` section to run.
    #[arg(value_name = "WORKER", required_unless_present = "dry_run")]
    pub worker: Option<String>,

    /// Arguments appended after the worker's fixed arguments and inputs.
    #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
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
