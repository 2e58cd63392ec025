// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `cronguard`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "cronguard",
    version,
    about = "Run a cron task at most once at a time, log the run and mail failures.",
    long_about = None
)]
pub struct CliArgs {
    /// Task name, or the script text with `--script`.
    #[arg(value_name = "TASK")]
    pub task: String,

    /// Path to the config file (TOML).
    ///
    /// Default: `$CRONGUARD_CONFIG`, else `Cronguard.toml` in the current
    /// working directory if it exists.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Treat TASK as a shell snippet instead of a configured task name.
    #[arg(long)]
    pub script: bool,

    /// Log captured stdout/stderr with the run record.
    #[arg(long)]
    pub debug: bool,

    /// Write the run log here instead of `[config].log_file`.
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CRONGUARD_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Load config and print what would run, without taking the lock.
    #[arg(long)]
    pub dry_run: bool,
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
