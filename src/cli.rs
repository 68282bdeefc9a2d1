// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `celldag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "celldag",
    version,
    about = "Run a reactive notebook: cells re-run when the names they read change.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the notebook file (TOML).
    ///
    /// Default: `notebook.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "notebook.toml")]
    pub notebook: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CELLDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse and analyse cells, print the dependency structure, but don't
    /// execute anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Print the final environment snapshot as JSON instead of a summary.
    #[arg(long)]
    pub json: bool,
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
