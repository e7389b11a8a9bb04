// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `crondag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "crondag",
    version,
    about = "Run shell tasks on cron timers and success/failure dependency chains.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the settings file (TOML).
    ///
    /// Default: `Crondag.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Crondag.toml")]
    pub config: String,

    /// Start with admissions paused; queued and timed runs wait until
    /// unpaused.
    #[arg(long)]
    pub paused: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CRONDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse settings + collections, print tasks and their dependencies,
    /// but don't execute any commands.
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
