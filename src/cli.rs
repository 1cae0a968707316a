// src/cli.rs

//! CLI argument parsing using `clap`.

use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::config::loader::DEFAULT_CONFIG_FILE;
use crate::config::parse_duration;

/// Command-line arguments for `clustertrack`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "clustertrack",
    version,
    about = "Bootstrap cluster hosts and track the run until every host reports.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,

    /// Comma-separated hosts, overriding `[bootstrap].hosts`.
    #[arg(long, value_name = "HOSTS", value_delimiter = ',')]
    pub hosts: Vec<String>,

    /// Straggler wait for this run, overriding `[poller].watchdog` (e.g. "30s").
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub watchdog: Option<Duration>,

    /// Identifier of the run; also names its marker directory.
    ///
    /// Defaults to `run-<unix millis>`.
    #[arg(long, value_name = "ID")]
    pub run_id: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CLUSTERTRACK_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Validate the config and print the plan without launching anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
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
