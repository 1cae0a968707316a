// src/logging.rs

//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `CLUSTERTRACK_LOG` environment variable: a level ("debug") or a full
//!    filter directive ("clustertrack::poll=trace,info")
//! 3. default to `info`
//!
//! Logs go to STDERR; stdout carries the run report.

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

pub const LOG_ENV: &str = "CLUSTERTRACK_LOG";

/// Initialise the global logging subscriber. Call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let directive = resolve_directive(cli_level, std::env::var(LOG_ENV).ok().as_deref());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}

/// Filter directive from the CLI level, else the env value, else `info`.
fn resolve_directive(cli_level: Option<LogLevel>, env_value: Option<&str>) -> String {
    if let Some(lvl) = cli_level {
        return directive_for(lvl).to_string();
    }

    match env_value.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => match parse_level_str(s) {
            Some(level) => level.to_string(),
            None if EnvFilter::try_new(s).is_ok() => s.to_string(),
            None => "info".to_string(),
        },
        None => "info".to_string(),
    }
}

fn directive_for(lvl: LogLevel) -> &'static str {
    match lvl {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}

fn parse_level_str(s: &str) -> Option<&'static str> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some("error"),
        "warn" | "warning" => Some("warn"),
        "info" => Some("info"),
        "debug" => Some("debug"),
        "trace" => Some("trace"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_level_wins_over_env() {
        assert_eq!(resolve_directive(Some(LogLevel::Warn), Some("trace")), "warn");
    }

    #[test]
    fn env_accepts_levels_and_directives() {
        assert_eq!(resolve_directive(None, Some("Warning")), "warn");
        assert_eq!(
            resolve_directive(None, Some("clustertrack::poll=trace")),
            "clustertrack::poll=trace"
        );
        assert_eq!(resolve_directive(None, Some("  ")), "info");
        assert_eq!(resolve_directive(None, None), "info");
    }
}
