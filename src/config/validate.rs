// src/config/validate.rs

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;

use crate::config::duration::parse_duration;
use crate::config::model::{
    BootstrapSection, ConfigFile, DispatcherSection, RawBootstrapSection, RawConfigFile,
    RawPollerSection,
};
use crate::errors::{ClustertrackError, Result};
use crate::poll::poller::PollerSettings;

/// RFC 1123 labels joined by dots.
const HOSTNAME_PATTERN: &str =
    r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*$";
const MAX_HOSTNAME_LEN: usize = 253;
const SECRET_NAME_PATTERN: &str = r"^[A-Za-z0-9_]+$";

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ClustertrackError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let poller = validate_poller(&raw.poller)?;
        let dispatcher = validate_dispatcher(raw.dispatcher)?;
        let bootstrap = raw.bootstrap.map(validate_bootstrap).transpose()?;
        Ok(ConfigFile::new_unchecked(poller, dispatcher, bootstrap))
    }
}

fn validate_poller(raw: &RawPollerSection) -> Result<PollerSettings> {
    let settings = PollerSettings {
        scan_interval: nonzero_duration("poller.scan_interval", &raw.scan_interval)?,
        watchdog: nonzero_duration("poller.watchdog", &raw.watchdog)?,
        launch_timeout: nonzero_duration("poller.launch_timeout", &raw.launch_timeout)?,
        max_parallel_reads: raw.max_parallel_reads,
    };

    if settings.max_parallel_reads == 0 {
        return Err(ClustertrackError::ConfigError(
            "[poller].max_parallel_reads must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(settings)
}

fn validate_dispatcher(raw: DispatcherSection) -> Result<DispatcherSection> {
    if raw.queue_capacity == 0 {
        return Err(ClustertrackError::ConfigError(
            "[dispatcher].queue_capacity must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(raw)
}

fn validate_bootstrap(raw: RawBootstrapSection) -> Result<BootstrapSection> {
    if raw.cmd.trim().is_empty() {
        return Err(ClustertrackError::ConfigError(
            "[bootstrap].cmd must not be empty".to_string(),
        ));
    }
    if raw.bootdir.trim().is_empty() {
        return Err(ClustertrackError::ConfigError(
            "[bootstrap].bootdir must not be empty".to_string(),
        ));
    }
    validate_hosts(&raw.hosts)?;

    let mut secrets = BTreeMap::new();
    for (name, path) in raw.secrets {
        validate_secret_name(&name)?;
        if path.trim().is_empty() {
            return Err(ClustertrackError::ConfigError(format!(
                "secret '{name}' has an empty path"
            )));
        }
        secrets.insert(name, PathBuf::from(path));
    }

    Ok(BootstrapSection {
        cmd: raw.cmd,
        bootdir: PathBuf::from(raw.bootdir),
        hosts: raw.hosts,
        secrets,
    })
}

/// Check a host list: non-empty, unique, DNS-style names.
pub fn validate_hosts(hosts: &[String]) -> Result<()> {
    if hosts.is_empty() {
        return Err(ClustertrackError::ConfigError(
            "at least one host is required".to_string(),
        ));
    }

    let hostname = Regex::new(HOSTNAME_PATTERN)
        .map_err(|e| ClustertrackError::ConfigError(format!("invalid hostname pattern: {e}")))?;
    let mut seen = HashSet::new();
    for host in hosts {
        if host.len() > MAX_HOSTNAME_LEN || !hostname.is_match(host) {
            return Err(ClustertrackError::ConfigError(format!(
                "'{host}' is not a valid hostname"
            )));
        }
        if !seen.insert(host.to_lowercase()) {
            return Err(ClustertrackError::ConfigError(format!(
                "host '{host}' is listed more than once"
            )));
        }
    }
    Ok(())
}

/// Secret names become file names and environment variable suffixes.
pub fn validate_secret_name(name: &str) -> Result<()> {
    let secret_name = Regex::new(SECRET_NAME_PATTERN)
        .map_err(|e| ClustertrackError::ConfigError(format!("invalid secret name pattern: {e}")))?;
    if !secret_name.is_match(name) {
        return Err(ClustertrackError::ConfigError(format!(
            "secret name '{name}' may only contain letters, digits and '_'"
        )));
    }
    Ok(())
}

/// Run ids name a directory under the bootdir.
pub fn validate_run_id(run_id: &str) -> Result<()> {
    if run_id.is_empty() || run_id == "." || run_id == ".." || run_id.contains(['/', '\\']) {
        return Err(ClustertrackError::ConfigError(format!(
            "run id '{run_id}' cannot be used as a directory name"
        )));
    }
    Ok(())
}

fn nonzero_duration(field: &str, value: &str) -> Result<Duration> {
    let duration = parse_duration(value)
        .map_err(|e| ClustertrackError::ConfigError(format!("[{field}]: {e}")))?;
    if duration.is_zero() {
        return Err(ClustertrackError::ConfigError(format!(
            "[{field}] must be greater than zero"
        )));
    }
    Ok(duration)
}
