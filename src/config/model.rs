// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::dispatch::DEFAULT_QUEUE_CAPACITY;
use crate::poll::poller::{PollerSettings, DEFAULT_MAX_PARALLEL_READS};

/// Configuration as read from `Clustertrack.toml`, before validation.
///
/// ```toml
/// [poller]
/// scan_interval = "1s"
/// watchdog = "15s"
/// launch_timeout = "5m"
/// max_parallel_reads = 20
///
/// [dispatcher]
/// queue_capacity = 64
///
/// [bootstrap]
/// cmd = "python3 bootstrap.py"
/// bootdir = "/var/run/clustertrack/bootstrap"
/// hosts = ["c6401.ambari.apache.org"]
///
/// [bootstrap.secrets]
/// ssh_key = "/root/.ssh/id_rsa"
/// ```
///
/// All sections are optional at this level; the CLI requires `[bootstrap]`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub poller: RawPollerSection,

    #[serde(default)]
    pub dispatcher: DispatcherSection,

    #[serde(default)]
    pub bootstrap: Option<RawBootstrapSection>,
}

/// `[poller]` section. Durations use the `"250ms" | "3s" | "1m" | "2h"` format.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPollerSection {
    #[serde(default = "default_scan_interval")]
    pub scan_interval: String,

    /// Straggler wait after the triggering process exits.
    #[serde(default = "default_watchdog")]
    pub watchdog: String,

    #[serde(default = "default_launch_timeout")]
    pub launch_timeout: String,

    #[serde(default = "default_max_parallel_reads")]
    pub max_parallel_reads: usize,
}

fn default_scan_interval() -> String {
    "1s".to_string()
}

fn default_watchdog() -> String {
    "15s".to_string()
}

fn default_launch_timeout() -> String {
    "5m".to_string()
}

fn default_max_parallel_reads() -> usize {
    DEFAULT_MAX_PARALLEL_READS
}

impl Default for RawPollerSection {
    fn default() -> Self {
        Self {
            scan_interval: default_scan_interval(),
            watchdog: default_watchdog(),
            launch_timeout: default_launch_timeout(),
            max_parallel_reads: default_max_parallel_reads(),
        }
    }
}

/// `[dispatcher]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DispatcherSection {
    /// Depth of each entity's mailbox.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

impl Default for DispatcherSection {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// `[bootstrap]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawBootstrapSection {
    /// Shell command that bootstraps the hosts and writes marker files.
    pub cmd: String,

    /// Parent of the per-run marker directories.
    pub bootdir: String,

    #[serde(default)]
    pub hosts: Vec<String>,

    /// Secret name -> file whose contents are staged for the command.
    #[serde(default)]
    pub secrets: BTreeMap<String, String>,
}

/// Validated configuration. Build it with `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub poller: PollerSettings,
    pub dispatcher: DispatcherSection,
    pub bootstrap: Option<BootstrapSection>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapSection {
    pub cmd: String,
    pub bootdir: PathBuf,
    pub hosts: Vec<String>,
    pub secrets: BTreeMap<String, PathBuf>,
}

impl ConfigFile {
    /// Assemble a config without validation; `validate.rs` is the gatekeeper.
    pub(crate) fn new_unchecked(
        poller: PollerSettings,
        dispatcher: DispatcherSection,
        bootstrap: Option<BootstrapSection>,
    ) -> Self {
        Self {
            poller,
            dispatcher,
            bootstrap,
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self::new_unchecked(PollerSettings::default(), DispatcherSection::default(), None)
    }
}
