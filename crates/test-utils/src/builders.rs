#![allow(dead_code)]

use std::time::Duration;

use clustertrack::config::model::{RawBootstrapSection, RawPollerSection};
use clustertrack::config::{ConfigFile, RawConfigFile};
use clustertrack::poll::PollerSettings;

/// Poller settings short enough for tests: 10ms scans, 300ms watchdog.
pub fn fast_settings() -> PollerSettings {
    PollerSettings {
        scan_interval: Duration::from_millis(10),
        watchdog: Duration::from_millis(300),
        launch_timeout: Duration::from_secs(3),
        max_parallel_reads: 4,
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_bootstrap(mut self, cmd: &str, bootdir: &str) -> Self {
        self.config.bootstrap = Some(RawBootstrapSection {
            cmd: cmd.to_string(),
            bootdir: bootdir.to_string(),
            hosts: Vec::new(),
            secrets: Default::default(),
        });
        self
    }

    pub fn with_host(mut self, host: &str) -> Self {
        self.bootstrap_mut().hosts.push(host.to_string());
        self
    }

    pub fn with_secret(mut self, name: &str, path: &str) -> Self {
        self.bootstrap_mut()
            .secrets
            .insert(name.to_string(), path.to_string());
        self
    }

    pub fn with_poller(mut self, poller: RawPollerSection) -> Self {
        self.config.poller = poller;
        self
    }

    pub fn with_watchdog(mut self, watchdog: &str) -> Self {
        self.config.poller.watchdog = watchdog.to_string();
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.dispatcher.queue_capacity = capacity;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }

    fn bootstrap_mut(&mut self) -> &mut RawBootstrapSection {
        self.config
            .bootstrap
            .get_or_insert_with(|| RawBootstrapSection {
                cmd: "true".to_string(),
                bootdir: "/tmp/clustertrack".to_string(),
                hosts: Vec::new(),
                secrets: Default::default(),
            })
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
