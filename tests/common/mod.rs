#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clustertrack::dispatch::Dispatcher;
use clustertrack::fs::mock::MockFileSystem;
use clustertrack::fs::FileSystem;
use clustertrack::poll::{Launcher, PollerSettings, StatusPoller};
use clustertrack_test_utils::fake_launcher::{FakeLauncher, ProcessScript};

pub const BOOTDIR: &str = "/var/run/clustertrack";

pub fn hosts(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

pub fn run_dir(run_id: &str) -> PathBuf {
    Path::new(BOOTDIR).join(run_id)
}

/// A fake launcher writing into `fs`.
pub fn fake(fs: &MockFileSystem, process: ProcessScript) -> FakeLauncher {
    FakeLauncher::new(Arc::new(fs.clone()), process)
}

pub fn poller(fs: &MockFileSystem, launcher: impl Launcher + 'static, settings: PollerSettings) -> StatusPoller {
    let fs: Arc<dyn FileSystem> = Arc::new(fs.clone());
    StatusPoller::new(settings, BOOTDIR, fs, Arc::new(launcher), Dispatcher::default())
        .expect("bootstrap table builds")
}
