use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use clustertrack::errors::Result;
use clustertrack::fs::FileSystem;
use clustertrack::poll::launcher::{LaunchFuture, LaunchSpec, Launcher};
use clustertrack::poll::marker::{append_log, write_done};

/// What one host "does" during a fake run.
#[derive(Debug, Clone)]
pub struct HostScript {
    pub host: String,
    /// Delay before this host writes anything.
    pub delay: Duration,
    pub log: Vec<String>,
    /// Exit code written to the done-file; `None` means the host never finishes.
    pub done: Option<i32>,
}

impl HostScript {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            delay: Duration::ZERO,
            log: Vec::new(),
            done: None,
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn log(mut self, line: &str) -> Self {
        self.log.push(line.to_string());
        self
    }

    pub fn done(mut self, code: i32) -> Self {
        self.done = Some(code);
        self
    }
}

/// How the fake process ends once every host script has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessScript {
    Exit(i32),
    /// Never exits (until the launch future is dropped).
    Hang,
    /// Fails to start at all.
    SpawnError,
}

/// What the launcher observed when it was started.
#[derive(Debug, Clone)]
pub struct LaunchRecord {
    pub spec: LaunchSpec,
    /// Whether every path in `spec.env` existed at launch time.
    pub env_files_present: bool,
}

/// A launcher that writes scripted marker files instead of spawning processes.
#[derive(Debug, Clone)]
pub struct FakeLauncher {
    fs: Arc<dyn FileSystem>,
    hosts: Vec<HostScript>,
    process: ProcessScript,
    exit_delay: Duration,
    launched: Arc<Mutex<Vec<LaunchRecord>>>,
}

impl FakeLauncher {
    pub fn new(fs: Arc<dyn FileSystem>, process: ProcessScript) -> Self {
        Self {
            fs,
            hosts: Vec::new(),
            process,
            exit_delay: Duration::ZERO,
            launched: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn host(mut self, script: HostScript) -> Self {
        self.hosts.push(script);
        self
    }

    /// Delay between the last host script and the process exit.
    pub fn exit_after(mut self, delay: Duration) -> Self {
        self.exit_delay = delay;
        self
    }

    pub fn launched(&self) -> Vec<LaunchRecord> {
        self.launched.lock().unwrap().clone()
    }
}

impl Launcher for FakeLauncher {
    fn launch(&self, spec: LaunchSpec) -> LaunchFuture {
        let env_files_present = spec
            .env
            .iter()
            .all(|(_, path)| self.fs.exists(&PathBuf::from(path)));
        self.launched.lock().unwrap().push(LaunchRecord {
            spec: spec.clone(),
            env_files_present,
        });

        let fs = Arc::clone(&self.fs);
        let hosts = self.hosts.clone();
        let process = self.process;
        let exit_delay = self.exit_delay;

        let fut: Pin<Box<dyn Future<Output = Result<i32>> + Send>> = Box::pin(async move {
            if process == ProcessScript::SpawnError {
                return Err(anyhow!("fake spawn failure").into());
            }

            for script in hosts {
                tokio::time::sleep(script.delay).await;
                for line in &script.log {
                    append_log(fs.as_ref(), &spec.run_dir, &script.host, &format!("{line}\n"))?;
                }
                if let Some(code) = script.done {
                    write_done(fs.as_ref(), &spec.run_dir, &script.host, code)?;
                }
            }

            tokio::time::sleep(exit_delay).await;
            match process {
                ProcessScript::Exit(code) => Ok(code),
                ProcessScript::Hang | ProcessScript::SpawnError => {
                    std::future::pending::<()>().await;
                    Ok(-1)
                }
            }
        });
        fut
    }
}
