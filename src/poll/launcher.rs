// src/poll/launcher.rs

//! Pluggable launcher for the process that triggers per-host work.
//!
//! The poller talks to a `Launcher` instead of spawning processes itself, so
//! tests can substitute a fake that writes marker files in-process.
//!
//! - [`ShellLauncher`] runs the configured command through `sh -c`.
//! - The returned future resolves to the process exit code. Dropping it
//!   before completion kills the child.

use std::fmt::Debug;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::Result;

pub const HOSTS_ENV: &str = "CLUSTERTRACK_HOSTS";
pub const BOOTDIR_ENV: &str = "CLUSTERTRACK_BOOTDIR";
pub const RUN_ID_ENV: &str = "CLUSTERTRACK_RUN_ID";

/// Everything a launcher needs to start one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub run_id: String,
    /// Directory the process writes `<host>.done` / `<host>.log` into.
    pub run_dir: PathBuf,
    pub hosts: Vec<String>,
    /// Extra environment, e.g. paths of staged secrets.
    pub env: Vec<(String, String)>,
}

pub type LaunchFuture = Pin<Box<dyn Future<Output = Result<i32>> + Send + 'static>>;

pub trait Launcher: Send + Sync + Debug {
    /// Start the process and return a future resolving to its exit code.
    fn launch(&self, spec: LaunchSpec) -> LaunchFuture;
}

/// Runs a shell command, logging its output at debug level.
#[derive(Debug, Clone)]
pub struct ShellLauncher {
    cmd: String,
}

impl ShellLauncher {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self { cmd: cmd.into() }
    }

    pub fn cmd(&self) -> &str {
        &self.cmd
    }
}

impl Launcher for ShellLauncher {
    fn launch(&self, spec: LaunchSpec) -> LaunchFuture {
        let cmd = self.cmd.clone();
        Box::pin(async move { run_shell(cmd, spec).await })
    }
}

async fn run_shell(cmd_line: String, spec: LaunchSpec) -> Result<i32> {
    info!(run_id = %spec.run_id, cmd = %cmd_line, hosts = spec.hosts.len(), "starting bootstrap process");

    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(&cmd_line);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(&cmd_line);
        c
    };

    cmd.env(HOSTS_ENV, spec.hosts.join(","))
        .env(BOOTDIR_ENV, &spec.run_dir)
        .env(RUN_ID_ENV, &spec.run_id)
        .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning bootstrap process for run '{}'", spec.run_id))?;

    // Always drain both pipes so the child never blocks on a full buffer.
    if let Some(stdout) = child.stdout.take() {
        let run_id = spec.run_id.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(run_id = %run_id, "stdout: {}", line);
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        let run_id = spec.run_id.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(run_id = %run_id, "stderr: {}", line);
            }
        });
    }

    let status = child
        .wait()
        .await
        .with_context(|| format!("waiting for bootstrap process of run '{}'", spec.run_id))?;

    let code = status.code().unwrap_or(-1);
    info!(run_id = %spec.run_id, exit_code = code, success = status.success(), "bootstrap process exited");
    Ok(code)
}
