// src/poll/aggregate.rs

//! Pure aggregation of host records into a run-level status.
//!
//! Recomputed from scratch on every scan, so evaluating the same inputs twice
//! always yields the same [`ScanResult`].

use std::fmt::{self, Write as _};

use crate::poll::marker::HostStatusRecord;
use crate::types::HostStatusToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateStatus {
    Running,
    Success,
    Error,
}

impl AggregateStatus {
    pub fn is_final(self) -> bool {
        !matches!(self, AggregateStatus::Running)
    }
}

impl fmt::Display for AggregateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateStatus::Running => write!(f, "RUNNING"),
            AggregateStatus::Success => write!(f, "SUCCESS"),
            AggregateStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// What is known about the triggering process at scan time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessState {
    Running,
    Exited(i32),
    /// Killed after exceeding the launch timeout.
    Killed,
}

impl ProcessState {
    pub fn exit_code(self) -> Option<i32> {
        match self {
            ProcessState::Exited(code) => Some(code),
            ProcessState::Running | ProcessState::Killed => None,
        }
    }
}

impl From<Option<i32>> for ProcessState {
    fn from(exit: Option<i32>) -> Self {
        exit.map_or(ProcessState::Running, ProcessState::Exited)
    }
}

/// Outcome of one scan over every target host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub status: AggregateStatus,
    pub process: ProcessState,
    pub hosts: Vec<HostStatusRecord>,
    pub log: String,
}

impl ScanResult {
    /// Exit code of the triggering process, once it has exited.
    pub fn process_exit(&self) -> Option<i32> {
        self.process.exit_code()
    }

    /// Hosts that have not written a done-file yet.
    pub fn pending_hosts(&self) -> Vec<String> {
        self.hosts
            .iter()
            .filter(|r| !r.is_final())
            .map(|r| r.host.clone())
            .collect()
    }
}

/// Derive the run status:
/// `ERROR` if the process exited non-zero or any host failed, otherwise
/// `RUNNING` while any host is running, otherwise `SUCCESS`.
///
/// An empty host list with no failure is `SUCCESS`.
pub fn aggregate(process: ProcessState, hosts: Vec<HostStatusRecord>) -> ScanResult {
    let process_failed = matches!(process, ProcessState::Exited(code) if code != 0);
    let any_failed = hosts.iter().any(|r| r.status == HostStatusToken::Failed);
    let any_running = hosts.iter().any(|r| r.status == HostStatusToken::Running);

    let status = if process_failed || any_failed {
        AggregateStatus::Error
    } else if any_running {
        AggregateStatus::Running
    } else {
        AggregateStatus::Success
    };

    let log = render_log(process, &hosts);
    ScanResult {
        status,
        process,
        hosts,
        log,
    }
}

/// Concatenate host logs, one headed section per host.
pub fn render_log(process: ProcessState, hosts: &[HostStatusRecord]) -> String {
    let mut out = String::new();
    match process {
        ProcessState::Exited(code) => {
            let _ = writeln!(out, "process exited with code {code}");
        }
        ProcessState::Running => out.push_str("process still running\n"),
        ProcessState::Killed => out.push_str("process killed after launch timeout\n"),
    }

    for record in hosts {
        let _ = write!(out, "==> {} [{}", record.host, record.status);
        if let Some(code) = record.exit_code {
            let _ = write!(out, " exit={code}");
        }
        if record.timed_out_on_host() {
            out.push_str(", timed out on host");
        }
        out.push_str("]\n");

        if record.log.is_empty() {
            if record.is_final() {
                out.push_str("(no output)\n");
            } else {
                out.push_str("(no status reported)\n");
            }
        } else {
            out.push_str(&record.log);
            if !record.log.ends_with('\n') {
                out.push('\n');
            }
        }
    }
    out
}
