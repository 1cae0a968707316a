// src/lifecycle/bootstrap.rs

//! Bootstrap run lifecycle: RUNNING until a scan reports SUCCESS or ERROR.
//!
//! Every poller scan arrives as a `HOSTS_SCANNED` event carrying the freshly
//! aggregated [`ScanResult`]; the multi-arc action picks the destination
//! from the aggregate. A watchdog expiry, or a scan taken after the process
//! was killed for exceeding the launch timeout, only flags the run as timed
//! out and leaves it in whatever state the last scan produced.

use std::fmt;

use tracing::warn;

use crate::errors::Result;
use crate::fsm::{Lifecycle, Machine, MachineEvent, TrackedEntity, TransitionTable};
use crate::poll::aggregate::{AggregateStatus, ProcessState, ScanResult};
use crate::poll::marker::HostStatusRecord;
use crate::types::{EntityId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BootstrapState {
    Running,
    Success,
    Error,
}

impl fmt::Display for BootstrapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootstrapState::Running => write!(f, "RUNNING"),
            BootstrapState::Success => write!(f, "SUCCESS"),
            BootstrapState::Error => write!(f, "ERROR"),
        }
    }
}

impl From<AggregateStatus> for BootstrapState {
    fn from(status: AggregateStatus) -> Self {
        match status {
            AggregateStatus::Running => BootstrapState::Running,
            AggregateStatus::Success => BootstrapState::Success,
            AggregateStatus::Error => BootstrapState::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BootstrapEventType {
    HostsScanned,
    WatchdogExpired,
}

impl fmt::Display for BootstrapEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootstrapEventType::HostsScanned => write!(f, "HOSTS_SCANNED"),
            BootstrapEventType::WatchdogExpired => write!(f, "WATCHDOG_EXPIRED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapEvent {
    HostsScanned {
        run_id: EntityId,
        scan: ScanResult,
        at: Timestamp,
    },
    WatchdogExpired {
        run_id: EntityId,
        pending: Vec<String>,
        at: Timestamp,
    },
}

impl MachineEvent for BootstrapEvent {
    type Kind = BootstrapEventType;

    fn entity_id(&self) -> &str {
        match self {
            BootstrapEvent::HostsScanned { run_id, .. }
            | BootstrapEvent::WatchdogExpired { run_id, .. } => run_id,
        }
    }

    fn kind(&self) -> BootstrapEventType {
        match self {
            BootstrapEvent::HostsScanned { .. } => BootstrapEventType::HostsScanned,
            BootstrapEvent::WatchdogExpired { .. } => BootstrapEventType::WatchdogExpired,
        }
    }
}

/// Everything the presentation layer needs about a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapData {
    pub lifecycle: Lifecycle,
    pub scans: u32,
    pub process_exit: Option<i32>,
    pub hosts: Vec<HostStatusRecord>,
    /// Aggregated log text of the latest scan.
    pub log: String,
    pub timed_out: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct BootstrapMachine;

impl Machine for BootstrapMachine {
    type State = BootstrapState;
    type Kind = BootstrapEventType;
    type Event = BootstrapEvent;
    type Data = BootstrapData;
    const NAME: &'static str = "bootstrap";
}

pub type BootstrapRun = TrackedEntity<BootstrapMachine>;

pub fn bootstrap_table() -> Result<TransitionTable<BootstrapMachine>> {
    use BootstrapEventType as E;
    use BootstrapState as S;

    TransitionTable::<BootstrapMachine>::builder(S::Running)
        .multi(S::Running, &[S::Running, S::Success, S::Error], E::HostsScanned, |data, event| {
            match apply_scan(data, event) {
                Some(status) => status.into(),
                None => S::Running,
            }
        })
        // A late non-zero process exit can still turn a success into an error.
        .multi(S::Success, &[S::Success, S::Error], E::HostsScanned, |data, event| {
            match apply_scan(data, event) {
                Some(AggregateStatus::Error) => S::Error,
                _ => S::Success,
            }
        })
        .transition(S::Error, S::Error, E::HostsScanned, |data, event| {
            apply_scan(data, event);
        })
        .transition(S::Running, S::Running, E::WatchdogExpired, |data, event| {
            if let BootstrapEvent::WatchdogExpired { run_id, pending, at } = event {
                warn!(run_id = %run_id, ?pending, "watchdog expired before all hosts reported");
                data.timed_out = true;
                data.lifecycle.touch(*at);
            }
        })
        .terminal(&[S::Success, S::Error])
        .build()
}

fn apply_scan(data: &mut BootstrapData, event: &BootstrapEvent) -> Option<AggregateStatus> {
    let BootstrapEvent::HostsScanned { scan, at, .. } = event else {
        return None;
    };

    data.scans += 1;
    data.process_exit = scan.process_exit();
    if scan.process == ProcessState::Killed {
        data.timed_out = true;
    }
    data.hosts = scan.hosts.clone();
    data.log = scan.log.clone();
    if scan.status == AggregateStatus::Running {
        data.lifecycle.touch(*at);
    } else {
        data.lifecycle.complete(*at);
    }
    Some(scan.status)
}
