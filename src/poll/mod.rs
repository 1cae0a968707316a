// src/poll/mod.rs

//! Bridge from marker files written by external work to bootstrap events.
//!
//! - [`marker`]: per-host `<host>.done` / `<host>.log` files and
//!   [`HostStatusRecord`].
//! - [`aggregate`]: pure run-level status and log rendering.
//! - [`launcher`]: how the triggering process is started.
//! - [`secrets`]: credentials staged for the process and removed afterwards.
//! - [`poller`]: the scan loop tying these together.

pub mod aggregate;
pub mod launcher;
pub mod marker;
pub mod poller;
pub mod secrets;

pub use aggregate::{aggregate, AggregateStatus, ProcessState, ScanResult};
pub use launcher::{LaunchFuture, LaunchSpec, Launcher, ShellLauncher};
pub use marker::HostStatusRecord;
pub use poller::{BootstrapReport, BootstrapRequest, PollHandle, PollerSettings, StatusPoller};
pub use secrets::{Secret, StagedSecrets};
