// src/lifecycle/mod.rs

//! Concrete entity kinds built on [`crate::fsm`].

pub mod bootstrap;
pub mod host;
pub mod job;

pub use bootstrap::{
    bootstrap_table, BootstrapData, BootstrapEvent, BootstrapEventType, BootstrapMachine,
    BootstrapRun, BootstrapState,
};
pub use host::{host_table, Host, HostEvent, HostEventType, HostMachine, HostState};
pub use job::{job_table, new_job, Job, JobEvent, JobEventType, JobMachine, JobState};
