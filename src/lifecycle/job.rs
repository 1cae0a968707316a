// src/lifecycle/job.rs

//! Job lifecycle: INIT -> IN_PROGRESS -> COMPLETED | FAILED.
//!
//! Terminal jobs can be recycled either with [`TrackedEntity::reset`] or by
//! sending a fresh `JOB_INIT` event, which clears the timestamps.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::errors::Result;
use crate::fsm::{Lifecycle, Machine, MachineEvent, TrackedEntity, TransitionTable};
use crate::types::{EntityId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    Init,
    InProgress,
    Completed,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Init => write!(f, "INIT"),
            JobState::InProgress => write!(f, "IN_PROGRESS"),
            JobState::Completed => write!(f, "COMPLETED"),
            JobState::Failed => write!(f, "FAILED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobEventType {
    JobInit,
    JobInProgress,
    JobCompleted,
    JobFailed,
}

impl fmt::Display for JobEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobEventType::JobInit => write!(f, "JOB_INIT"),
            JobEventType::JobInProgress => write!(f, "JOB_IN_PROGRESS"),
            JobEventType::JobCompleted => write!(f, "JOB_COMPLETED"),
            JobEventType::JobFailed => write!(f, "JOB_FAILED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobEvent {
    pub job_id: EntityId,
    pub kind: JobEventType,
    pub timestamp: Timestamp,
}

impl JobEvent {
    pub fn new(job_id: impl Into<EntityId>, kind: JobEventType, timestamp: Timestamp) -> Self {
        Self {
            job_id: job_id.into(),
            kind,
            timestamp,
        }
    }
}

impl MachineEvent for JobEvent {
    type Kind = JobEventType;

    fn entity_id(&self) -> &str {
        &self.job_id
    }

    fn kind(&self) -> JobEventType {
        self.kind
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobData {
    pub lifecycle: Lifecycle,
    /// Number of progress reports received in the current run.
    pub progress_reports: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct JobMachine;

impl Machine for JobMachine {
    type State = JobState;
    type Kind = JobEventType;
    type Event = JobEvent;
    type Data = JobData;
    const NAME: &'static str = "job";
}

pub type Job = TrackedEntity<JobMachine>;

/// Build the job transition table.
///
/// `(INIT, JOB_IN_PROGRESS)` is registered exactly once.
pub fn job_table() -> Result<TransitionTable<JobMachine>> {
    use JobEventType::*;
    use JobState::*;

    TransitionTable::<JobMachine>::builder(Init)
        .noop(Init, Init, JobInit)
        .transition(Init, InProgress, JobInProgress, record_progress)
        .transition(InProgress, InProgress, JobInProgress, record_progress)
        .transition(Init, Completed, JobCompleted, record_completion)
        .transition(InProgress, Completed, JobCompleted, record_completion)
        .transition(Init, Failed, JobFailed, record_completion)
        .transition(InProgress, Failed, JobFailed, record_completion)
        .transition(Completed, Init, JobInit, reinit)
        .transition(Failed, Init, JobInit, reinit)
        .terminal(&[Completed, Failed])
        .build()
}

/// Create a job in `INIT` sharing `table`.
pub fn new_job(job_id: impl Into<EntityId>, table: Arc<TransitionTable<JobMachine>>) -> Job {
    TrackedEntity::new(job_id, table)
}

fn record_progress(data: &mut JobData, event: &JobEvent) {
    data.lifecycle.touch(event.timestamp);
    data.progress_reports += 1;
}

fn record_completion(data: &mut JobData, event: &JobEvent) {
    data.lifecycle.complete(event.timestamp);
}

fn reinit(data: &mut JobData, event: &JobEvent) {
    debug!(job = %event.job_id, "re-initialising job for a new run");
    *data = JobData::default();
}
