// src/poll/poller.rs

//! Drives one bootstrap run from launch to a reported outcome.
//!
//! The poller launches the triggering process, then rescans every target
//! host's marker files on a fixed delay. Each scan is aggregated and sent to
//! the run's [`BootstrapRun`] entity through the [`Dispatcher`]. Once the
//! process exits, secrets are removed and one more scan runs immediately.
//! If hosts are still outstanding after that, the watchdog bounds how long
//! the poller keeps waiting for them.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::{AbortHandle, JoinHandle, JoinSet};
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use crate::config::{validate_hosts, validate_run_id};
use crate::dispatch::Dispatcher;
use crate::errors::{ClustertrackError, Result};
use crate::fs::FileSystem;
use crate::fsm::{Snapshot, TrackedEntity, TransitionTable};
use crate::lifecycle::bootstrap::{
    bootstrap_table, BootstrapEvent, BootstrapMachine, BootstrapRun, BootstrapState,
};
use crate::poll::aggregate::{aggregate, ProcessState, ScanResult};
use crate::poll::launcher::{LaunchFuture, LaunchSpec, Launcher};
use crate::poll::marker::{read_host_markers, HostStatusRecord};
use crate::poll::secrets::{Secret, StagedSecrets};
use crate::types::{now_millis, EntityId, HostStatusToken, ReportStatus, Timestamp};

pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_WATCHDOG: Duration = Duration::from_secs(15);
pub const DEFAULT_LAUNCH_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_MAX_PARALLEL_READS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerSettings {
    /// Delay between the end of one scan and the start of the next.
    pub scan_interval: Duration,
    /// How long to wait for stragglers once the process has exited.
    pub watchdog: Duration,
    /// Upper bound on the triggering process' runtime.
    pub launch_timeout: Duration,
    pub max_parallel_reads: usize,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            scan_interval: DEFAULT_SCAN_INTERVAL,
            watchdog: DEFAULT_WATCHDOG,
            launch_timeout: DEFAULT_LAUNCH_TIMEOUT,
            max_parallel_reads: DEFAULT_MAX_PARALLEL_READS,
        }
    }
}

/// One bootstrap run to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapRequest {
    pub run_id: EntityId,
    pub hosts: Vec<String>,
    pub secrets: Vec<Secret>,
    /// Overrides [`PollerSettings::watchdog`] for this run.
    pub watchdog: Option<Duration>,
}

impl BootstrapRequest {
    pub fn new(run_id: impl Into<EntityId>, hosts: Vec<String>) -> Self {
        Self {
            run_id: run_id.into(),
            hosts,
            secrets: Vec::new(),
            watchdog: None,
        }
    }

    pub fn with_secrets(mut self, secrets: Vec<Secret>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn with_watchdog(mut self, watchdog: Duration) -> Self {
        self.watchdog = Some(watchdog);
        self
    }
}

/// Final outcome of a run: status plus the aggregated log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    pub run_id: EntityId,
    pub status: ReportStatus,
    pub entity_state: BootstrapState,
    pub process_exit: Option<i32>,
    pub hosts: Vec<HostStatusRecord>,
    /// Hosts without a done-file when the run finished.
    pub pending: Vec<String>,
    pub log: String,
}

impl BootstrapReport {
    fn from_snapshot(run_id: EntityId, snapshot: Snapshot<BootstrapMachine>) -> Self {
        let Snapshot { state, data } = snapshot;
        let status = match state {
            BootstrapState::Error => ReportStatus::Error,
            BootstrapState::Success if !data.timed_out => ReportStatus::Success,
            BootstrapState::Success | BootstrapState::Running => ReportStatus::Timeout,
        };
        let pending = data
            .hosts
            .iter()
            .filter(|r| !r.is_final())
            .map(|r| r.host.clone())
            .collect();

        Self {
            run_id,
            status,
            entity_state: state,
            process_exit: data.process_exit,
            hosts: data.hosts,
            pending,
            log: data.log,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ReportStatus::Success
    }

    pub fn failed_hosts(&self) -> Vec<String> {
        self.hosts
            .iter()
            .filter(|r| r.status == HostStatusToken::Failed)
            .map(|r| r.host.clone())
            .collect()
    }

    /// Turn a non-successful report into the matching error.
    pub fn into_result(self) -> Result<Self> {
        match self.status {
            ReportStatus::Success => Ok(self),
            ReportStatus::Timeout => Err(ClustertrackError::PollTimeout {
                run_id: self.run_id,
                pending: self.pending,
            }),
            ReportStatus::Error => match self.process_exit {
                Some(code) if code != 0 => Err(ClustertrackError::ExternalProcessError {
                    run_id: self.run_id,
                    code,
                }),
                _ => Err(ClustertrackError::HostsFailed {
                    hosts: self.failed_hosts(),
                    run_id: self.run_id,
                }),
            },
        }
    }
}

impl fmt::Display for BootstrapReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "bootstrap run {}: {}", self.run_id, self.status)?;
        write!(f, "{}", self.log)
    }
}

/// Handle to a run started with [`StatusPoller::start`].
#[derive(Debug)]
pub struct PollHandle {
    run_id: EntityId,
    entity: Arc<BootstrapRun>,
    handle: JoinHandle<Result<BootstrapReport>>,
}

impl PollHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn state(&self) -> BootstrapState {
        self.entity.state()
    }

    pub fn entity(&self) -> &Arc<BootstrapRun> {
        &self.entity
    }

    /// Stop polling. Staged secrets are removed; the process is killed.
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.handle.abort_handle()
    }

    pub async fn join(self) -> Result<BootstrapReport> {
        match self.handle.await {
            Ok(result) => result,
            Err(err) => Err(anyhow!("poll task for run '{}' did not finish: {}", self.run_id, err).into()),
        }
    }
}

#[derive(Debug)]
pub struct StatusPoller {
    settings: PollerSettings,
    bootdir: PathBuf,
    fs: Arc<dyn FileSystem>,
    launcher: Arc<dyn Launcher>,
    dispatcher: Dispatcher<BootstrapMachine>,
    table: Arc<TransitionTable<BootstrapMachine>>,
}

impl StatusPoller {
    pub fn new(
        settings: PollerSettings,
        bootdir: impl Into<PathBuf>,
        fs: Arc<dyn FileSystem>,
        launcher: Arc<dyn Launcher>,
        dispatcher: Dispatcher<BootstrapMachine>,
    ) -> Result<Self> {
        Ok(Self {
            settings,
            bootdir: bootdir.into(),
            fs,
            launcher,
            dispatcher,
            table: Arc::new(bootstrap_table()?),
        })
    }

    pub fn settings(&self) -> &PollerSettings {
        &self.settings
    }

    pub fn dispatcher(&self) -> &Dispatcher<BootstrapMachine> {
        &self.dispatcher
    }

    /// Directory holding the marker files of `run_id`.
    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.bootdir.join(run_id)
    }

    /// Launch the run and start polling in the background.
    ///
    /// The run id and host names become path components under the bootdir
    /// and are rejected with `ConfigError` if they could escape it.
    pub fn start(&self, request: BootstrapRequest) -> Result<PollHandle> {
        let BootstrapRequest {
            run_id,
            hosts,
            secrets,
            watchdog,
        } = request;

        validate_run_id(&run_id)?;
        if !hosts.is_empty() {
            validate_hosts(&hosts)?;
        }

        let run_dir = self.run_dir(&run_id);
        self.fs.create_dir_all(&run_dir)?;

        let entity = Arc::new(TrackedEntity::new(run_id.clone(), Arc::clone(&self.table)));
        self.dispatcher.register(Arc::clone(&entity))?;

        let staged = match StagedSecrets::stage(Arc::clone(&self.fs), &run_dir, &secrets) {
            Ok(staged) => staged,
            Err(err) => {
                self.dispatcher.deregister(&run_id);
                return Err(err);
            }
        };

        let settings = PollerSettings {
            watchdog: watchdog.unwrap_or(self.settings.watchdog),
            ..self.settings
        };

        info!(
            run_id = %run_id,
            hosts = hosts.len(),
            run_dir = ?run_dir,
            watchdog = ?settings.watchdog,
            "starting bootstrap run"
        );

        let launch = self.launcher.launch(LaunchSpec {
            run_id: run_id.clone(),
            run_dir: run_dir.clone(),
            hosts: hosts.clone(),
            env: staged.env(),
        });
        let (waiter, exit_rx) = spawn_process_waiter(run_id.clone(), launch, settings.launch_timeout);

        let run = PollRun {
            run_id: run_id.clone(),
            hosts,
            run_dir,
            settings,
            fs: Arc::clone(&self.fs),
            dispatcher: self.dispatcher.clone(),
            entity: Arc::clone(&entity),
            secrets: Some(staged),
            previous: HashMap::new(),
            waiter,
        };
        let handle = tokio::spawn(run.drive(exit_rx));

        Ok(PollHandle {
            run_id,
            entity,
            handle,
        })
    }

    /// Start a run and wait for its report.
    pub async fn run(&self, request: BootstrapRequest) -> Result<BootstrapReport> {
        self.start(request)?.join().await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessOutcome {
    Exited(i32),
    /// Killed after exceeding the launch timeout.
    TimedOut,
}

/// Await the process on its own task so scans keep running meanwhile.
fn spawn_process_waiter(
    run_id: EntityId,
    launch: LaunchFuture,
    launch_timeout: Duration,
) -> (JoinHandle<()>, oneshot::Receiver<ProcessOutcome>) {
    let (tx, rx) = oneshot::channel();
    let waiter = tokio::spawn(async move {
        let outcome = match time::timeout(launch_timeout, launch).await {
            Ok(Ok(code)) => ProcessOutcome::Exited(code),
            Ok(Err(err)) => {
                error!(run_id = %run_id, error = %err, "bootstrap process could not be run");
                ProcessOutcome::Exited(-1)
            }
            Err(_) => {
                // Dropping the launch future kills the child.
                warn!(run_id = %run_id, timeout = ?launch_timeout, "bootstrap process exceeded launch timeout; killed");
                ProcessOutcome::TimedOut
            }
        };
        let _ = tx.send(outcome);
    });
    (waiter, rx)
}

struct PollRun {
    run_id: EntityId,
    hosts: Vec<String>,
    run_dir: PathBuf,
    settings: PollerSettings,
    fs: Arc<dyn FileSystem>,
    dispatcher: Dispatcher<BootstrapMachine>,
    entity: Arc<BootstrapRun>,
    secrets: Option<StagedSecrets>,
    /// Last good record per host, reused when a read fails.
    previous: HashMap<String, HostStatusRecord>,
    waiter: JoinHandle<()>,
}

impl Drop for PollRun {
    fn drop(&mut self) {
        // Aborting drops the launch future, which kills a still-running child.
        self.waiter.abort();
        // The entity stays reachable through the handle and the report.
        self.dispatcher.deregister(&self.run_id);
    }
}

impl PollRun {
    async fn drive(mut self, mut exit_rx: oneshot::Receiver<ProcessOutcome>) -> Result<BootstrapReport> {
        let mut process = ProcessState::Running;
        let mut process_running = true;
        let mut watchdog_deadline: Option<Instant> = None;

        loop {
            let scan = self.scan(process).await;
            let state = self.apply(scan).await?;

            if !process_running && state != BootstrapState::Running {
                return Ok(self.finish());
            }

            let deadline = watchdog_deadline.unwrap_or_else(Instant::now);
            tokio::select! {
                outcome = &mut exit_rx, if process_running => {
                    process_running = false;
                    self.release_secrets();
                    match outcome {
                        Ok(ProcessOutcome::Exited(code)) => {
                            process = ProcessState::Exited(code);
                            watchdog_deadline = Some(Instant::now() + self.settings.watchdog);
                            debug!(run_id = %self.run_id, exit_code = code, "process exited; draining markers");
                        }
                        Ok(ProcessOutcome::TimedOut) => return self.give_up(ProcessState::Killed).await,
                        Err(_) => {
                            warn!(run_id = %self.run_id, "process waiter vanished; treating as failed launch");
                            process = ProcessState::Exited(-1);
                            watchdog_deadline = Some(Instant::now() + self.settings.watchdog);
                        }
                    }
                }
                _ = time::sleep(self.settings.scan_interval) => {}
                _ = time::sleep_until(deadline), if watchdog_deadline.is_some() => {
                    return self.give_up(process).await;
                }
            }
        }
    }

    /// Read every host's markers with bounded parallelism and aggregate.
    async fn scan(&mut self, process: ProcessState) -> ScanResult {
        let now = now_millis();
        let semaphore = Arc::new(Semaphore::new(self.settings.max_parallel_reads.max(1)));
        let mut reads = JoinSet::new();

        for (idx, host) in self.hosts.iter().enumerate() {
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(p) => p,
                Err(_) => break,
            };
            let fs = Arc::clone(&self.fs);
            let run_dir = self.run_dir.clone();
            let host = host.clone();
            reads.spawn_blocking(move || {
                let _permit = permit;
                (idx, read_host_markers(fs.as_ref(), &run_dir, &host, now))
            });
        }

        let mut fresh: Vec<Option<Result<HostStatusRecord>>> = self.hosts.iter().map(|_| None).collect();
        while let Some(joined) = reads.join_next().await {
            match joined {
                Ok((idx, result)) => fresh[idx] = Some(result),
                Err(err) => warn!(run_id = %self.run_id, error = %err, "marker read task panicked"),
            }
        }

        let mut records = Vec::with_capacity(self.hosts.len());
        for (host, result) in self.hosts.iter().zip(fresh) {
            let record = match result {
                Some(Ok(record)) => {
                    self.previous.insert(host.clone(), record.clone());
                    record
                }
                Some(Err(err)) => {
                    debug!(run_id = %self.run_id, host = %host, error = %err, "no new marker information this tick");
                    fallback(&self.previous, host, now)
                }
                None => fallback(&self.previous, host, now),
            };
            records.push(record);
        }

        let scan = aggregate(process, records);
        debug!(
            run_id = %self.run_id,
            status = %scan.status,
            pending = scan.pending_hosts().len(),
            "scan complete"
        );
        scan
    }

    async fn apply(&self, scan: ScanResult) -> Result<BootstrapState> {
        self.dispatcher
            .dispatch(BootstrapEvent::HostsScanned {
                run_id: self.run_id.clone(),
                scan,
                at: now_millis(),
            })
            .await
    }

    /// Stop waiting: take one last look, then report what is known.
    ///
    /// A killed process is recorded by the final scan itself; otherwise a
    /// run still RUNNING gets a watchdog expiry.
    async fn give_up(mut self, process: ProcessState) -> Result<BootstrapReport> {
        let scan = self.scan(process).await;
        let pending = scan.pending_hosts();
        let state = self.apply(scan).await?;

        if state == BootstrapState::Running && process != ProcessState::Killed {
            self.dispatcher
                .dispatch(BootstrapEvent::WatchdogExpired {
                    run_id: self.run_id.clone(),
                    pending,
                    at: now_millis(),
                })
                .await?;
        }
        Ok(self.finish())
    }

    fn finish(mut self) -> BootstrapReport {
        self.release_secrets();
        let report = BootstrapReport::from_snapshot(self.run_id.clone(), self.entity.snapshot());
        info!(
            run_id = %report.run_id,
            status = %report.status,
            process_exit = ?report.process_exit,
            pending = ?report.pending,
            "bootstrap run finished"
        );
        report
    }

    fn release_secrets(&mut self) {
        if let Some(mut secrets) = self.secrets.take() {
            secrets.cleanup();
        }
    }
}

fn fallback(previous: &HashMap<String, HostStatusRecord>, host: &str, now: Timestamp) -> HostStatusRecord {
    previous
        .get(host)
        .cloned()
        .unwrap_or_else(|| HostStatusRecord::running(host, "", now))
}
