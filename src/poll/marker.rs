// src/poll/marker.rs

//! Per-host marker files written by the triggering process.
//!
//! For every host the external work writes, inside the run directory:
//! - `<host>.log`: captured output, appended while the host makes progress;
//! - `<host>.done`: the host's numeric exit code, written once at the end.
//!
//! The poller only ever reads these. The writer helpers exist for launchers
//! that run in-process (tests, fakes).

use std::path::{Path, PathBuf};

use tracing::trace;

use crate::errors::{ClustertrackError, Result};
use crate::fs::FileSystem;
use crate::types::{HostStatusToken, Timestamp};

pub const DONE_EXTENSION: &str = "done";
pub const LOG_EXTENSION: &str = "log";

/// Exit code the bootstrap script writes for a host it gave up on.
pub const HOST_TIMEOUT_EXIT_CODE: i32 = 199;

pub fn done_path(run_dir: &Path, host: &str) -> PathBuf {
    run_dir.join(format!("{host}.{DONE_EXTENSION}"))
}

pub fn log_path(run_dir: &Path, host: &str) -> PathBuf {
    run_dir.join(format!("{host}.{LOG_EXTENSION}"))
}

/// Latest known status of one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostStatusRecord {
    pub host: String,
    pub status: HostStatusToken,
    pub exit_code: Option<i32>,
    /// Log text as last read; may be partial while the host is running.
    pub log: String,
    pub last_seen: Timestamp,
}

impl HostStatusRecord {
    /// A host with no done-file yet.
    pub fn running(host: impl Into<String>, log: impl Into<String>, last_seen: Timestamp) -> Self {
        Self {
            host: host.into(),
            status: HostStatusToken::Running,
            exit_code: None,
            log: log.into(),
            last_seen,
        }
    }

    /// Build a record from raw marker contents.
    ///
    /// `done` is the done-file text, `None` when the file does not exist yet.
    /// A done-file that is not a single integer is a [`ClustertrackError::MarkerReadError`].
    pub fn from_markers(
        host: impl Into<String>,
        done: Option<&str>,
        log: String,
        last_seen: Timestamp,
    ) -> Result<Self> {
        let host = host.into();
        let Some(done) = done else {
            return Ok(Self::running(host, log, last_seen));
        };

        let code: i32 = done.trim().parse().map_err(|_| ClustertrackError::MarkerReadError {
            host: host.clone(),
            reason: format!("done-file does not hold an exit code: {:?}", done),
        })?;

        let status = if code == 0 {
            HostStatusToken::Done
        } else {
            HostStatusToken::Failed
        };

        Ok(Self {
            host,
            status,
            exit_code: Some(code),
            log,
            last_seen,
        })
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn log(&self) -> &str {
        &self.log
    }

    pub fn is_final(&self) -> bool {
        self.status.is_final()
    }

    pub fn timed_out_on_host(&self) -> bool {
        self.exit_code == Some(HOST_TIMEOUT_EXIT_CODE)
    }
}

/// Read both markers of `host` from `run_dir`.
///
/// A missing log is empty; a missing done-file means the host is running.
pub fn read_host_markers(
    fs: &dyn FileSystem,
    run_dir: &Path,
    host: &str,
    now: Timestamp,
) -> Result<HostStatusRecord> {
    let unreadable = |err: anyhow::Error| ClustertrackError::MarkerReadError {
        host: host.to_string(),
        reason: format!("{err:#}"),
    };

    // Done before log: the log is complete once the done-file exists.
    let done_file = done_path(run_dir, host);
    let done = if fs.exists(&done_file) {
        Some(fs.read_to_string(&done_file).map_err(unreadable)?)
    } else {
        None
    };

    let log_file = log_path(run_dir, host);
    let log = if fs.exists(&log_file) {
        fs.read_to_string(&log_file).map_err(unreadable)?
    } else {
        String::new()
    };

    let record = HostStatusRecord::from_markers(host, done.as_deref(), log, now)?;
    trace!(host, status = %record.status, exit_code = ?record.exit_code, "read host markers");
    Ok(record)
}

pub fn append_log(fs: &dyn FileSystem, run_dir: &Path, host: &str, text: &str) -> anyhow::Result<()> {
    fs.append(&log_path(run_dir, host), text.as_bytes())
}

pub fn write_done(fs: &dyn FileSystem, run_dir: &Path, host: &str, code: i32) -> anyhow::Result<()> {
    fs.write(&done_path(run_dir, host), code.to_string().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    const RUN: &str = "/boot/run-1";

    #[test]
    fn missing_done_file_means_running_with_partial_log() {
        let fs = MockFileSystem::new();
        append_log(&fs, Path::new(RUN), "h1", "step 1\n").unwrap();

        let record = read_host_markers(&fs, Path::new(RUN), "h1", 7).unwrap();

        assert_eq!(record.status, HostStatusToken::Running);
        assert_eq!(record.exit_code(), None);
        assert_eq!(record.log(), "step 1\n");
        assert_eq!(record.last_seen, 7);
    }

    #[test]
    fn done_file_classifies_host() {
        let fs = MockFileSystem::new();
        write_done(&fs, Path::new(RUN), "ok", 0).unwrap();
        write_done(&fs, Path::new(RUN), "bad", 2).unwrap();

        let ok = read_host_markers(&fs, Path::new(RUN), "ok", 1).unwrap();
        let bad = read_host_markers(&fs, Path::new(RUN), "bad", 1).unwrap();

        assert_eq!(ok.status, HostStatusToken::Done);
        assert_eq!(ok.log(), "");
        assert_eq!(bad.status, HostStatusToken::Failed);
        assert_eq!(bad.exit_code(), Some(2));
    }

    #[test]
    fn done_file_with_trailing_newline_parses() {
        let record = HostStatusRecord::from_markers("h1", Some("0\n"), String::new(), 1).unwrap();
        assert_eq!(record.status, HostStatusToken::Done);
    }

    #[test]
    fn malformed_done_file_is_a_marker_error() {
        for text in ["", "ok", "1 2"] {
            let err = HostStatusRecord::from_markers("h1", Some(text), String::new(), 1).unwrap_err();
            assert!(
                matches!(err, ClustertrackError::MarkerReadError { ref host, .. } if host == "h1"),
                "unexpected error for {text:?}: {err}"
            );
        }
    }

    #[test]
    fn unreadable_log_is_a_marker_error() {
        let fs = MockFileSystem::new();
        append_log(&fs, Path::new(RUN), "h1", "x").unwrap();
        fs.fail_reads(log_path(Path::new(RUN), "h1"));

        let err = read_host_markers(&fs, Path::new(RUN), "h1", 1).unwrap_err();
        assert!(matches!(err, ClustertrackError::MarkerReadError { .. }));
    }

    #[test]
    fn host_timeout_code_is_recognised() {
        let record = HostStatusRecord::from_markers("h1", Some("199"), String::new(), 1).unwrap();
        assert!(record.timed_out_on_host());
        assert_eq!(record.status, HostStatusToken::Failed);
    }
}
