use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Identifier of a tracked entity (job id, host name, bootstrap run id).
pub type EntityId = String;

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Current wall-clock time as a [`Timestamp`].
pub fn now_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Timestamp)
        .unwrap_or(0)
}

/// Coarse per-host status derived from marker files.
///
/// - `Running`: no done-file yet (or nothing readable so far).
/// - `Done`: done-file present with exit code `0`.
/// - `Failed`: done-file present with a non-zero exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostStatusToken {
    Running,
    Done,
    Failed,
}

impl HostStatusToken {
    pub fn is_final(self) -> bool {
        !matches!(self, HostStatusToken::Running)
    }
}

impl fmt::Display for HostStatusToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostStatusToken::Running => write!(f, "RUNNING"),
            HostStatusToken::Done => write!(f, "DONE"),
            HostStatusToken::Failed => write!(f, "FAILED"),
        }
    }
}

/// Final status reported to callers once a poll finishes.
///
/// `Timeout` is distinct from `Error`: either the watchdog fired with hosts
/// still running, or the process was killed after the launch timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStatus {
    Success,
    Error,
    Timeout,
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportStatus::Success => write!(f, "SUCCESS"),
            ReportStatus::Error => write!(f, "ERROR"),
            ReportStatus::Timeout => write!(f, "TIMEOUT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display() {
        assert_eq!(HostStatusToken::Failed.to_string(), "FAILED");
        assert_eq!(ReportStatus::Timeout.to_string(), "TIMEOUT");
    }

    #[test]
    fn only_running_is_not_final() {
        assert!(!HostStatusToken::Running.is_final());
        assert!(HostStatusToken::Done.is_final());
        assert!(HostStatusToken::Failed.is_final());
    }
}
