// src/poll/secrets.rs

//! Credentials staged on disk for the triggering process.
//!
//! [`StagedSecrets`] writes each secret as an owner-only file in the run
//! directory and removes every file it wrote when it is cleaned up or
//! dropped, whichever comes first.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::validate_secret_name;
use crate::errors::Result;
use crate::fs::FileSystem;

pub const SECRET_EXTENSION: &str = "secret";

/// Prefix of the environment variables pointing at staged secret files.
pub const SECRET_ENV_PREFIX: &str = "CLUSTERTRACK_SECRET_";

/// One secret to stage: its name and contents.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret {
    pub name: String,
    pub contents: String,
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secret")
            .field("name", &self.name)
            .field("contents", &"<redacted>")
            .finish()
    }
}

impl Secret {
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }

    pub fn env_var(&self) -> String {
        format!("{SECRET_ENV_PREFIX}{}", self.name.to_uppercase())
    }
}

#[derive(Debug)]
pub struct StagedSecrets {
    fs: Arc<dyn FileSystem>,
    staged: Vec<(String, PathBuf)>,
}

impl StagedSecrets {
    /// Write every secret into `run_dir`.
    ///
    /// Names are checked before anything is written. If any write fails, the
    /// files already written are removed before the error is returned.
    pub fn stage(fs: Arc<dyn FileSystem>, run_dir: &Path, secrets: &[Secret]) -> Result<Self> {
        for secret in secrets {
            validate_secret_name(&secret.name)?;
        }

        let mut guard = Self {
            fs,
            staged: Vec::with_capacity(secrets.len()),
        };

        for secret in secrets {
            let path = run_dir.join(format!("{}.{SECRET_EXTENSION}", secret.name));
            guard.fs.write_private(&path, secret.contents.as_bytes())?;
            debug!(secret = %secret.name, path = ?path, "staged secret");
            guard.staged.push((secret.env_var(), path));
        }

        Ok(guard)
    }

    /// `(VAR, path)` pairs to hand to the launched process.
    pub fn env(&self) -> Vec<(String, String)> {
        self.staged
            .iter()
            .map(|(var, path)| (var.clone(), path.display().to_string()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Remove all staged files now. Idempotent.
    pub fn cleanup(&mut self) {
        for (_, path) in self.staged.drain(..) {
            match self.fs.remove_file(&path) {
                Ok(()) => debug!(path = ?path, "removed staged secret"),
                Err(err) => warn!(path = ?path, error = %err, "failed to remove staged secret"),
            }
        }
    }
}

impl Drop for StagedSecrets {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ClustertrackError;
    use crate::fs::mock::MockFileSystem;

    #[test]
    fn stage_writes_private_files_and_drop_removes_them() {
        let fs = MockFileSystem::new();
        let run_dir = Path::new("/boot/run-1");

        {
            let staged = StagedSecrets::stage(
                Arc::new(fs.clone()),
                run_dir,
                &[Secret::new("ssh_key", "KEY"), Secret::new("password", "pw")],
            )
            .unwrap();

            let key = fs.file("/boot/run-1/ssh_key.secret").unwrap();
            assert!(key.private);
            assert_eq!(key.contents, b"KEY");
            assert_eq!(
                staged.env()[0],
                ("CLUSTERTRACK_SECRET_SSH_KEY".to_string(), "/boot/run-1/ssh_key.secret".to_string())
            );
        }

        assert!(fs.paths().is_empty());
    }

    #[test]
    fn cleanup_is_idempotent() {
        let fs = MockFileSystem::new();
        let mut staged =
            StagedSecrets::stage(Arc::new(fs.clone()), Path::new("/r"), &[Secret::new("k", "v")]).unwrap();

        staged.cleanup();
        assert!(staged.is_empty());
        staged.cleanup();
        drop(staged);

        assert!(fs.paths().is_empty());
    }

    #[test]
    fn unsafe_names_are_rejected_before_anything_is_written() {
        let fs = MockFileSystem::new();

        let err = StagedSecrets::stage(
            Arc::new(fs.clone()),
            Path::new("/boot/run-1"),
            &[Secret::new("ssh_key", "KEY"), Secret::new("../../../root/key", "K")],
        )
        .unwrap_err();

        assert!(matches!(err, ClustertrackError::ConfigError(_)));
        assert!(fs.paths().is_empty());
    }

    #[test]
    fn secret_contents_are_not_debug_printed() {
        let rendered = format!("{:?}", Secret::new("k", "hunter2"));
        assert!(!rendered.contains("hunter2"));
    }
}
