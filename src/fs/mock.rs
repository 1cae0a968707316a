// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockFile {
    pub contents: Vec<u8>,
    pub private: bool,
}

#[derive(Debug, Default)]
struct MockState {
    files: HashMap<PathBuf, MockFile>,
    dirs: HashSet<PathBuf>,
    unreadable: HashSet<PathBuf>,
}

/// In-memory filesystem shared between clones.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    state: Arc<Mutex<MockState>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        self.lock().files.insert(
            path.as_ref().to_path_buf(),
            MockFile {
                contents: content.into(),
                private: false,
            },
        );
    }

    /// Make every read of `path` fail until [`MockFileSystem::clear_failures`].
    pub fn fail_reads(&self, path: impl AsRef<Path>) {
        self.lock().unreadable.insert(path.as_ref().to_path_buf());
    }

    pub fn clear_failures(&self) {
        self.lock().unreadable.clear();
    }

    pub fn file(&self, path: impl AsRef<Path>) -> Option<MockFile> {
        self.lock().files.get(path.as_ref()).cloned()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.lock().files.keys().cloned().collect();
        paths.sort();
        paths
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, path: &Path, contents: &[u8], private: bool) {
        self.lock().files.insert(
            path.to_path_buf(),
            MockFile {
                contents: contents.to_vec(),
                private,
            },
        );
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let state = self.lock();
        if state.unreadable.contains(path) {
            return Err(anyhow!("Permission denied: {:?}", path));
        }
        match state.files.get(path) {
            Some(file) => String::from_utf8(file.contents.clone())
                .map_err(|e| anyhow!("Invalid UTF-8: {}", e)),
            None if state.dirs.contains(path) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.insert(path, contents, false);
        Ok(())
    }

    fn write_private(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.insert(path, contents, true);
        Ok(())
    }

    fn append(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let mut state = self.lock();
        state
            .files
            .entry(path.to_path_buf())
            .or_insert_with(|| MockFile {
                contents: Vec::new(),
                private: false,
            })
            .contents
            .extend_from_slice(contents);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        let state = self.lock();
        state.files.contains_key(path) || state.dirs.contains(path)
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        match self.lock().files.remove(path) {
            Some(_) => Ok(()),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let mut state = self.lock();
        for ancestor in path.ancestors() {
            if !ancestor.as_os_str().is_empty() {
                state.dirs.insert(ancestor.to_path_buf());
            }
        }
        Ok(())
    }
}
