// src/fs/mock.rs

use super::FileSystem;
use anyhow::{Result, anyhow};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// In-memory filesystem for tests.
///
/// Clones share state, so a test can keep one handle for assertions while
/// the ledger owns another.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>,
    dirs: Arc<Mutex<HashSet<PathBuf>>>,
    counter: Arc<AtomicU64>,
    fail_writes: Arc<AtomicBool>,
    fail_removals: Arc<AtomicBool>,
    removals: Arc<Mutex<Vec<PathBuf>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path.as_ref()).cloned()
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().unwrap().len()
    }

    pub fn has_dir(&self, path: impl AsRef<Path>) -> bool {
        self.dirs.lock().unwrap().contains(path.as_ref())
    }

    /// Every path passed to a successful `remove_file`, in call order.
    pub fn removals(&self) -> Vec<PathBuf> {
        self.removals.lock().unwrap().clone()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_removals(&self, fail: bool) {
        self.fail_removals.store(fail, Ordering::SeqCst);
    }
}

impl FileSystem for MockFileSystem {
    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let mut dirs = self.dirs.lock().unwrap();
        for ancestor in path.ancestors() {
            if !ancestor.as_os_str().is_empty() {
                dirs.insert(ancestor.to_path_buf());
            }
        }
        Ok(())
    }

    fn write_unique(
        &self,
        dir: &Path,
        prefix: &str,
        suffix: &str,
        contents: &[u8],
    ) -> Result<PathBuf> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("mock: write into {:?} refused", dir));
        }
        if !self.has_dir(dir) {
            return Err(anyhow!("mock: directory {:?} does not exist", dir));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let path = dir.join(format!("{prefix}{n:06}{suffix}"));
        self.files
            .lock()
            .unwrap()
            .insert(path.clone(), contents.to_vec());
        Ok(path)
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        if self.fail_removals.load(Ordering::SeqCst) {
            return Err(anyhow!("mock: removal of {:?} refused", path));
        }
        match self.files.lock().unwrap().remove(path) {
            Some(_) => {
                self.removals.lock().unwrap().push(path.to_path_buf());
                Ok(())
            }
            None => Err(anyhow!("mock: file not found {:?}", path)),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path) || self.has_dir(path)
    }
}
