// src/fs/ledger.rs

//! Job-scoped scratch files.
//!
//! The ledger materializes a job's input images inside the scratch directory
//! (shared with the container) and remembers which paths belong to which job
//! generation. Releasing a generation deletes its files exactly once; any
//! later release of the same generation or path is a no-op.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::FileSystem;
use crate::types::JobId;

/// Name of the folder inside the scratch directory the job writes results to.
pub const OUTPUT_DIR_NAME: &str = "output";

/// What a scratch file is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceRole {
    Input,
    Style,
}

impl fmt::Display for ResourceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceRole::Input => write!(f, "input"),
            ResourceRole::Style => write!(f, "style"),
        }
    }
}

#[derive(Debug)]
pub struct TempResourceLedger {
    fs: Arc<dyn FileSystem>,
    scratch_dir: PathBuf,
    live: BTreeMap<JobId, Vec<PathBuf>>,
}

impl TempResourceLedger {
    pub fn new(fs: Arc<dyn FileSystem>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            scratch_dir: scratch_dir.into(),
            live: BTreeMap::new(),
        }
    }

    /// Create the scratch directory and its `output/` folder.
    pub fn prepare(&self) -> Result<()> {
        self.fs
            .create_dir_all(&self.output_dir())
            .with_context(|| format!("preparing scratch directory {:?}", self.scratch_dir))
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub fn output_dir(&self) -> PathBuf {
        self.scratch_dir.join(OUTPUT_DIR_NAME)
    }

    /// Persist `bytes` as a new scratch file owned by `job`.
    pub fn create(&mut self, job: JobId, role: ResourceRole, bytes: &[u8]) -> Result<PathBuf> {
        self.fs.create_dir_all(&self.scratch_dir)?;
        let prefix = format!("dream-{}-{role}-", job.0);
        let path = self
            .fs
            .write_unique(&self.scratch_dir, &prefix, ".jpg", bytes)
            .with_context(|| format!("saving {role} image for {job}"))?;

        debug!(%job, %role, path = %path.display(), bytes = bytes.len(), "scratch file created");
        self.live.entry(job).or_default().push(path.clone());
        Ok(path)
    }

    /// Delete `path` if it exists. Failures are logged and swallowed.
    pub fn release(&self, path: &Path) {
        if path.as_os_str().is_empty() || !self.fs.exists(path) {
            return;
        }
        match self.fs.remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "scratch file deleted"),
            Err(err) => warn!(
                path = %path.display(),
                error = %err,
                "failed to delete scratch file; leaving it behind"
            ),
        }
    }

    /// Release every live path of `job`. Returns how many paths were
    /// released; `0` when the generation was already released.
    pub fn release_job(&mut self, job: JobId) -> usize {
        let Some(paths) = self.live.remove(&job) else {
            return 0;
        };
        for path in &paths {
            self.release(path);
        }
        paths.len()
    }

    pub fn live_paths(&self, job: JobId) -> &[PathBuf] {
        self.live.get(&job).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of live paths across all generations.
    pub fn live_count(&self) -> usize {
        self.live.values().map(Vec::len).sum()
    }
}
