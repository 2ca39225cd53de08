// src/fs/mod.rs

//! Scratch filesystem access.
//!
//! The ledger talks to a [`FileSystem`] instead of `std::fs` directly so that
//! unit tests can run against [`mock::MockFileSystem`] and inject failures.

use std::fmt::Debug;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub mod ledger;
pub mod mock;

pub use ledger::{ResourceRole, TempResourceLedger};

/// Abstract filesystem interface for the scratch directory.
pub trait FileSystem: Send + Sync + Debug {
    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Write `contents` into a new file in `dir` whose name starts with
    /// `prefix`, ends with `suffix` and does not collide with an existing
    /// file. Returns the full path.
    fn write_unique(&self, dir: &Path, prefix: &str, suffix: &str, contents: &[u8])
    -> Result<PathBuf>;

    fn remove_file(&self, path: &Path) -> Result<()>;

    fn exists(&self, path: &Path) -> bool;
}

/// Implementation that uses `std::fs` and `tempfile` for unique names.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).with_context(|| format!("creating dir {:?}", path))
    }

    fn write_unique(
        &self,
        dir: &Path,
        prefix: &str,
        suffix: &str,
        contents: &[u8],
    ) -> Result<PathBuf> {
        let mut file = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .tempfile_in(dir)
            .with_context(|| format!("creating scratch file in {:?}", dir))?;
        file.write_all(contents)
            .with_context(|| format!("writing scratch file {:?}", file.path()))?;
        file.flush()
            .with_context(|| format!("flushing scratch file {:?}", file.path()))?;

        // The job process opens the file by name, so it must outlive the handle.
        let (_file, path) = file
            .keep()
            .with_context(|| format!("keeping scratch file in {:?}", dir))?;
        Ok(path)
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).with_context(|| format!("removing file {:?}", path))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_write_unique_creates_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let fs = RealFileSystem;

        let a = fs.write_unique(dir.path(), "in-", ".jpg", b"one").unwrap();
        let b = fs.write_unique(dir.path(), "in-", ".jpg", b"two").unwrap();

        assert_ne!(a, b);
        assert_eq!(std::fs::read(&a).unwrap(), b"one");
        assert!(a.file_name().unwrap().to_string_lossy().starts_with("in-"));
        assert!(a.extension().is_some_and(|ext| ext == "jpg"));

        fs.remove_file(&a).unwrap();
        assert!(!fs.exists(&a));
        assert!(fs.remove_file(&a).is_err());
    }
}
