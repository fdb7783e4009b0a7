//! Lock files and staged creation of cache artifacts
//!
//! The cache has a single write discipline: an artifact is created only if
//! absent, and only while the package's lock is held. Artifacts are
//! assembled in the staging directory and moved into place in one rename,
//! so a crashed or failed run never leaves a partial entry behind.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tempfile::{NamedTempFile, TempDir};

use crate::{CacheLayout, Error, Result};

/// Exclusive advisory lock on a file, released on drop.
#[derive(Debug)]
pub struct CacheLock {
    file: File,
    path: PathBuf,
}

impl CacheLock {
    /// Block until the exclusive lock on `path` is acquired.
    ///
    /// Creates the lock file and its parent directory when missing.
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = open_lock_file(path)?;
        file.lock_exclusive().map_err(|_| Error::LockFailed {
            path: path.to_path_buf(),
        })?;
        tracing::trace!(path = %path.display(), "Acquired cache lock");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Acquire the lock only if nobody else holds it.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>> {
        let file = open_lock_file(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                file,
                path: path.to_path_buf(),
            })),
            Err(_) => Ok(None),
        }
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release cache lock");
        }
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| Error::io(path, e))
}

/// Create an empty temporary file in the staging directory.
///
/// The file is deleted on drop unless handed to [`persist_new`].
pub fn staging_file(layout: &CacheLayout) -> Result<NamedTempFile> {
    let dir = layout.staging_dir();
    fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
    tempfile::Builder::new()
        .prefix("archive-")
        .suffix(".part")
        .tempfile_in(&dir)
        .map_err(|e| Error::io(&dir, e))
}

/// Create an empty temporary directory in the staging directory.
///
/// Removed on drop unless moved into place with [`promote_dir`].
pub fn staging_dir(layout: &CacheLayout, label: &str) -> Result<TempDir> {
    let dir = layout.staging_dir();
    fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
    tempfile::Builder::new()
        .prefix(&format!("{label}-"))
        .tempdir_in(&dir)
        .map_err(|e| Error::io(&dir, e))
}

/// Move a completed staging file to `dest` without replacing anything.
///
/// Returns `false` when `dest` already existed; the staged file is then
/// discarded and the existing artifact left untouched.
pub fn persist_new(staged: NamedTempFile, dest: &Path) -> Result<bool> {
    staged
        .as_file()
        .sync_all()
        .map_err(|e| Error::io(staged.path(), e))?;

    match staged.persist_noclobber(dest) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(Error::io(dest, e.error)),
    }
}

/// Move a completed staging directory to `dest`.
///
/// `dest` must not exist yet; the caller checks that under the cache lock.
pub fn promote_dir(staged: TempDir, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    fs::rename(staged.path(), dest).map_err(|e| Error::io(dest, e))?;
    // The TempDir now points at a path that no longer exists; its drop is a no-op.
    drop(staged);
    Ok(())
}
