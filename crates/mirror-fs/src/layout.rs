//! Deterministic cache layout
//!
//! Every artifact the mirror produces lives at a path computed purely from
//! `(name, revision, root)`:
//!
//! ```text
//! <root>/<name>-<revisionSpec>/        working copy
//! <root>/<name>-<resolvedRevision>.tgz archive
//! <root>/.locks/<name>.lock            cross-process lock
//! <root>/.staging/                     in-progress clones and archives
//! ```

use std::path::{Path, PathBuf};

use crate::constants::{ARCHIVE_EXTENSION, LOCK_DIR, STAGING_DIR};
use crate::{Result, encode_component};

/// Cache root and the path functions derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    /// Create a layout rooted at `root`. Nothing is created on disk.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The cache root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Working copy directory for `name` checked out at `revision`.
    ///
    /// Callers pass the revision *spec*, so a moving reference keeps a
    /// single working copy that is re-fetched on every request.
    pub fn working_copy_path(&self, name: &str, revision: &str) -> Result<PathBuf> {
        Ok(self.root.join(entry_stem(name, revision)?))
    }

    /// Archive file for `name` at the resolved `revision`.
    pub fn archive_path(&self, name: &str, revision: &str) -> Result<PathBuf> {
        let file = format!("{}.{}", entry_stem(name, revision)?, ARCHIVE_EXTENSION);
        Ok(self.root.join(file))
    }

    /// Lock file guarding every pipeline run for `name`.
    pub fn lock_path(&self, name: &str) -> Result<PathBuf> {
        Ok(self
            .root
            .join(LOCK_DIR)
            .join(format!("{}.lock", encode_component(name)?)))
    }

    /// Scratch directory for clones and archives that are not yet complete.
    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }
}

/// File name stem shared by the working copy and archive of an entry.
///
/// Both components are encoded separately and joined with `-`, so two
/// different pairs can produce the same stem (`a-b` at `c` and `a` at
/// `b-c`). The repository table refuses entries whose stems collide.
pub fn entry_stem(name: &str, revision: &str) -> Result<String> {
    Ok(format!(
        "{}-{}",
        encode_component(name)?,
        encode_component(revision)?
    ))
}
