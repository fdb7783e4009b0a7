//! Revision resolution
//!
//! Brings the working copy for an entry into existence, synchronizes it as
//! the revision spec requires and checks the requested revision out.

use std::fs;

use mirror_fs::CacheLayout;
use mirror_git::{Oid, WorkingCopy};
use mirror_meta::{RepositoryEntry, RevisionSpec};

use crate::error::{Error, Result};

/// A working copy with the requested revision checked out.
#[derive(Debug)]
pub struct Checkout {
    pub working_copy: WorkingCopy,
    /// The fixed spec literal, or the commit id for the moving reference
    pub resolved_revision: String,
    pub commit: Oid,
    pub cloned: bool,
    pub probed: bool,
    pub fetched: bool,
}

/// Resolve `entry` to a concrete commit in its working copy.
///
/// # Errors
///
/// [`Error::Sync`] when cloning or fetching fails, [`Error::Checkout`]
/// when the reference does not exist, [`Error::Resolution`] when the
/// checked-out commit cannot be read back.
pub fn resolve(entry: &RepositoryEntry, layout: &CacheLayout) -> Result<Checkout> {
    let name = entry.name.as_str();
    let path = layout.working_copy_path(name, entry.revision.as_str())?;
    let sync_err = |source| Error::Sync {
        name: name.to_string(),
        source,
    };

    let cloned = !WorkingCopy::exists(&path);
    let working_copy = if cloned {
        if path.exists() {
            tracing::warn!(package = %name, path = %path.display(), "Removing cache directory that is not a working copy");
            fs::remove_dir_all(&path).map_err(|e| mirror_fs::Error::io(&path, e))?;
        }
        tracing::info!(package = %name, remote = %entry.remote, "Cloning repository");
        WorkingCopy::clone_into(&entry.remote, &path, layout).map_err(sync_err)?
    } else {
        WorkingCopy::open(&path).map_err(sync_err)?
    };

    let mut probed = false;
    let mut fetched = false;
    if entry.revision.is_moving() && !cloned {
        probed = true;
        if working_copy.remote_changed().map_err(sync_err)? {
            tracing::info!(package = %name, "Fetching remote changes");
            working_copy.fetch_all().map_err(sync_err)?;
            fetched = true;
        } else {
            tracing::debug!(package = %name, "Remote unchanged, skipping fetch");
        }
    }

    let checkout_err = |source| Error::Checkout {
        name: name.to_string(),
        revision: entry.revision.to_string(),
        source,
    };
    let commit = match entry.revision.checkout_name() {
        None => working_copy.checkout_latest().map_err(checkout_err)?,
        Some(reference) => match working_copy.checkout(&reference) {
            Ok(commit) => commit,
            Err(mirror_git::Error::ReferenceNotFound { .. }) if !cloned && !fetched => {
                tracing::info!(package = %name, reference = %reference, "Reference not found locally, fetching");
                working_copy.fetch_all().map_err(sync_err)?;
                fetched = true;
                working_copy.checkout(&reference).map_err(checkout_err)?
            }
            Err(e) => return Err(checkout_err(e)),
        },
    };
    tracing::info!(package = %name, revision = %entry.revision, commit = %commit, "Checked out");

    let resolved_revision = match &entry.revision {
        RevisionSpec::Moving => working_copy
            .head_id()
            .map_err(|source| Error::Resolution {
                name: name.to_string(),
                source,
            })?
            .to_string(),
        RevisionSpec::Fixed(spec) => spec.clone(),
    };

    Ok(Checkout {
        working_copy,
        resolved_revision,
        commit,
        cloned,
        probed,
        fetched,
    })
}
