//! Snapshot archives
//!
//! An archive is the checked-out commit's tree under `package/`, with the
//! rewritten manifest swapped in. It is assembled in the staging directory
//! and moved to its final path only if nothing is there yet.

use std::io::{BufWriter, Write};
use std::path::Path;

use mirror_fs::constants::{ARCHIVE_PREFIX, MANIFEST_FILE};
use mirror_fs::{CacheLayout, io};
use mirror_git::ArchiveOverlay;

use crate::error::{Error, Result};
use crate::manifest::Manifest;
use crate::resolver::Checkout;
use crate::rewrite::DependencyRewriter;

/// Create the archive for `checkout` at `archive` unless it already exists.
///
/// Returns whether a new archive was written. The working copy is not
/// modified either way.
///
/// # Errors
///
/// [`Error::Manifest`] when `package.json` is missing or malformed, in
/// which case nothing is written; [`Error::Archive`] when writing fails.
pub fn ensure_archive(
    checkout: &Checkout,
    archive: &Path,
    layout: &CacheLayout,
    rewriter: &DependencyRewriter,
) -> Result<bool> {
    if archive.is_file() {
        tracing::debug!(path = %archive.display(), "Archive already exists");
        return Ok(false);
    }

    let working_copy = &checkout.working_copy;
    let mut manifest = Manifest::load(&working_copy.path().join(MANIFEST_FILE))?;
    let rewritten = manifest.rewrite_dependencies(rewriter);

    let mut overlay = ArchiveOverlay::new();
    overlay.insert(MANIFEST_FILE.to_string(), manifest.to_bytes()?);

    let mut staged = io::staging_file(layout).map_err(|e| Error::archive(archive, e))?;
    {
        let out = BufWriter::new(&mut staged);
        let mut out = working_copy
            .write_archive(checkout.commit, ARCHIVE_PREFIX, &overlay, out)
            .map_err(|e| Error::archive(archive, e))?;
        out.flush().map_err(|e| Error::archive(archive, e))?;
    }

    if !io::persist_new(staged, archive).map_err(|e| Error::archive(archive, e))? {
        tracing::warn!(path = %archive.display(), "Archive appeared while building; kept the existing one");
        return Ok(false);
    }

    tracing::info!(
        path = %archive.display(),
        commit = %checkout.commit,
        rewritten = rewritten.len(),
        "Archive created"
    );
    Ok(true)
}
