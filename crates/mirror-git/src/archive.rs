//! Gzipped tarballs of a commit's tree
//!
//! Equivalent to `git archive --format=tar --prefix=<prefix> <commit> | gzip`
//! with one addition: files can be replaced by in-memory overlays, which is
//! how rewritten manifests get into archives without touching the working
//! copy. Output is deterministic for a given commit and overlay set: entries
//! follow tree order and carry the commit time as mtime.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;
use git2::{ObjectType, Oid, Tree};
use tar::{EntryType, Header};

use crate::{Error, Result, WorkingCopy};

const MODE_SYMLINK: i32 = 0o120000;
const MODE_EXECUTABLE: i32 = 0o100755;

/// Replacement contents keyed by repository-relative path.
pub type ArchiveOverlay = BTreeMap<String, Vec<u8>>;

struct TarWriter<'o, W: Write> {
    builder: tar::Builder<GzEncoder<W>>,
    prefix: String,
    mtime: u64,
    overlays: &'o ArchiveOverlay,
    applied: BTreeSet<String>,
}

impl<W: Write> TarWriter<'_, W> {
    fn append_file(&mut self, rel: &str, content: &[u8], mode: u32) -> Result<()> {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(content.len() as u64);
        header.set_mode(mode);
        header.set_mtime(self.mtime);
        self.builder
            .append_data(&mut header, format!("{}{rel}", self.prefix), content)
            .map_err(Error::ArchiveWrite)
    }

    fn append_symlink(&mut self, rel: &str, target: &[u8]) -> Result<()> {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Symlink);
        header.set_size(0);
        header.set_mode(0o777);
        header.set_mtime(self.mtime);
        let target = String::from_utf8_lossy(target).into_owned();
        self.builder
            .append_link(&mut header, format!("{}{rel}", self.prefix), target)
            .map_err(Error::ArchiveWrite)
    }

    fn append_tree(&mut self, wc: &WorkingCopy, tree: &Tree<'_>, dir: &str) -> Result<()> {
        let repo = wc.repository();
        let overlays = self.overlays;
        for entry in tree.iter() {
            let name = String::from_utf8_lossy(entry.name_bytes());
            let rel = if dir.is_empty() {
                name.into_owned()
            } else {
                format!("{dir}/{name}")
            };

            match entry.kind() {
                Some(ObjectType::Tree) => {
                    let subtree = repo.find_tree(entry.id())?;
                    self.append_tree(wc, &subtree, &rel)?;
                }
                Some(ObjectType::Blob) => {
                    let filemode = entry.filemode();
                    let mode = if filemode == MODE_EXECUTABLE { 0o755 } else { 0o644 };

                    if let Some(content) = overlays.get(&rel) {
                        self.append_file(&rel, content, mode)?;
                        self.applied.insert(rel);
                        continue;
                    }

                    let blob = repo.find_blob(entry.id())?;
                    if filemode == MODE_SYMLINK {
                        self.append_symlink(&rel, blob.content())?;
                    } else {
                        self.append_file(&rel, blob.content(), mode)?;
                    }
                }
                _ => tracing::debug!(path = %rel, "Skipping submodule entry"),
            }
        }
        Ok(())
    }
}

impl WorkingCopy {
    /// Write a gzipped tarball of `commit` to `out`, every entry under
    /// `prefix`, and return the writer once the gzip stream is finished.
    ///
    /// Overlay paths missing from the tree are appended as new files.
    pub fn write_archive<W: Write>(
        &self,
        commit: Oid,
        prefix: &str,
        overlays: &ArchiveOverlay,
        out: W,
    ) -> Result<W> {
        let commit = self.repository().find_commit(commit)?;
        let tree = commit.tree()?;

        let mut writer = TarWriter {
            builder: tar::Builder::new(GzEncoder::new(out, Compression::default())),
            prefix: prefix.to_string(),
            mtime: u64::try_from(commit.time().seconds()).unwrap_or(0),
            overlays,
            applied: BTreeSet::new(),
        };

        writer.append_tree(self, &tree, "")?;

        let missing: Vec<(&String, &Vec<u8>)> = overlays
            .iter()
            .filter(|(path, _)| !writer.applied.contains(*path))
            .collect();
        for (path, content) in missing {
            writer.append_file(path, content, 0o644)?;
        }

        let encoder = writer.builder.into_inner().map_err(Error::ArchiveWrite)?;
        encoder.finish().map_err(Error::ArchiveWrite)
    }
}
