//! The static repository table
//!
//! Maps each package name to the git remote it is mirrored from and the
//! revision to serve. Entries are immutable; everything derived from a
//! resolution lives with the pipeline, not here.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Literal that selects the moving reference.
pub const MOVING_REFERENCE: &str = "HEAD";

/// Stands in for `/` inside revision specs so branch names with slashes
/// still yield a flat cache key (`release---1.x` checks out `release/1.x`).
pub const REF_SEPARATOR_PLACEHOLDER: &str = "---";

/// The revision a package is served at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RevisionSpec {
    /// The newest commit of the remote's default branch, re-resolved on
    /// every request.
    #[default]
    Moving,
    /// A branch, tag or commit, used as the resolved revision verbatim.
    Fixed(String),
}

impl RevisionSpec {
    /// Whether this is the moving reference.
    pub fn is_moving(&self) -> bool {
        matches!(self, RevisionSpec::Moving)
    }

    /// Spec as written, which is also its cache key form.
    pub fn as_str(&self) -> &str {
        match self {
            RevisionSpec::Moving => MOVING_REFERENCE,
            RevisionSpec::Fixed(reference) => reference,
        }
    }

    /// Reference name to hand to git, with placeholders turned back into
    /// `/`. `None` for the moving reference, which has no single name.
    pub fn checkout_name(&self) -> Option<String> {
        match self {
            RevisionSpec::Moving => None,
            RevisionSpec::Fixed(reference) => {
                Some(reference.replace(REF_SEPARATOR_PLACEHOLDER, "/"))
            }
        }
    }
}

impl FromStr for RevisionSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidRevision {
                message: "revision must not be empty".into(),
            });
        }
        if s.contains('/') {
            return Err(Error::InvalidRevision {
                message: format!(
                    "'{s}' contains '/'; write it as '{}'",
                    s.replace('/', REF_SEPARATOR_PLACEHOLDER)
                ),
            });
        }
        if s == MOVING_REFERENCE {
            Ok(RevisionSpec::Moving)
        } else {
            Ok(RevisionSpec::Fixed(s.to_string()))
        }
    }
}

impl TryFrom<String> for RevisionSpec {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<RevisionSpec> for String {
    fn from(spec: RevisionSpec) -> Self {
        spec.as_str().to_string()
    }
}

impl fmt::Display for RevisionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One mirrored package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryEntry {
    /// Registry package name
    pub name: String,
    /// Anything git can clone: URL, scp-style address or local path
    pub remote: String,
    /// Revision to serve
    pub revision: RevisionSpec,
}

impl RepositoryEntry {
    pub fn new(name: impl Into<String>, remote: impl Into<String>, revision: RevisionSpec) -> Self {
        Self {
            name: name.into(),
            remote: remote.into(),
            revision,
        }
    }
}

/// All mirrored packages, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct RepositoryTable {
    entries: BTreeMap<String, RepositoryEntry>,
    // cache stem -> owning package name
    stems: BTreeMap<String, String>,
}

impl RepositoryTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry.
    ///
    /// # Errors
    ///
    /// Fails when the name is already present, is unusable as a cache
    /// file name component, or would share its working copy directory with
    /// another entry.
    pub fn insert(&mut self, entry: RepositoryEntry) -> Result<()> {
        mirror_fs::validate_path_identifier(&entry.name)?;
        if self.entries.contains_key(&entry.name) {
            return Err(Error::DuplicatePackage { name: entry.name });
        }
        let stem = mirror_fs::entry_stem(&entry.name, entry.revision.as_str())?;
        if let Some(other) = self.stems.get(&stem) {
            return Err(Error::CachePathCollision {
                name: entry.name,
                other: other.clone(),
                stem,
            });
        }
        self.stems.insert(stem, entry.name.clone());
        self.entries.insert(entry.name.clone(), entry);
        Ok(())
    }

    /// Add one entry per name, each at `<base><name><suffix>`.
    pub fn insert_group(
        &mut self,
        base: &str,
        suffix: &str,
        names: &[String],
        revision: &RevisionSpec,
    ) -> Result<()> {
        for name in names {
            let remote = format!("{base}{name}{suffix}");
            self.insert(RepositoryEntry::new(name.clone(), remote, revision.clone()))?;
        }
        Ok(())
    }

    /// Look up an entry by package name.
    pub fn get(&self, name: &str) -> Option<&RepositoryEntry> {
        self.entries.get(name)
    }

    /// Whether `name` is mirrored.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = &RepositoryEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
