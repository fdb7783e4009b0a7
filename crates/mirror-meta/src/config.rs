//! Mirror options and the config file schema
//!
//! ```toml
//! cache_root = "/var/cache/git-mirror"
//! registry_url = "http://localhost:5080"
//! internal_hosts = ['git@stash\.example\.com']
//!
//! [packages.alpha]
//! remote = "ssh://git@stash.example.com/has/alpha.git"
//! revision = "HEAD"
//!
//! [[groups]]
//! base = "ssh://git@stash.example.com:7999/has/"
//! packages = ["web-config", "web-data-queue"]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mirror_fs::ConfigStore;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::registry::{RepositoryEntry, RepositoryTable, RevisionSpec};

/// Process-wide settings of the mirror. Can be replaced at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorOptions {
    /// Directory holding working copies, archives and lock files
    pub cache_root: PathBuf,
    /// Base URL that `dist.tarball` links are built from
    pub registry_url: String,
    /// Regex patterns; a dependency constraint matching one of them points
    /// at an internal repository
    pub internal_hosts: Vec<String>,
    /// Upper bound on one pipeline run, unbounded when absent
    pub pipeline_timeout_secs: Option<u64>,
}

impl Default for MirrorOptions {
    fn default() -> Self {
        Self {
            cache_root: dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("git-mirror"),
            registry_url: "http://localhost:5080".to_string(),
            internal_hosts: Vec::new(),
            pipeline_timeout_secs: None,
        }
    }
}

impl MirrorOptions {
    /// Options with everything default except the cache root.
    pub fn with_cache_root(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
            ..Self::default()
        }
    }

    /// `registry_url` without trailing slashes.
    pub fn registry_base(&self) -> &str {
        self.registry_url.trim_end_matches('/')
    }

    pub fn pipeline_timeout(&self) -> Option<Duration> {
        self.pipeline_timeout_secs.map(Duration::from_secs)
    }
}

/// A single package declared by remote location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSource {
    pub remote: String,
    #[serde(default)]
    pub revision: RevisionSpec,
}

/// Packages sharing a remote prefix, declared by name only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageGroup {
    /// Prefix of every remote in the group
    pub base: String,
    /// Appended after the name
    #[serde(default = "default_suffix")]
    pub suffix: String,
    #[serde(default)]
    pub revision: RevisionSpec,
    pub packages: Vec<String>,
}

fn default_suffix() -> String {
    ".git".to_string()
}

/// Contents of a mirror config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorConfig {
    #[serde(flatten)]
    pub options: MirrorOptions,
    #[serde(default)]
    pub packages: BTreeMap<String, PackageSource>,
    #[serde(default)]
    pub groups: Vec<PackageGroup>,
}

impl MirrorConfig {
    /// Load a config file; format is chosen by extension.
    pub fn load(path: &Path) -> Result<Self> {
        let config: MirrorConfig = ConfigStore::new().load(path)?;
        if config.options.registry_url.trim().is_empty() {
            return Err(Error::InvalidConfig {
                path: path.to_path_buf(),
                message: "registry_url must not be empty".into(),
            });
        }
        tracing::debug!(
            path = %path.display(),
            packages = config.packages.len(),
            groups = config.groups.len(),
            "Loaded mirror config"
        );
        Ok(config)
    }

    /// Split into runtime options and the repository table.
    ///
    /// # Errors
    ///
    /// Fails when a name is declared twice across `packages` and `groups`.
    pub fn into_parts(self) -> Result<(MirrorOptions, RepositoryTable)> {
        let mut table = RepositoryTable::new();
        for (name, source) in self.packages {
            table.insert(RepositoryEntry::new(name, source.remote, source.revision))?;
        }
        for group in &self.groups {
            table.insert_group(&group.base, &group.suffix, &group.packages, &group.revision)?;
        }
        Ok((self.options, table))
    }
}
