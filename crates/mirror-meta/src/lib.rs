//! Repository table and configuration for git-registry-mirror.
//!
//! The table maps package names to git remotes and revision specs. It is
//! built once at startup, from code or from a config file, and never
//! changes afterwards.

pub mod config;
pub mod error;
pub mod registry;

pub use config::{MirrorConfig, MirrorOptions, PackageGroup, PackageSource};
pub use error::{Error, Result};
pub use registry::{RepositoryEntry, RepositoryTable, RevisionSpec};
