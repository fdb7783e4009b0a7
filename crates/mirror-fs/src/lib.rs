//! Cache store for git-registry-mirror
//!
//! Provides the deterministic cache layout, identifier validation,
//! archive digests, cross-process lock files and config loading.

pub mod checksum;
pub mod config;
pub mod constants;
pub mod error;
pub mod io;
pub mod layout;
pub mod path;

pub use checksum::ArchiveDigest;
pub use config::{ConfigFormat, ConfigStore};
pub use error::{Error, Result};
pub use io::CacheLock;
pub use layout::{CacheLayout, entry_stem};
pub use path::{encode_component, validate_path_identifier};
