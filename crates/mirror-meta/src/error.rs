//! Error types for mirror-meta

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Filesystem error: {0}")]
    Fs(#[from] mirror_fs::Error),

    #[error("Invalid configuration at {path}: {message}")]
    InvalidConfig { path: PathBuf, message: String },

    #[error("Package '{name}' is declared more than once")]
    DuplicatePackage { name: String },

    #[error("Packages '{name}' and '{other}' both map to cache entry '{stem}'")]
    CachePathCollision {
        name: String,
        other: String,
        stem: String,
    },

    #[error("Invalid revision spec: {message}")]
    InvalidRevision { message: String },
}
