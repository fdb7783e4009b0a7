//! Error types for mirror-core

use std::path::PathBuf;

/// Result type for mirror-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed cause of an archive failure
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while serving a package.
///
/// Every variant identifies the stage that failed; see [`Error::stage`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Name is not in the repository table
    #[error("Unknown package: {name}")]
    UnknownPackage { name: String },

    /// Clone or fetch failed
    #[error("Failed to sync {name}: {source}")]
    Sync {
        name: String,
        #[source]
        source: mirror_git::Error,
    },

    /// The requested revision could not be checked out
    #[error("Failed to check out '{revision}' for {name}: {source}")]
    Checkout {
        name: String,
        revision: String,
        #[source]
        source: mirror_git::Error,
    },

    /// The checked-out commit could not be identified
    #[error("Failed to resolve the revision of {name}: {source}")]
    Resolution {
        name: String,
        #[source]
        source: mirror_git::Error,
    },

    /// `package.json` is missing, unreadable or malformed
    #[error("Invalid manifest at {path}: {message}")]
    Manifest { path: PathBuf, message: String },

    /// The archive could not be written
    #[error("Failed to create archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    /// An artifact the pipeline reported as present is missing
    #[error("Cache integrity error: expected archive missing at {path}")]
    CacheIntegrity { path: PathBuf },

    /// The pipeline did not finish within the configured limit
    #[error("Pipeline for {name} did not finish within {seconds}s")]
    Timeout { name: String, seconds: u64 },

    /// An internal host pattern is not a valid regex
    #[error("Invalid internal host pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// The blocking pipeline task panicked or was cancelled
    #[error("Pipeline worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    /// Filesystem error from mirror-fs
    #[error(transparent)]
    Fs(#[from] mirror_fs::Error),

    /// Configuration error from mirror-meta
    #[error(transparent)]
    Meta(#[from] mirror_meta::Error),
}

impl Error {
    /// Name of the pipeline stage that produced this error.
    pub fn stage(&self) -> &'static str {
        match self {
            Error::UnknownPackage { .. } => "lookup",
            Error::Sync { .. } => "sync",
            Error::Checkout { .. } => "checkout",
            Error::Resolution { .. } => "resolve",
            Error::Manifest { .. } => "manifest",
            Error::Archive { .. } => "archive",
            Error::CacheIntegrity { .. } => "cache",
            Error::Timeout { .. } | Error::Worker(_) => "pipeline",
            Error::InvalidPattern { .. } | Error::Meta(_) => "config",
            Error::Fs(_) => "filesystem",
        }
    }

    pub(crate) fn manifest(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Manifest {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn archive(path: impl Into<PathBuf>, source: impl Into<BoxError>) -> Self {
        Self::Archive {
            path: path.into(),
            source: source.into(),
        }
    }
}
