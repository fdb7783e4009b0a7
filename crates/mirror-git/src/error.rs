//! Error types for mirror-git

use std::path::PathBuf;

/// Result type for mirror-git operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in mirror-git operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Filesystem error: {0}")]
    Fs(#[from] mirror_fs::Error),

    #[error("Failed to clone {url}: {message}")]
    Clone { url: String, message: String },

    #[error("Failed to fetch from remote '{remote}': {message}")]
    Fetch { remote: String, message: String },

    #[error("Reference '{reference}' not found")]
    ReferenceNotFound { reference: String },

    #[error("No git working copy at {path}")]
    NotAWorkingCopy { path: PathBuf },

    #[error("Failed to write archive: {0}")]
    ArchiveWrite(#[source] std::io::Error),
}
