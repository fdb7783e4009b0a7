//! Error types for mirror-cli

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// Errors that can occur in CLI operations
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Error from the mirror pipeline
    #[error(transparent)]
    Core(#[from] mirror_core::Error),

    /// Error loading the config
    #[error(transparent)]
    Meta(#[from] mirror_meta::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Output could not be serialized
    #[error("Failed to render output: {0}")]
    Json(#[from] serde_json::Error),
}
