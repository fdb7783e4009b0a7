//! Names shared by every cache entry.

/// Extension of archive files in the cache root.
pub const ARCHIVE_EXTENSION: &str = "tgz";

/// Top-level directory inside every archive.
pub const ARCHIVE_PREFIX: &str = "package/";

/// Manifest file read from working copies.
pub const MANIFEST_FILE: &str = "package.json";

/// Directory under the cache root holding per-package lock files.
pub const LOCK_DIR: &str = ".locks";

/// Directory under the cache root for in-progress clones and archives.
pub const STAGING_DIR: &str = ".staging";
