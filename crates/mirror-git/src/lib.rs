//! Git plumbing for git-registry-mirror
//!
//! Wraps `git2` with the handful of operations the mirror pipeline needs:
//! staged clones, remote probing, fetching, detached checkouts and
//! tree-to-tarball archiving.

pub mod archive;
pub mod error;
pub mod working_copy;

pub use archive::ArchiveOverlay;
pub use error::{Error, Result};
pub use git2::Oid;
pub use working_copy::WorkingCopy;
