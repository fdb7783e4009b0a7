//! Shared test utilities for the git-registry-mirror workspace.
//!
//! Dev-dependency only, never published.
//!
//! # Modules
//!
//! - [`git`]: "remote" repositories the mirror can clone from a local path
//! - [`manifest`]: `package.json` builders

pub mod git;
pub mod manifest;

pub use git::RemoteRepo;
pub use manifest::package_manifest;
