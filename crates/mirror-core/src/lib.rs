//! Core pipeline for git-registry-mirror
//!
//! Turns a repository table into npm registry responses:
//!
//! - **Resolver**: clone or synchronize the working copy and check the
//!   requested revision out
//! - **Archiver**: snapshot the checked-out tree into `package/`-prefixed
//!   gzipped tarballs, with internal dependencies rewritten
//! - **Metadata**: registry descriptors with suffixed versions and digests
//! - **Mirror**: the facade that serializes all of the above per package
//!
//! # Architecture
//!
//! ```text
//!                  mirror-cli
//!                      |
//!                 mirror-core
//!                      |
//!        +-------------+-------------+
//!        |             |             |
//!    mirror-fs    mirror-git    mirror-meta
//! ```
//!
//! # Example
//!
//! ```ignore
//! use mirror_core::Mirror;
//! use mirror_meta::MirrorConfig;
//!
//! async fn serve() -> mirror_core::Result<()> {
//!     let config = MirrorConfig::load("mirror.toml".as_ref())?;
//!     let (options, table) = config.into_parts()?;
//!     let mirror = Mirror::new(table, options)?;
//!     let index = mirror.get_full_index("web-config").await?;
//!     println!("{}", index.latest().unwrap_or_default());
//!     Ok(())
//! }
//! ```

pub mod archiver;
pub mod error;
pub mod index;
pub mod locks;
pub mod manifest;
pub mod metadata;
pub mod mirror;
pub mod resolver;
pub mod rewrite;

pub use error::{Error, Result};
pub use index::IndexDocument;
pub use manifest::{Dist, Manifest, PackageDescriptor};
pub use metadata::{KeepLocation, LocationRewrite};
pub use mirror::{ArchiveStream, Mirror, MirrorStats, PipelineReport, Resolution};
pub use rewrite::DependencyRewriter;
