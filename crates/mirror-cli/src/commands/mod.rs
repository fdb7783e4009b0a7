//! Command implementations

mod index;
mod list;
mod tarball;

pub use index::{run_full_index, run_index};
pub use list::run_list;
pub use tarball::run_tarball;

use std::path::Path;

use mirror_core::Mirror;
use mirror_meta::MirrorConfig;

use crate::error::Result;

/// Load `config` and build a mirror from it.
pub fn load_mirror(config: &Path) -> Result<Mirror> {
    let (options, table) = MirrorConfig::load(config)?.into_parts()?;
    tracing::debug!(
        config = %config.display(),
        packages = table.len(),
        cache_root = %options.cache_root.display(),
        "Loaded mirror"
    );
    Ok(Mirror::new(table, options)?)
}
