//! List mirrored packages

use std::path::Path;

use colored::Colorize;
use mirror_meta::MirrorConfig;

use crate::error::Result;

/// Run the list command
pub fn run_list(config: &Path) -> Result<()> {
    let (_, table) = MirrorConfig::load(config)?.into_parts()?;

    if table.is_empty() {
        println!("No packages configured in {}", config.display());
        return Ok(());
    }

    println!("{}", "Mirrored Packages".bold());
    println!();
    for entry in table.iter() {
        println!(
            "  {:<24} {:<16} {}",
            entry.name.green(),
            entry.revision.to_string().cyan(),
            entry.remote.dimmed()
        );
    }
    Ok(())
}
