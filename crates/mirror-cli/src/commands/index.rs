//! Print registry documents

use std::path::Path;

use crate::commands::load_mirror;
use crate::error::Result;

/// Run the index command
pub async fn run_index(config: &Path, name: &str) -> Result<()> {
    let mirror = load_mirror(config)?;
    let descriptor = mirror.get_index(name).await?;
    println!("{}", serde_json::to_string_pretty(&descriptor)?);
    Ok(())
}

/// Run the full-index command
pub async fn run_full_index(config: &Path, name: &str) -> Result<()> {
    let mirror = load_mirror(config)?;
    let document = mirror.get_full_index(name).await?;
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}
