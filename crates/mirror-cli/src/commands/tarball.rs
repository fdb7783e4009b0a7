//! Write package archives

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use futures::StreamExt;

use crate::commands::load_mirror;
use crate::error::Result;

/// Run the tarball command
pub async fn run_tarball(config: &Path, name: &str, output: Option<&Path>) -> Result<()> {
    let mirror = load_mirror(config)?;
    let mut stream = mirror.get_tarball(name).await?;

    let mut out: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(io::stdout().lock()),
    };

    let mut written = 0usize;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        out.write_all(&chunk)?;
        written += chunk.len();
    }
    out.flush()?;

    if let Some(path) = output {
        tracing::info!(package = %name, path = %path.display(), bytes = written, "Archive written");
    }
    Ok(())
}
