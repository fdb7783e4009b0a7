//! git-mirror CLI
//!
//! Resolves mirrored git repositories and prints their registry documents
//! or writes their archives.

mod cli;
mod commands;
mod error;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use error::Result;

/// Filter used when `RUST_LOG` is unset
const DEFAULT_FILTER: &str = "mirror=info";
const VERBOSE_FILTER: &str = "mirror=debug";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::List => commands::run_list(&cli.config),
        Commands::Index { name } => commands::run_index(&cli.config, &name).await,
        Commands::FullIndex { name } => commands::run_full_index(&cli.config, &name).await,
        Commands::Tarball { name, output } => {
            commands::run_tarball(&cli.config, &name, output.as_deref()).await
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
    tracing::debug!("Verbose mode enabled");
}
