//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// git-mirror - Serve git repositories as npm packages
#[derive(Parser, Debug)]
#[command(name = "git-mirror")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Mirror config file (TOML, JSON or YAML)
    #[arg(
        short,
        long,
        global = true,
        env = "GIT_MIRROR_CONFIG",
        default_value = "mirror.toml"
    )]
    pub config: PathBuf,

    /// The command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// List mirrored packages with their remotes and revisions
    List,

    /// Print the descriptor of a package's current revision as JSON
    Index {
        /// Package name
        name: String,
    },

    /// Print the registry index document of a package as JSON
    FullIndex {
        /// Package name
        name: String,
    },

    /// Write a package's archive to a file, or to stdout
    ///
    /// Examples:
    ///   git-mirror tarball web-config -o web-config.tgz
    ///   git-mirror tarball web-config | tar tz
    Tarball {
        /// Package name
        name: String,

        /// Output file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}
