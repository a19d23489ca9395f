//! CLI argument definitions using clap.
//!
//! Commands:
//! - aerosync stress [--config <path>] [--json] [--verbose]
//! - aerosync verify [--data-dir <path>]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// aerosync - group commit synchronization core for write-ahead logging
#[derive(Parser, Debug)]
#[command(name = "aerosync")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run concurrent committers against one log and report contention
    Stress {
        /// Path to configuration file (built-in defaults when omitted)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print the final report as JSON on stdout
        #[arg(long)]
        json: bool,

        /// Emit per-flush TRACE log lines
        #[arg(long)]
        verbose: bool,
    },

    /// Verify commit log framing and checksums
    Verify {
        /// Data directory containing log/commit.log
        #[arg(long, default_value = "./aerosync-data")]
        data_dir: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
