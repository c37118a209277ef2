//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "blocktail")]
#[command(author, version, about = "Log-tailing address blocker for Linux hosts")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "/etc/blocktail/config.yaml", global = true)]
    pub config: PathBuf,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug output)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Tail the configured log files and maintain block records
    Run {
        /// Glob patterns overriding the configured ones
        patterns: Vec<String>,
    },

    /// Run one sweep pass over the store and print the counters
    Sweep,

    /// List the store's block records
    Status,

    /// Show the record for one address
    Check {
        /// Address to look up
        address: String,
    },

    /// Delete the record for one address
    Forget {
        /// Address to forget
        address: String,
    },

    /// Print version
    Version,
}
