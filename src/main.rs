//! blocktail - Log-Tailing Address Blocker for Linux Hosts

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use blocktail::cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Execute command
    match cli.command {
        Commands::Run { patterns } => blocktail::commands::run::run(patterns, &cli.config),
        Commands::Sweep => blocktail::commands::sweep::run(&cli.config),
        Commands::Status => blocktail::commands::status::run(&cli.config),
        Commands::Check { address } => blocktail::commands::check::run(&address, &cli.config),
        Commands::Forget { address } => blocktail::commands::forget::run(&address, &cli.config),
        Commands::Version => {
            println!("blocktail {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
