//! perksync CLI
//!
//! Command-line tools for perksync snapshots and a local demo.
//!
//! # Commands
//!
//! - `inspect` - Print the records of a moa skin snapshot
//! - `verify` - Check snapshot records against an entitlement set
//! - `demo` - Run a server and clients in-process

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// perksync command-line tools.
#[derive(Parser)]
#[command(name = "perksync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the records of a moa skin snapshot
    Inspect {
        /// Snapshot file
        snapshot: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check snapshot records against an entitlement set
    Verify {
        /// Snapshot file
        snapshot: PathBuf,

        /// Entitlement every user holds (repeatable)
        #[arg(short, long)]
        entitlement: Vec<String>,

        /// Supporter tier every user holds
        #[arg(short, long, default_value = "0")]
        tier: u8,

        /// Rewrite the snapshot without the failing records
        #[arg(long)]
        prune: bool,
    },

    /// Run a server and clients in-process
    Demo {
        /// Number of clients
        #[arg(short, long, default_value = "3")]
        clients: u8,

        /// Checkpoint the server to this snapshot file
        #[arg(short, long)]
        snapshot: Option<PathBuf>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { snapshot, format } => {
            commands::inspect::run(&snapshot, &format)?;
        }
        Commands::Verify {
            snapshot,
            entitlement,
            tier,
            prune,
        } => {
            commands::verify::run(&snapshot, &entitlement, tier, prune)?;
        }
        Commands::Demo { clients, snapshot } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(commands::demo::run(clients, snapshot))?;
        }
        Commands::Version => {
            println!("perksync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!(
                "perksync protocol v{}",
                perksync_protocol::PROTOCOL_VERSION
            );
        }
    }

    Ok(())
}
