//! Tabula CLI
//!
//! Command-line tools for exercising the Tabula row cache.
//!
//! # Commands
//!
//! - `replay` - Run a JSON operation script through a cached table and
//!   report what reached the row store
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Tabula command-line cache tools.
#[derive(Parser)]
#[command(name = "tabula")]
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
    /// Replay an operation script against an in-memory row store
    Replay {
        /// Path to the JSON script
        script: PathBuf,

        /// Treat the table as having a generated identity key
        #[arg(short, long)]
        identity: bool,

        /// Refuse an insert over a pending update
        #[arg(short, long)]
        strict: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
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
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Replay {
            script,
            identity,
            strict,
            format,
        } => {
            commands::replay::run(&script, identity, strict, &format)?;
        }
        Commands::Version => {
            println!("Tabula CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Tabula Core v{}", tabula_core::VERSION);
        }
    }

    Ok(())
}
