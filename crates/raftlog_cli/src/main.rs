//! raftlog CLI
//!
//! Command-line tools for inspecting and maintaining raftlog journals.
//!
//! # Commands
//!
//! - `inspect` - Display segment metadata and index ranges
//! - `verify` - Check segment files for corruption without modifying them
//! - `compact` - Delete segments before an index
//! - `dump` - Print entries for debugging

mod commands;
mod error;

use clap::{Parser, Subcommand};
use raftlog_core::{DEFAULT_MAX_ENTRY_SIZE, DEFAULT_NAME};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// raftlog command-line journal tools.
#[derive(Parser)]
#[command(name = "raftlog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the journal directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Journal name (segment file prefix)
    #[arg(global = true, short, long, default_value = DEFAULT_NAME)]
    name: String,

    /// Maximum entry size the journal was written with
    #[arg(global = true, long, default_value_t = DEFAULT_MAX_ENTRY_SIZE)]
    max_entry_size: usize,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display segment metadata and index ranges
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check segment files for corruption
    Verify,

    /// Delete every segment before the one holding an index
    Compact {
        /// Index to compact up to
        #[arg(short, long)]
        index: u64,

        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Print entries for debugging
    Dump {
        /// First index to print
        #[arg(long, default_value = "1")]
        from: u64,

        /// Maximum number of entries to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let target = |command: &str| -> Result<commands::Target, String> {
        let path = cli
            .path
            .clone()
            .ok_or_else(|| format!("Journal path required for {command}"))?;
        Ok(commands::Target {
            path,
            name: cli.name.clone(),
            max_entry_size: cli.max_entry_size,
        })
    };

    match &cli.command {
        Commands::Inspect { format } => {
            commands::inspect::run(&target("inspect")?, format)?;
        }
        Commands::Verify => {
            commands::verify::run(&target("verify")?)?;
        }
        Commands::Compact { index, dry_run } => {
            commands::compact::run(&target("compact")?, *index, *dry_run)?;
        }
        Commands::Dump {
            from,
            limit,
            format,
        } => {
            commands::dump::run(&target("dump")?, *from, *limit, format)?;
        }
        Commands::Version => {
            println!("raftlog CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("raftlog Core v{}", raftlog_core::VERSION);
            println!(
                "Segment format v{}",
                raftlog_core::segment::DESCRIPTOR_VERSION
            );
        }
    }

    Ok(())
}
