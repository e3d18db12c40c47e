//! MediaTrack CLI - Event script replay and validation
//!
//! Features:
//! - Rule validation of tracker event scripts
//! - Replay through the real-time or offline delivery services
//! - Inspection of sessions persisted for offline reporting
//!
//! Scripts hold one JSON tracker event per line, for example
//! `{"name":"play","timestamp":1000}`. Blank lines and lines starting with
//! `#` are skipped.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

/// MediaTrack CLI - Media analytics tracking toolkit
#[derive(Parser)]
#[command(name = "mediatrack-cli")]
#[command(author = "Purple Squirrel Media")]
#[command(version)]
#[command(about = "Replay and validate media tracking event scripts", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json, table)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// JSON file with the shared tracking configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check every event of a script against the playback rules
    Validate {
        /// Path to the event script
        script: PathBuf,

        /// Track as downloaded content
        #[arg(long)]
        offline: bool,
    },

    /// Replay a script and deliver the generated hits
    Replay {
        /// Path to the event script
        script: PathBuf,

        /// SQLite database for offline sessions (in memory when omitted)
        #[arg(long)]
        db: Option<PathBuf>,

        /// Track as downloaded content and report whole sessions
        #[arg(long)]
        offline: bool,

        /// Seconds to wait for delivery to finish
        #[arg(short, long, default_value = "30")]
        timeout: u64,
    },

    /// List sessions persisted for offline reporting
    Pending {
        /// SQLite database holding the sessions
        #[arg(long)]
        db: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing, RUST_LOG wins over --verbose
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    mediatrack_core::init();

    match cli.command {
        Commands::Validate { script, offline } => {
            commands::validate(&script, offline, &cli.format)?;
        }
        Commands::Replay { script, db, offline, timeout } => {
            let state = commands::load_state(cli.config.as_deref())?;
            commands::replay(&script, state, db, offline, timeout, &cli.format).await?;
        }
        Commands::Pending { db } => {
            commands::pending(&db, &cli.format)?;
        }
    }

    Ok(())
}
