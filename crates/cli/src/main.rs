//! Customer Atlas CLI - import, inspect and sync the customer collection.
//!
//! # Usage
//!
//! ```bash
//! # Show the collection (cloud copy first when Firestore is configured)
//! atlas load
//!
//! # Extract customers from spreadsheet photos and CSV files
//! atlas import sheet-1.jpg sheet-2.png clients.csv
//!
//! # Back up and restore
//! atlas export -o backup.json
//! atlas restore backup.json
//!
//! # Push everything to Firestore
//! atlas sync
//!
//! # Per-city counts
//! atlas stats
//!
//! # Delete everything
//! atlas clear --yes
//! ```
//!
//! Configuration comes from the environment (or `.env`); see
//! `customer_atlas_sync::config`. Set `ATLAS_LOG_FORMAT=json` for JSON logs.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "atlas")]
#[command(version, about = "Customer Atlas command-line tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and list the customer collection
    Load,
    /// Extract customers from spreadsheet photos or CSV files
    Import {
        /// Image (png, jpg, gif, webp) or CSV files, processed in order
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Write the collection to a JSON backup file
    Export {
        /// Output path (default: customers-<date>.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Merge a JSON backup file into the collection
    Restore {
        /// Backup file produced by `export`
        file: PathBuf,
    },
    /// Push the whole collection to the cloud store
    Sync,
    /// Delete every customer locally and in the cloud store
    Clear {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
    /// Show customer counts per city
    Stats,
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    let json = std::env::var("ATLAS_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let json_layer = json.then(|| tracing_subscriber::fmt::layer().json().flatten_event(true));
    let text_layer = (!json).then(|| tracing_subscriber::fmt::layer().with_target(false));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Load => commands::data::load().await?,
        Commands::Import { files } => commands::import::files(&files).await?,
        Commands::Export { output } => commands::data::export(output).await?,
        Commands::Restore { file } => commands::data::restore(&file).await?,
        Commands::Sync => commands::sync::now().await?,
        Commands::Clear { yes } => commands::data::clear(yes).await?,
        Commands::Stats => commands::data::stats().await?,
    }
    Ok(())
}
