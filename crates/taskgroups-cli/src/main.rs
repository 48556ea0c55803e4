//! Taskgroups icon tool - diagnostic front end for the icon engine.
//!
//! Resolves icons, composes grid icons and inspects the cache from a shell,
//! using the same data directory the launcher uses.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use taskgroups_core::{EngineConfig, IconEngine, IconEngineBuilder, StaticNamespace};
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "taskgroups-icons")]
#[command(about = "Resolve and cache icons for Taskgroups launchers")]
struct Args {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Data directory (defaults to the per-user data directory)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// JSON file listing installed packaged apps
    #[arg(long)]
    apps: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the icon path for a launch target
    Resolve {
        /// Path, URL or packaged app id
        target: String,

        /// Re-extract even when a cached icon exists
        #[arg(long)]
        force: bool,

        /// Treat the target as a packaged app id
        #[arg(long)]
        aumid: bool,
    },
    /// Compose icons into an N x N grid icon
    Grid {
        /// Grid dimension (2 or 3)
        dimension: u32,

        /// Member icons, in cell order
        #[arg(required = true)]
        icons: Vec<PathBuf>,

        /// Write to this path instead of the grids directory
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Write a grayscale copy of an icon
    Gray {
        icon: PathBuf,
    },
    /// Print engine statistics as JSON
    Stats,
    /// Remove stale cache entries and orphaned icons
    Prune,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let mut builder = match args.data_dir {
        Some(dir) => IconEngine::builder(dir),
        None => IconEngineBuilder::from_config(EngineConfig::user_default()?),
    };
    if let Some(apps) = &args.apps {
        let json = std::fs::read_to_string(apps)?;
        builder = builder.with_namespace(StaticNamespace::from_json(&json)?);
    }
    let engine = builder.build()?;
    debug!("Data directory: {}", engine.config().data_dir.display());

    let outcome = commands::run(&engine, args.command).await;

    // Persist whatever the command resolved, even if it failed.
    engine.shutdown().await?;
    outcome
}
