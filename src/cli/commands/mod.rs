//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod init;
mod refresh;
mod reset;
mod settings;
mod status;
mod tile;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::config::{Config, Settings};
use crate::controller::Controller;
use crate::scheduler::HttpTileSource;

#[derive(Parser)]
#[command(name = "tilekeeper")]
#[command(about = "Discover and continuously refresh map tiles for a region")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory (overrides config file)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Region GeoJSON file (overrides config file)
    #[arg(long, global = true)]
    region: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Prepare the database and discover tiles inside the region
    Init {
        /// Re-run discovery even if tiles already exist
        #[arg(short, long)]
        force: bool,
        /// Only prepare the database
        #[arg(long)]
        database_only: bool,
    },

    /// Fetch stale and never-fetched tiles until done (Ctrl-C stops)
    Refresh {
        /// Maximum tiles to process (overrides maxTilesToProcess)
        #[arg(short, long)]
        limit: Option<u64>,
    },

    /// Show run state and progress statistics
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show or change refresh settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },

    /// Print information about a stored tile or write its bytes to a file
    Tile {
        x: u32,
        y: u32,
        z: u8,
        /// Write the tile content to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete all tile records so discovery can start over
    Reset {
        /// Confirm the reset
        #[arg(long)]
        confirm: bool,
    },
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Show current settings
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Update settings, e.g. `set batchSize=500 zoomLevels=[14,15]`
    Set {
        /// key=value pairs; values are parsed as JSON when possible
        #[arg(required = true)]
        pairs: Vec<String>,
    },
}

async fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let config = match cli.config {
        Some(ref path) => Config::load_from_path(path)
            .await
            .map_err(anyhow::Error::msg)?,
        None => Config::load().await,
    };
    let mut settings = config.to_settings();

    if let Some(ref data_dir) = cli.data_dir {
        if config.region.is_none() {
            settings.region_path = data_dir.join(crate::config::DEFAULT_REGION_FILENAME);
        }
        settings.data_dir = data_dir.clone();
    }
    if let Some(ref region) = cli.region {
        settings.region_path = region.clone();
    }
    Ok(settings)
}

async fn open_controller(settings: &Settings) -> anyhow::Result<Controller> {
    settings.ensure_directories()?;
    let source = HttpTileSource::new(
        &settings.tile_url,
        settings.request_timeout(),
        Some(&settings.user_agent),
    )?;
    Ok(Controller::open(settings, Arc::new(source)).await?)
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli).await?;
    let controller = open_controller(&settings).await?;

    match cli.command {
        Commands::Init {
            force,
            database_only,
        } => init::cmd_init(&controller, &settings, force, database_only).await,
        Commands::Refresh { limit } => refresh::cmd_refresh(&controller, limit).await,
        Commands::Status { json } => status::cmd_status(&controller, json).await,
        Commands::Settings { command } => match command {
            SettingsCommands::Show { json } => settings::cmd_settings_show(&controller, json).await,
            SettingsCommands::Set { pairs } => settings::cmd_settings_set(&controller, &pairs).await,
        },
        Commands::Tile { x, y, z, output } => {
            tile::cmd_tile(&controller, x, y, z, output.as_deref()).await
        }
        Commands::Reset { confirm } => reset::cmd_reset(&controller, confirm).await,
    }
}
