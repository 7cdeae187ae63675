//! # easy-sync
//!
//! Command-line client for an easy-sync LAN server.
//!
//! ## Commands
//!
//! - `pair`: Pair this device with the server
//! - `chat`: Join the live chat
//! - `status`: Show identity and connection status
//! - `logout`: Forget the session token
//! - `devices`: List devices known to the server
//!
//! ## Example
//!
//! ```bash
//! # Pair automatically, or with a code shown by the server
//! easy-sync --server http://192.168.1.20:3280 pair
//! easy-sync pair --code 4F2A9C
//!
//! # Chat
//! easy-sync chat
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use easysync_client::SyncClient;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{chat, devices, logout, pair, status};

/// Command-line client for an easy-sync LAN server.
#[derive(Parser, Debug)]
#[command(name = "easy-sync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory for credentials and configuration
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Server base URL (overrides the config file)
    #[arg(long, global = true)]
    server: Option<String>,

    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pair this device with the server
    Pair {
        /// Pairing code to submit instead of fetching one automatically
        #[arg(long, short)]
        code: Option<String>,
    },

    /// Join the live chat
    Chat,

    /// Show identity and connection status
    Status,

    /// Forget the session token
    Logout,

    /// List devices known to the server
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };
    config::prepare_data_dir(&data_dir).await?;

    let config = config::load(cli.config.as_deref(), &data_dir, cli.server.as_deref())?;
    let client = SyncClient::open(config, &data_dir).context("Failed to start client")?;

    let result = match cli.command {
        Commands::Pair { code } => pair::run(&client, code.as_deref()).await,
        Commands::Chat => chat::run(&client).await,
        Commands::Status => status::run(&client).await,
        Commands::Logout => logout::run(&client).await,
        Commands::Devices => devices::run(&client).await,
    };

    client.shutdown().await;
    result
}

/// Log to stderr; `RUST_LOG` overrides the default filter.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("easysync=info,easy_sync=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Get the default data directory for easy-sync.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "easy-sync", "easy-sync")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
