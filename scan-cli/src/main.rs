//! # didi-scan
//!
//! Offline-first ticket scanner for event controllers.
//!
//! Scans are validated against the ticket authority when it is reachable
//! and queued on disk when it is not. Queued scans are replayed in order by
//! `sync`, or automatically by `watch` when the authority comes back.
//!
//! ## Commands
//!
//! - `login` / `logout`: Open or close a controller session
//! - `scan`: Validate one payload, or one per line with `--stdin`
//! - `queue`: List scans waiting to sync
//! - `sync`: Replay the queue now
//! - `watch`: Replay the queue whenever the authority comes back
//! - `status`: Show session, authority and queue state
//! - `history` / `stats`: Recent scans and controller counts
//!
//! ## Example
//!
//! ```bash
//! didi-scan login awa
//! didi-scan scan DIDI-0042
//! didi-scan scan '{"id":"DIDI-0043"}'
//! zbarcam --raw | didi-scan scan --stdin
//! didi-scan sync
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{history, login, queue, scan, status, sync, watch, App};

/// Offline-first ticket scanner.
#[derive(Parser, Debug)]
#[command(name = "didi-scan")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory for the session, queue and config
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file (default: didi-scan.toml in the data directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Log in as a controller
    Login {
        /// Account name
        username: String,

        /// Password (will prompt if not provided)
        #[arg(long, short)]
        password: Option<String>,
    },

    /// Forget the stored session (queued scans are kept)
    Logout,

    /// Validate a ticket payload
    Scan {
        /// Scanned payload: a ticket id, a bare number or a JSON object
        #[arg(required_unless_present = "stdin")]
        payload: Option<String>,

        /// Read one payload per line from stdin until EOF or Ctrl+C
        #[arg(long, conflicts_with = "payload")]
        stdin: bool,
    },

    /// List scans waiting to sync
    Queue,

    /// Replay queued scans now
    Sync,

    /// Replay queued scans whenever the authority comes back
    Watch,

    /// Show session, authority and queue status
    Status,

    /// Show recent scans
    History {
        /// Maximum number of entries
        #[arg(long, default_value = "50")]
        limit: u32,
    },

    /// Show scan counts for the logged-in controller
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Determine data directory
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    // Ensure data directory exists
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;
    config::set_dir_permissions_0700(&data_dir).await?;

    let config = config::load(cli.config.as_deref(), &data_dir)?;
    let app = App::open(&data_dir, config).await?;

    match cli.command {
        Commands::Login { username, password } => {
            login::run(&app, &username, password.as_deref()).await?;
        }
        Commands::Logout => {
            login::logout(&app).await?;
        }
        Commands::Scan { payload, stdin } => {
            scan::run(&app, payload, stdin).await?;
        }
        Commands::Queue => {
            queue::run(&app).await?;
        }
        Commands::Sync => {
            sync::run(&app).await?;
        }
        Commands::Watch => {
            watch::run(&app).await?;
        }
        Commands::Status => {
            status::run(&app).await?;
        }
        Commands::History { limit } => {
            history::run(&app, limit).await?;
        }
        Commands::Stats => {
            history::stats_command(&app).await?;
        }
    }

    Ok(())
}

/// Log to stderr so command output on stdout stays clean.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Get the default data directory for didi-scan.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("app", "didi-events", "didi-scan")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
