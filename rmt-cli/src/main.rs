//! # rmt
//!
//! Keep a local directory and a remote directory in sync.
//!
//! ## Commands
//!
//! - `mount`: pair a remote directory with a local one and fetch it
//! - `sync`: three-way sync one mount, or all of them
//! - `unmount`: final sync, then forget the mount and delete the local copy
//! - `status`: list mounts
//! - `reset`: delete the mount registry
//!
//! ## Example
//!
//! ```bash
//! rmt mount me@host:/srv/site ~/site
//! # ... edit files ...
//! rmt sync ~/site --dry-run
//! rmt sync ~/site
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{mount, reset, status, sync, unmount};
use config::{default_data_dir, App, Config};

/// Keep a local directory and a remote directory in sync.
#[derive(Parser, Debug)]
#[command(name = "rmt")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Directory holding the mount registry and config.toml
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging on stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Mount a remote directory locally
    Mount {
        /// Remote directory, `[user@]host:/path`
        remote: String,
        /// Local directory to create and fill
        local: PathBuf,
    },

    /// Sync a mount (all mounts if no path is given)
    Sync {
        /// Mounted local directory
        path: Option<PathBuf>,

        /// Show what would be synced without doing it
        #[arg(long)]
        dry_run: bool,

        /// Only pull remote → local (re-captures the base cache)
        #[arg(long, conflicts_with = "push")]
        pull: bool,

        /// Only push local → remote (re-captures the base cache)
        #[arg(long, conflicts_with = "pull")]
        push: bool,
    },

    /// Final sync, then unmount and delete the local copy
    Unmount {
        /// Mounted local directory
        path: PathBuf,

        /// Keep local files (and the base cache); skip the final sync
        #[arg(long)]
        keep: bool,

        /// Do not ask for confirmation
        #[arg(long, short)]
        yes: bool,
    },

    /// Show all mounts
    Status,

    /// Delete the mount registry (local files are kept)
    Reset {
        /// Do not ask for confirmation
        #[arg(long, short)]
        yes: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;

    tracing::debug!("Using data directory {}", data_dir.display());

    let config = Config::load(&data_dir).await?;
    tracing::debug!("Tools: {:?}", config.tools);
    let app = App::new(&data_dir, &config);

    let ok = match cli.command {
        Commands::Mount { remote, local } => {
            mount::run(&app, &remote, &local).await?;
            true
        }
        Commands::Sync {
            path,
            dry_run,
            pull,
            push,
        } => {
            let mode = sync::Mode::from_flags(pull, push);
            sync::run(&app, path.as_deref(), mode, dry_run).await?
        }
        Commands::Unmount { path, keep, yes } => unmount::run(&app, &path, keep, yes).await?,
        Commands::Status => {
            status::run(&app)?;
            true
        }
        Commands::Reset { yes } => {
            reset::run(&app, yes)?;
            true
        }
    };

    Ok(if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
