//! # reelhouse-cli
//!
//! Command-line interface for reelhouse archives.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reelhouse_core::Config;

mod commands;

/// Application context containing shared state.
pub struct AppContext {
    pub config: Config,
}

/// reelhouse - inspect and maintain session recordings
#[derive(Parser)]
#[command(name = "reelhouse")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show an archive's metadata, events and markers
    Inspect {
        /// Archive file
        path: PathBuf,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// List archives under the recording root
    List {
        /// Directory to list instead of the recording root
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
    /// Delete archives older than the retention window
    Sweep {
        /// Override retention.days
        #[arg(long)]
        days: Option<i64>,
        /// Only report what would be deleted
        #[arg(long)]
        dry_run: bool,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show version information
    Version,
    /// Diagnose installation issues
    Doctor,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Validate the configuration and report issues
    Validate,
    /// Print the configuration file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config, using defaults: {}", e);
        Config::default()
    });

    let ctx = AppContext { config };

    match cli.command {
        Commands::Inspect { path, json } => {
            commands::inspect::run(&path, json).await?;
        }
        Commands::List { dir } => {
            commands::list::run(&ctx, dir).await?;
        }
        Commands::Sweep { days, dry_run } => {
            commands::sweep::run(&ctx, days, dry_run).await?;
        }
        Commands::Config { action } => {
            commands::config::handle(action, &ctx).await?;
        }
        Commands::Version => {
            println!("reelhouse {}", env!("CARGO_PKG_VERSION"));
            println!("archive format {} v{}", reelhouse_archive::format::FORMAT_NAME, reelhouse_archive::format::FORMAT_VERSION);
        }
        Commands::Doctor => {
            commands::doctor::run(&ctx).await?;
        }
    }

    Ok(())
}
