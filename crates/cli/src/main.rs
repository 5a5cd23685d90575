mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use photosync_core::{ExistenceCheck, SyncConfig};
use tracing_subscriber::EnvFilter;

/// photosync: ingest photo folders into an object store and a day-album index
#[derive(Parser)]
#[command(name = "photosync", version, about)]
struct Cli {
    /// Path to the TOML configuration file (defaults apply when it is missing)
    #[arg(long, short, global = true, default_value = "photosync.toml")]
    config: PathBuf,

    /// Log at debug level unless PHOTOSYNC_LOG or RUST_LOG says otherwise
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync a source directory: records, originals, thumbnails and medium images
    Sync {
        /// Source directory (overrides `source_dir` from the config)
        #[arg(long)]
        source: Option<PathBuf>,
        /// Clear the metadata store before syncing
        #[arg(long)]
        erase: bool,
        /// Number of files processed at once
        #[arg(long)]
        concurrency: Option<usize>,
        /// Check each object with its own request instead of one bucket listing
        #[arg(long)]
        probe: bool,
    },
    /// List day albums, most recent first
    Albums,
    /// Print the photos of one or more albums as JSON
    Photos {
        /// Album keys: epoch seconds or YYYY-MM-DD
        #[arg(required = true, num_args = 1..)]
        albums: Vec<String>,
    },
    /// Show a summary of the metadata store
    Status,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env("PHOTOSYNC_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = SyncConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Commands::Sync {
            source,
            erase,
            concurrency,
            probe,
        } => {
            if let Some(source) = source {
                config.source_dir = Some(source);
            }
            if let Some(concurrency) = concurrency {
                config.concurrency = concurrency;
            }
            if probe {
                config.existence_check = ExistenceCheck::Probe;
            }
            commands::sync::run(&config, erase)?
        }
        Commands::Albums => commands::albums::run(&config)?,
        Commands::Photos { albums } => commands::photos::run(&config, &albums)?,
        Commands::Status => commands::status::run(&config)?,
    }

    Ok(())
}
