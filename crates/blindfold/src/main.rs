//! Blindfold CLI - strip metadata and blur faces from images.
//!
//! Every scrubbed image is re-encoded without EXIF/XMP/ICC data, and any
//! frontal face found by the Haar cascade is Gaussian-blurred.
//!
//! # Usage
//!
//! ```bash
//! # Fetch the face classifier once
//! blindfold models download
//!
//! # Scrub one image (writes scrubbed_photo.jpg)
//! blindfold scrub photo.jpg
//!
//! # Count faces and list metadata without writing anything
//! blindfold scrub photo.jpg --dry-run
//!
//! # Scrub a directory on worker processes
//! blindfold bulk ./photos -o ./clean --strategy processes
//! ```

use clap::{Parser, Subcommand};

mod cli;
mod logging;

/// Blindfold - strip metadata and blur faces from images.
#[derive(Parser, Debug)]
#[command(name = "blindfold")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Scrub a single image
    Scrub(cli::scrub::ScrubArgs),

    /// Scrub many images in parallel, keeping failed items unchanged
    Bulk(cli::bulk::BulkArgs),

    /// Manage the face classifier (download, list, path)
    Models(cli::models::ModelsArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),

    /// Serve scrub requests on stdin/stdout for a bulk run
    #[command(hide = true)]
    Worker,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't up yet, so config warnings go straight to stderr.
    let config = match blindfold_core::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `blindfold config path`."
            );
            blindfold_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("Blindfold v{}", blindfold_core::VERSION);

    match cli.command {
        Commands::Scrub(args) => cli::scrub::execute(args, config).await,
        Commands::Bulk(args) => cli::bulk::execute(args, config).await,
        Commands::Models(args) => cli::models::execute(args, config).await,
        Commands::Config(args) => cli::config::execute(args).await,
        Commands::Worker => cli::worker::execute().await,
    }
}
