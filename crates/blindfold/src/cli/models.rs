//! The `blindfold models` command for managing the face classifier.

use clap::{Args, Subcommand};
use blindfold_core::pipeline::{Cascade, Hasher};
use blindfold_core::Config;
use std::path::{Path, PathBuf};

/// Arguments for the `models` command.
#[derive(Args, Debug)]
pub struct ModelsArgs {
    #[command(subcommand)]
    pub command: ModelsCommand,
}

/// Subcommands for classifier management.
#[derive(Subcommand, Debug)]
pub enum ModelsCommand {
    /// Download the frontal face Haar cascade
    Download {
        /// Replace an existing classifier
        #[arg(long)]
        force: bool,
    },

    /// Show whether the classifier is installed and loadable
    List,

    /// Show the classifier path
    Path,
}

/// OpenCV's stock frontal face cascade.
const CASCADE_URL: &str = "https://raw.githubusercontent.com/opencv/opencv/4.x/data/haarcascades/haarcascade_frontalface_default.xml";

/// State of the classifier file on disk.
#[derive(Debug)]
pub enum CascadeStatus {
    Ready { stages: usize },
    Invalid(String),
    Missing,
}

/// Check the classifier at `path` by loading it.
pub fn check_installed(path: &Path) -> CascadeStatus {
    if !path.exists() {
        return CascadeStatus::Missing;
    }
    match Cascade::load(path) {
        Ok(cascade) => CascadeStatus::Ready {
            stages: cascade.stage_count(),
        },
        Err(e) => CascadeStatus::Invalid(e.to_string()),
    }
}

/// Execute the models command.
pub async fn execute(args: ModelsArgs, config: Config) -> anyhow::Result<()> {
    let dest = config.cascade_path();

    match args.command {
        ModelsCommand::Download { force } => {
            if dest.exists() && !force {
                tracing::info!("Classifier already exists at {:?} (use --force to replace)", dest);
                return Ok(());
            }
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }

            tracing::info!("Downloading frontal face classifier...");
            tracing::info!("  Source: {}", CASCADE_URL);
            tracing::info!("  Destination: {:?}", dest);

            let client = reqwest::Client::new();
            let partial = partial_path(&dest);
            download_file(&client, CASCADE_URL, &partial).await?;
            let stages = verify_cascade(&partial)?;
            std::fs::rename(&partial, &dest)?;

            tracing::info!("  Classifier ready ({} stages)", stages);
        }

        ModelsCommand::List => match check_installed(&dest) {
            CascadeStatus::Ready { stages } => {
                println!("  - {:40} ready ({} stages)", display_name(&dest), stages);
            }
            CascadeStatus::Invalid(reason) => {
                println!("  - {:40} invalid: {}", display_name(&dest), reason);
                println!("Run `blindfold models download --force` to replace it.");
            }
            CascadeStatus::Missing => {
                println!("  - {:40} not installed", display_name(&dest));
                println!("Run `blindfold models download` to fetch it.");
            }
        },

        ModelsCommand::Path => {
            println!("{}", dest.display());
        }
    }

    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Download a file from a URL to a local path, streaming to disk.
async fn download_file(client: &reqwest::Client, url: &str, dest: &Path) -> anyhow::Result<()> {
    use futures_util::StreamExt;
    use tokio::io::AsyncWriteExt;

    let response = client
        .get(url)
        .send()
        .await?
        .error_for_status()
        .map_err(|e| anyhow::anyhow!("Download failed: {e}"))?;

    if let Some(size) = response.content_length() {
        tracing::info!("  Size: {:.1} KB", size as f64 / 1024.0);
    }

    let mut file = tokio::fs::File::create(dest).await?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                drop(file);
                let _ = std::fs::remove_file(dest);
                return Err(e.into());
            }
        };
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(())
}

/// Make sure a downloaded file parses as a usable cascade.
///
/// On failure, removes the file so the next run re-downloads.
fn verify_cascade(path: &Path) -> anyhow::Result<usize> {
    let cascade = match Cascade::load(path) {
        Ok(cascade) => cascade,
        Err(e) => {
            let _ = std::fs::remove_file(path);
            anyhow::bail!(
                "Downloaded classifier is not usable: {}\nFile removed, try downloading again.",
                e
            );
        }
    };

    let hash = Hasher::content_hash(path)
        .map_err(|e| anyhow::anyhow!("Hash computation failed for {}: {e}", path.display()))?;
    tracing::debug!("  BLAKE3: {}", hash);
    Ok(cascade.stage_count())
}
