//! The `blindfold config` command for configuration management.

use clap::{Args, Subcommand};
use blindfold_core::Config;
use std::path::Path;

use super::models::{check_installed, CascadeStatus};

/// Arguments for the `config` command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Subcommands for configuration management.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,

    /// Show config file path
    Path,

    /// Initialize a new config file with defaults
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },

    /// Validate the config file and check that the classifier loads
    Check,
}

/// Execute the config command.
pub async fn execute(args: ConfigArgs) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Show => {
            let config = Config::load()?;
            println!("{}", config.to_toml()?);
        }

        ConfigCommand::Path => {
            println!("{}", Config::default_path().display());
        }

        ConfigCommand::Init { force } => {
            let path = Config::default_path();
            init_config(&path, force)?;
            tracing::info!("Config file created at: {}", path.display());
            println!("Configuration initialized at: {}", path.display());
        }

        ConfigCommand::Check => {
            let path = Config::default_path();
            let config = check_config(&path)?;
            let cascade = config.cascade_path();
            match check_installed(&cascade) {
                CascadeStatus::Ready { stages } => {
                    println!("Config OK; classifier ready ({} stages)", stages);
                }
                CascadeStatus::Invalid(reason) => {
                    anyhow::bail!("Classifier at {} is invalid: {}", cascade.display(), reason);
                }
                CascadeStatus::Missing => {
                    anyhow::bail!(
                        "Config OK, but no classifier at {}\n  Run `blindfold models download`.",
                        cascade.display()
                    );
                }
            }
        }
    }

    Ok(())
}

/// Write a default config to `path`, refusing to clobber one unless `force`.
fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists at: {}\nUse --force to overwrite.",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, Config::default().to_toml()?)?;
    Ok(())
}

/// Parse and validate the config at `path`; a missing file means defaults.
fn check_config(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() {
        println!("No config file at {}; using defaults", path.display());
        return Ok(Config::default());
    }
    let config = Config::load_from(path)
        .map_err(|e| anyhow::anyhow!("{}: {}", path.display(), e))?;
    println!("Config file {} is valid", path.display());
    Ok(config)
}
