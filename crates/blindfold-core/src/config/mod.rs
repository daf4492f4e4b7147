//! Configuration management for Blindfold.
//!
//! Configuration is loaded from the platform config directory (falling back to
//! `~/.blindfold/config.toml`). Every section has defaults, so a missing file
//! or a partial file is fine.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use crate::pipeline::ScrubberConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure for Blindfold.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Bulk processing settings
    pub processing: ProcessingConfig,

    /// Resource limits
    pub limits: LimitsConfig,

    /// Face detection settings
    pub detection: DetectionConfig,

    /// Report output settings
    pub output: OutputConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// - macOS: ~/Library/Application Support/com.blindfold.blindfold/config.toml
    /// - Linux: ~/.config/blindfold/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\blindfold\config\config.toml
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "blindfold", "blindfold")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".blindfold").join("config.toml")
            })
    }

    /// Get the resolved model directory path (with ~ expansion).
    pub fn model_dir(&self) -> PathBuf {
        expand(&self.general.model_dir)
    }

    /// Resolved path of the face cascade asset.
    pub fn cascade_path(&self) -> PathBuf {
        match &self.detection.cascade_path {
            Some(path) => expand(path),
            None => self.model_dir().join(DEFAULT_CASCADE_FILE),
        }
    }

    /// Everything a single scrubbing worker needs, detached from the rest of
    /// the configuration so it can be shipped to worker processes.
    pub fn scrubber_config(&self) -> ScrubberConfig {
        ScrubberConfig {
            limits: self.limits.clone(),
            cascade_path: self.cascade_path(),
        }
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

fn expand(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&path_str).into_owned())
}
