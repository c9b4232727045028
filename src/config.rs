//! Configuration file support for the leaderboard
//!
//! Reads from .leaderboard/config.toml, creating it with placeholder values
//! when it does not exist yet.

use crate::gerrit::DEFAULT_PORT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Configuration structure
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    /// Gerrit connection and sync settings
    #[serde(default)]
    pub fetch: FetchConfig,
}

/// Where to fetch changes from and how far back to go
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    /// Gerrit server hostname
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// SSH user whose public key is installed on the server
    #[serde(default = "default_username")]
    pub username: String,

    /// Gerrit SSH port
    /// Default: 29418
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum number of days of history to pull
    /// Default: 180
    #[serde(default = "default_max_days")]
    pub maxdays: i64,
}

fn default_hostname() -> String {
    "gerrit.myhost.com".to_string()
}

fn default_username() -> String {
    "gerritleaderboard".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_max_days() -> i64 {
    180
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            username: default_username(),
            port: default_port(),
            maxdays: default_max_days(),
        }
    }
}

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl Config {
    /// Load config from the default location, creating it if missing
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load config from `path`, creating a default file there if missing
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            warn!(
                "Configuration file {} not found, creating a default one",
                path.display()
            );
            Self::default().write_to(path)?;
        }

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        info!(
            "Loaded hostname: {} username: {} port: {} max_days: {} from {}",
            config.fetch.hostname,
            config.fetch.username,
            config.fetch.port,
            config.fetch.maxdays,
            path.display()
        );
        Ok(config)
    }

    /// Write this config as TOML, creating parent directories
    pub fn write_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source: std::io::Error| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
        }
        let contents = toml::to_string(self)?;
        std::fs::write(path, contents).map_err(io_err)
    }

    /// Config location: LEADERBOARD_CONFIG, else .leaderboard/config.toml
    /// found by walking up the directory tree, else one in the current
    /// directory
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("LEADERBOARD_CONFIG") {
            return PathBuf::from(path);
        }
        Self::find_config_path().unwrap_or_else(|| PathBuf::from(".leaderboard").join("config.toml"))
    }

    fn find_config_path() -> Option<PathBuf> {
        let current_dir = std::env::current_dir().ok()?;
        let mut dir = current_dir.as_path();

        loop {
            let config_path = dir.join(".leaderboard").join("config.toml");
            if config_path.exists() {
                return Some(config_path);
            }

            match dir.parent() {
                Some(parent) => dir = parent,
                None => break,
            }
        }
        None
    }
}
