//! On-disk configuration: where the chatbot service lives.

use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::utils::url::{derive_socket_url, normalize_base_url};

/// Errors that can occur when loading configuration from disk.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to parse the configuration file as valid TOML.
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "Failed to read config at {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "Failed to parse config at {}: {}", path.display(), source)
            }
        }
    }
}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP base URL of the chat service.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// WebSocket endpoint; derived from `api_base_url` when absent.
    #[serde(default)]
    pub socket_url: Option<String>,
}

fn default_api_base_url() -> String {
    "http://localhost:3000".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            socket_url: None,
        }
    }
}

impl Config {
    /// Load from the platform config dir, with `CAUSERIE_API_URL` taking
    /// precedence over the file. A missing file yields defaults.
    pub fn load() -> Result<Config, Box<dyn std::error::Error>> {
        let mut config = match Self::config_path() {
            Some(path) => Self::load_from_path(&path)?,
            None => Config::default(),
        };
        if let Ok(override_url) = std::env::var("CAUSERIE_API_URL") {
            if !override_url.trim().is_empty() {
                config.api_base_url = override_url;
            }
        }
        config.api_base_url = normalize_base_url(&config.api_base_url);
        Ok(config)
    }

    pub fn load_from_path(config_path: &Path) -> Result<Config, Box<dyn std::error::Error>> {
        if config_path.exists() {
            let contents = fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
                path: config_path.to_path_buf(),
                source,
            })?;
            let config: Config =
                toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                    path: config_path.to_path_buf(),
                    source,
                })?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn save_to_path(&self, config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let parent = config_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty());

        if let Some(dir) = parent {
            fs::create_dir_all(dir)?;
        }

        let contents = toml::to_string_pretty(self)?;
        let mut temp_file = match parent {
            Some(dir) => NamedTempFile::new_in(dir)?,
            None => NamedTempFile::new()?,
        };
        temp_file.write_all(contents.as_bytes())?;
        temp_file.persist(config_path)?;
        Ok(())
    }

    /// The WebSocket endpoint: explicit when configured, otherwise derived
    /// from the API base URL.
    pub fn socket_url(&self) -> String {
        match &self.socket_url {
            Some(url) => normalize_base_url(url),
            None => derive_socket_url(&self.api_base_url),
        }
    }

    fn config_path() -> Option<PathBuf> {
        let proj_dirs = ProjectDirs::from("org", "permacommons", "causerie")?;
        Some(proj_dirs.config_dir().join("config.toml"))
    }
}
