//! Configuration management for Trawl.
//!
//! This module provides configuration loading, saving, and defaults.
//! Configuration is stored in TOML format in a platform-appropriate location.

use crate::error::{Result, TrawlError};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure for Trawl.
///
/// ## Example Configuration File (trawl.toml)
///
/// ```toml
/// [general]
/// log_level = "info"
/// max_results = 0
///
/// [search]
/// recursive = true
/// case_sensitive = false
///
/// [content]
/// search_binary = false
/// sniff_bytes = 1024
///
/// [locate]
/// program = "locate"
/// args = ["--existing"]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Defaults for new queries
    pub search: SearchConfig,

    /// Content search settings
    pub content: ContentConfig,

    /// External index program
    pub locate: LocateConfig,
}

/// General configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Stop after this many matches (0 = unlimited)
    pub max_results: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            log_level: "info".to_string(),
            max_results: 0,
        }
    }
}

/// Query defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Descend into subdirectories
    pub recursive: bool,

    /// Match name patterns case-sensitively
    pub case_sensitive: bool,

    /// Follow symbolic links while listing
    pub follow_links: bool,

    /// Number of entries delivered per listing batch
    pub batch_size: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            recursive: true,
            case_sensitive: false,
            follow_links: false,
            batch_size: 256,
        }
    }
}

/// Content search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    /// Search files that look binary
    pub search_binary: bool,

    /// Bytes inspected by the binary heuristic
    pub sniff_bytes: usize,
}

impl Default for ContentConfig {
    fn default() -> Self {
        ContentConfig {
            search_binary: false,
            sniff_bytes: 1024,
        }
    }
}

/// External index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocateConfig {
    /// Program to run
    pub program: String,

    /// Extra arguments, placed before the search root
    pub args: Vec<String>,
}

impl Default for LocateConfig {
    fn default() -> Self {
        LocateConfig {
            program: "locate".to_string(),
            args: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default config if no config file exists.
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Config::default());
        }

        info!(path = %path.display(), "Loading configuration");
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents).map_err(|e| TrawlError::ConfigError {
            reason: format!("Failed to parse config: {}", e),
        })?;

        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path()?;
        self.save_to(&config_path)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        info!(path = %path.display(), "Saving configuration");
        let contents = self.to_toml()?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| TrawlError::ConfigError {
            reason: format!("Failed to serialize config: {}", e),
        })
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "trawl").ok_or_else(|| TrawlError::ConfigError {
            reason: "Could not determine config directory".to_string(),
        })?;

        Ok(dirs.config_dir().join("trawl.toml"))
    }
}
