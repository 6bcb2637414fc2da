//! Configuration management for geoprox.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::index::IndexOptions;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "geoprox";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "points.db";

/// Prefix for environment variable overrides.
const ENV_PREFIX: &str = "GEOPROX_";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `GEOPROX_`, `__` between section
///    and key, e.g. `GEOPROX_INDEX__TTL_SECS=600`)
/// 2. TOML config file at `~/.config/geoprox/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Index configuration.
    pub index: IndexConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Expiry sweep configuration.
    pub sweep: SweepConfig,
}

/// Which backend holds the points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Process memory; nothing survives a restart.
    Memory,
    /// `SQLite` database at [`Config::database_path`].
    #[default]
    Sqlite,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Index-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Backend holding the points.
    pub backend: Backend,
    /// Seconds a point stays live after its last update.
    pub ttl_secs: u64,
    /// Radius used when a nearby query omits one.
    pub default_radius_km: f64,
    /// Result cap used when a nearby query omits one.
    pub default_limit: usize,
    /// Hard cap on requested result counts.
    pub max_limit: usize,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file for the `sqlite` backend.
    /// Defaults to `~/.local/share/geoprox/points.db`
    pub database_path: Option<PathBuf>,
}

/// Expiry sweep configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Run the background sweeper.
    pub enabled: bool,
    /// Seconds between sweeps.
    pub interval_secs: u64,
    /// Points removed per critical section.
    pub batch_size: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Sqlite,
            ttl_secs: 3600,
            default_radius_km: 50.0,
            default_limit: 100,
            max_limit: 1000,
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
            batch_size: crate::index::DEFAULT_SWEEP_BATCH_SIZE,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. TOML config file (if exists)
    /// 3. Environment variables (prefixed with `GEOPROX_`)
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);
        Self::from_figment(
            Figment::new()
                .merge(Serialized::defaults(Config::default()))
                .merge(Toml::file(&config_file))
                .merge(Env::prefixed(ENV_PREFIX).split("__")),
        )
    }

    /// Load configuration from a file that must exist.
    ///
    /// Unlike [`Config::load_from`], a missing file is an error rather than
    /// a silent fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigValidation`] if `path` is not a file, or any
    /// error [`Config::load_from`] returns.
    pub fn load_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::ConfigValidation {
                message: format!("configuration file not found: {}", path.display()),
            });
        }
        Self::load_from(Some(path.to_path_buf()))
    }

    /// Extract and validate a configuration from a prepared figment.
    fn from_figment(figment: Figment) -> Result<Self> {
        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.index.ttl_secs == 0 {
            return Err(Error::ConfigValidation {
                message: "ttl_secs must be greater than 0".to_string(),
            });
        }

        if !(self.index.default_radius_km.is_finite() && self.index.default_radius_km >= 0.0) {
            return Err(Error::ConfigValidation {
                message: format!(
                    "default_radius_km must be a non-negative number, got {}",
                    self.index.default_radius_km
                ),
            });
        }

        if self.index.default_limit == 0 || self.index.default_limit > self.index.max_limit {
            return Err(Error::ConfigValidation {
                message: format!(
                    "default_limit ({}) must be between 1 and max_limit ({})",
                    self.index.default_limit, self.index.max_limit
                ),
            });
        }

        if self.sweep.interval_secs == 0 {
            return Err(Error::ConfigValidation {
                message: "interval_secs must be greater than 0".to_string(),
            });
        }

        if self.sweep.batch_size == 0 {
            return Err(Error::ConfigValidation {
                message: "batch_size must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the TTL as a Duration.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.index.ttl_secs)
    }

    /// Get the sweep interval as a Duration.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep.interval_secs)
    }

    /// Backend-independent index options derived from this configuration.
    #[must_use]
    pub fn index_options(&self) -> IndexOptions {
        IndexOptions {
            ttl: self.ttl(),
            sweep_batch_size: self.sweep.batch_size,
        }
    }
}
