//! Configuration management for leadpipe
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::dedup::DedupMode;
use crate::error::{Error, Result};
use crate::reader::{DelimiterChoice, RaggedRows};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Blob storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Import pipeline configuration
    #[serde(default)]
    pub import: ImportConfig,

    /// Order extraction configuration
    #[serde(default)]
    pub order: OrderConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Blob storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for table, side and order files.
    /// Relative paths are resolved against the base dir.
    #[serde(default)]
    pub root: Option<PathBuf>,
}

/// Import pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Delimiter used when the request does not name one
    #[serde(default = "default_import_delimiter")]
    pub default_delimiter: DelimiterChoice,

    /// What to do with rows whose field count differs from the header
    #[serde(default = "default_ragged_rows")]
    pub ragged_rows: RaggedRows,

    /// CSV reader buffer size in bytes
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// Dedup mode used when key columns are given without a mode
    #[serde(default = "default_dedup_mode")]
    pub default_dedup_mode: DedupMode,
}

/// Order extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderConfig {
    /// Largest row budget a single order may request
    #[serde(default = "default_max_budget")]
    pub max_budget: usize,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for leadpipe data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to SQLite database
    pub db_file: PathBuf,

    /// Root of the local blob store
    pub blob_root: PathBuf,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            default_delimiter: default_import_delimiter(),
            ragged_rows: default_ragged_rows(),
            buffer_capacity: default_buffer_capacity(),
            default_dedup_mode: default_dedup_mode(),
        }
    }
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            max_budget: default_max_budget(),
        }
    }
}

impl Config {
    /// Get the default base directory for leadpipe (~/.leadpipe)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".leadpipe")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    fn paths_for(base: PathBuf, config_file: PathBuf, storage: &StorageConfig) -> PathsConfig {
        let blob_root = match &storage.root {
            Some(root) if root.is_absolute() => root.clone(),
            Some(root) => base.join(root),
            None => base.join(default_blob_dir_name()),
        };
        PathsConfig {
            config_file,
            db_file: base.join("leads.db"),
            blob_root,
            base_dir: base,
        }
    }

    /// Initialize paths configuration
    pub fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        let config_file = base.join("config.toml");
        self.paths = Self::paths_for(base, config_file, &self.storage);
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = Self::paths_for(base, config_path.to_path_buf(), &config.storage);

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific base directory
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = Self::paths_for(
                config.paths.base_dir.clone(),
                config.paths.config_file.clone(),
                &loaded.storage,
            );
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Check if leadpipe is initialized (config and DB exist)
    pub fn is_initialized(&self) -> bool {
        self.paths.config_file.exists() && self.paths.db_file.exists()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.import.buffer_capacity == 0 {
            return Err(Error::Config(
                "import.buffer_capacity must be positive".to_string(),
            ));
        }

        if self.order.max_budget == 0 {
            return Err(Error::Config("order.max_budget must be positive".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.import.default_delimiter, DelimiterChoice::Auto);
        assert_eq!(config.import.ragged_rows, RaggedRows::Skip);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_load() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        config.order.max_budget = 500;
        config.import.ragged_rows = RaggedRows::Pad;

        config.save().unwrap();
        assert!(config.paths.config_file.exists());

        let loaded = Config::load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(loaded.order.max_budget, 500);
        assert_eq!(loaded.import.ragged_rows, RaggedRows::Pad);
        assert_eq!(loaded.paths.blob_root, tmp.path().join("blobs"));
    }

    #[test]
    fn test_relative_storage_root_resolves_against_base() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[storage]\nroot = \"data\"\n").unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.paths.blob_root, tmp.path().join("data"));
        assert_eq!(loaded.paths.db_file, tmp.path().join("leads.db"));
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.import.buffer_capacity = 0;
        assert!(config.validate().is_err());

        config.import.buffer_capacity = 4096;
        assert!(config.validate().is_ok());

        config.order.max_budget = 0;
        assert!(config.validate().is_err());
    }
}
