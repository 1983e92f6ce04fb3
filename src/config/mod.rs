//! Configuration management for berth

pub mod schema;

pub use schema::Config;

use crate::error::{BerthError, BerthResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Project-local configuration file name
pub const LOCAL_CONFIG_FILE: &str = "berth.toml";

/// Merged configuration plus the directory it applies to
#[derive(Debug, Clone)]
pub struct Project {
    /// Effective configuration
    pub config: Config,

    /// Directory holding `berth.toml` (or the working directory)
    pub root: PathBuf,
}

impl Project {
    /// Application source directory on the host
    pub fn source_dir(&self) -> PathBuf {
        self.root.join(&self.config.image.source)
    }

    /// Manifest path on the host
    pub fn manifest_path(&self) -> PathBuf {
        self.source_dir().join(&self.config.image.manifest)
    }
}

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("berth")
            .join("config.toml")
    }

    /// Get the state directory path
    pub fn state_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("berth")
    }

    /// Scratch directory for image build contexts
    pub fn builds_dir() -> PathBuf {
        Self::state_dir().join("builds")
    }

    /// Get the event log path
    pub fn audit_log_path() -> PathBuf {
        Self::state_dir().join("events.log")
    }

    /// Walk up from `start` looking for a project-local `berth.toml`
    pub fn find_local_config(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(LOCAL_CONFIG_FILE))
            .find(|candidate| candidate.is_file())
    }

    /// Load the global configuration, using defaults if the file is missing
    pub async fn load(&self) -> BerthResult<Config> {
        let value = self.load_value(&self.config_path).await?;
        Self::from_value(&self.config_path, value)
    }

    /// Load global configuration with a project-local file merged over it
    pub async fn load_merged(&self, local: Option<&Path>) -> BerthResult<Config> {
        let mut merged = self.load_value(&self.config_path).await?;

        if let Some(path) = local {
            let local_value = self.load_value(path).await?;
            merge_values(&mut merged, local_value);
            debug!("Merged local config {}", path.display());
        }

        let origin = local.unwrap_or(&self.config_path);
        Self::from_value(origin, merged)
    }

    async fn load_value(&self, path: &Path) -> BerthResult<toml::Value> {
        if !path.exists() {
            debug!("Config file {} not found, using defaults", path.display());
            return Ok(toml::Value::Table(toml::map::Map::new()));
        }

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| BerthError::io(format!("reading config from {}", path.display()), e))?;

        content
            .parse::<toml::Value>()
            .map_err(|e| BerthError::ConfigInvalid {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    fn from_value(path: &Path, value: toml::Value) -> BerthResult<Config> {
        value
            .try_into::<Config>()
            .map_err(|e| BerthError::ConfigInvalid {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> BerthResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            BerthError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> BerthResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| BerthError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Ensure all state directories exist
    pub async fn ensure_state_dirs() -> BerthResult<()> {
        for dir in [Self::state_dir(), Self::builds_dir()] {
            fs::create_dir_all(&dir).await.map_err(|e| {
                BerthError::io(format!("creating directory {}", dir.display()), e)
            })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Deep-merge `overlay` into `base`; tables merge, everything else replaces.
fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
