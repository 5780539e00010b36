//! Store configuration
//!
//! Stored as JSON, by default in ~/.config/catfs/config.json

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Tuning knobs for the on-disk object store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// zstd level used for new blobs
    pub compression_level: i32,
    /// Write index and refs when the store is dropped
    pub sync_on_drop: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            compression_level: 3,
            sync_on_drop: true,
        }
    }
}

impl StoreConfig {
    /// Default config location (~/.config/catfs/config.json)
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not find config directory".into()))?;
        Ok(config_dir.join("catfs").join("config.json"))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;
        let config: StoreConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the default location, falling back to defaults if missing
    pub fn load_or_default() -> Result<Self> {
        let path = Self::default_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| Error::Config(format!("Failed to create config dir: {}", e)))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .map_err(|e| Error::Config(format!("Failed to write config: {}", e)))?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !zstd::compression_level_range().contains(&self.compression_level) {
            return Err(Error::Config(format!(
                "compression level {} out of range",
                self.compression_level
            )));
        }
        Ok(())
    }
}
