//! Cache configuration.
//!
//! Settings are plain serde structures so they can be embedded into a host
//! application's TOML file; every field has a default.

use crate::error::GeoCacheError;
use crate::spatial::{IndexBackend, DEFAULT_MAX_DEPTH, DEFAULT_MAX_ENTRIES};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_max_entries_per_node() -> usize {
    DEFAULT_MAX_ENTRIES
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_notification_capacity() -> usize {
    1024
}

/// Geolocation cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Spatial index settings
    #[serde(default)]
    pub index: IndexSettings,
    /// Buffer size of the session notification channel
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,
}

/// Spatial index settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSettings {
    /// Index implementation
    #[serde(default)]
    pub backend: IndexBackend,
    /// Points a quad-tree leaf holds before it splits
    #[serde(default = "default_max_entries_per_node")]
    pub max_entries_per_node: usize,
    /// Maximum quad-tree subdivision depth
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            backend: IndexBackend::default(),
            max_entries_per_node: default_max_entries_per_node(),
            max_depth: default_max_depth(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            index: IndexSettings::default(),
            notification_capacity: default_notification_capacity(),
        }
    }
}

impl CacheConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, GeoCacheError> {
        let config: CacheConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a configuration file.
    pub fn load_from_file(path: &Path) -> Result<Self, GeoCacheError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Checks settings for values the cache cannot work with.
    pub fn validate(&self) -> Result<(), GeoCacheError> {
        if self.index.max_entries_per_node == 0 {
            return Err(GeoCacheError::InvalidConfig(
                "index.max_entries_per_node must be greater than 0".to_string(),
            ));
        }
        // Deeper than this the cells are smaller than f64 can split.
        if self.index.max_depth > 48 {
            return Err(GeoCacheError::InvalidConfig(format!(
                "index.max_depth must be at most 48, got {}",
                self.index.max_depth
            )));
        }
        if self.notification_capacity == 0 {
            return Err(GeoCacheError::InvalidConfig(
                "notification_capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
