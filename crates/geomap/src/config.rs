//! Configuration management for geomap.
//!
//! This module handles loading and validation of the TOML configuration file
//! and applying command-line overrides on top of it.

use crate::cli::CliArgs;
use geolocation_cache::{CacheConfig, MapAnchor, MapSize, MAX_ZOOM};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

fn default_log_level() -> String {
    "info".to_string()
}

fn default_width() -> u32 {
    1024
}

fn default_height() -> u32 {
    768
}

fn default_zoom() -> u8 {
    4
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Geolocation cache settings
    #[serde(default)]
    pub cache: CacheConfig,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Default viewport
    #[serde(default)]
    pub viewport: ViewportSettings,
}

/// Logging system configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

/// Viewport used when the command line does not say otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewportSettings {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_zoom")]
    pub zoom: u8,
    #[serde(default)]
    pub anchor: MapAnchor,
    /// Anchor point latitude
    #[serde(default)]
    pub latitude: f64,
    /// Anchor point longitude
    #[serde(default)]
    pub longitude: f64,
}

impl Default for ViewportSettings {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            zoom: default_zoom(),
            anchor: MapAnchor::default(),
            latitude: 0.0,
            longitude: 0.0,
        }
    }
}

impl ViewportSettings {
    pub fn size(&self) -> MapSize {
        MapSize::new(self.width, self.height)
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file does not exist, a default configuration is written there
    /// and returned.
    pub async fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Overwrites settings with the values given on the command line.
    pub fn apply_overrides(&mut self, args: &CliArgs) {
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if args.json_logs {
            self.logging.json_format = true;
        }

        let viewport = &mut self.viewport;
        if let Some(latitude) = args.latitude {
            viewport.latitude = latitude;
        }
        if let Some(longitude) = args.longitude {
            viewport.longitude = longitude;
        }
        if let Some(zoom) = args.zoom {
            viewport.zoom = zoom;
        }
        if let Some(width) = args.width {
            viewport.width = width;
        }
        if let Some(height) = args.height {
            viewport.height = height;
        }
        if let Some(anchor) = args.anchor {
            viewport.anchor = anchor;
        }
    }

    /// Validates the configuration for correctness.
    pub fn validate(&self) -> Result<(), String> {
        self.cache.validate().map_err(|e| e.to_string())?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        let viewport = &self.viewport;
        if viewport.width == 0 || viewport.height == 0 {
            return Err(format!(
                "Viewport must not be empty, got {}x{}",
                viewport.width, viewport.height
            ));
        }
        if viewport.zoom > MAX_ZOOM {
            return Err(format!(
                "Zoom level {} is above the maximum of {MAX_ZOOM}",
                viewport.zoom
            ));
        }
        if !(-90.0..=90.0).contains(&viewport.latitude) {
            return Err(format!("Latitude {} is out of range", viewport.latitude));
        }
        if !(-180.0..=180.0).contains(&viewport.longitude) {
            return Err(format!("Longitude {} is out of range", viewport.longitude));
        }

        Ok(())
    }
}
