//! Error types for the geolocation cache

/// Main error type for the geolocation cache
#[derive(Debug, thiserror::Error)]
pub enum GeoCacheError {
    /// Map anchor code outside the known set
    #[error("Invalid map anchor: {0} (expected 0 = center, 1 = top-left, 2 = bottom-right)")]
    InvalidAnchor(i32),

    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for GeoCacheError {
    fn from(err: serde_json::Error) -> Self {
        GeoCacheError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for GeoCacheError {
    fn from(err: toml::de::Error) -> Self {
        GeoCacheError::Serialization(err.to_string())
    }
}
