//! Startup error types.

use thiserror::Error;

/// Errors that can occur when loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file from disk.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse JSON in the config file.
    #[error("failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A config value was invalid (e.g., out of range).
    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Result type for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
