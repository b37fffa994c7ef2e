//! Error types for configuration loading.

use thiserror::Error;

/// Errors that can occur while loading, saving or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The configuration parsed but its values are unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Convenience alias for results with [`ConfigError`].
pub type Result<T> = std::result::Result<T, ConfigError>;
