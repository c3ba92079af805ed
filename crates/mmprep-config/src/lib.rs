// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # mmprep Configuration System
//!
//! Type-safe configuration loader for mmprep with support for:
//! - TOML file parsing
//! - Environment variable overrides
//! - CLI argument overrides
//! - Range validation of pipeline parameters
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mmprep_config::{load_config, validate_config};
//!
//! let config = load_config(None, None).expect("Failed to load config");
//! validate_config(&config).expect("Invalid config");
//!
//! println!("Batch size: {}", config.pipeline.batch_size);
//! println!("Queue depth: {}", config.pipeline.queue_depth);
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod loader;
pub mod types;
pub mod validation;

pub use loader::{apply_cli_overrides, apply_environment_overrides, find_config_file, load_config};
pub use types::*;
pub use validation::{validate_config, ConfigValidationError};

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found. Searched: {0}")]
    FileNotFound(String),

    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax: {0}")]
    ParseError(String),

    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<ConfigError> for mmprep_structures::PipelineError {
    fn from(err: ConfigError) -> Self {
        mmprep_structures::PipelineError::InvalidConfig(err.to_string())
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let config = MmprepConfig::default();
        let text = toml::to_string(&config).unwrap();
        let back: MmprepConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.pipeline.batch_size, config.pipeline.batch_size);
        assert_eq!(back.logging.format, config.logging.format);
    }

    #[test]
    fn test_config_error_maps_to_invalid_config() {
        let err: mmprep_structures::PipelineError =
            ConfigError::InvalidValue("pipeline.batch_size".to_string()).into();
        assert!(matches!(err, mmprep_structures::PipelineError::InvalidConfig(_)));
        assert_eq!(err.code(), 4);
    }
}
