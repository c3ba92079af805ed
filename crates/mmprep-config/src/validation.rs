// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! Every violation is collected before reporting so a user fixes a config file
//! in one pass.

use crate::{ConfigError, ConfigResult, MmprepConfig};

pub const MIN_BATCH_SIZE: usize = 1;
pub const MAX_BATCH_SIZE: usize = 1024;
pub const MIN_QUEUE_DEPTH: usize = 2;
pub const MAX_QUEUE_DEPTH: usize = 128;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validation errors that can occur during config validation
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    OutOfRange {
        field: String,
        value: usize,
        min: usize,
        max: usize,
    },
    InvalidValue {
        field: String,
        reason: String,
    },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfRange {
                field,
                value,
                min,
                max,
            } => write!(
                f,
                "{} = {} is outside valid range ({}-{})",
                field, value, min, max
            ),
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
        }
    }
}

fn check_range(
    errors: &mut Vec<ConfigValidationError>,
    field: &str,
    value: usize,
    min: usize,
    max: usize,
) {
    if value < min || value > max {
        errors.push(ConfigValidationError::OutOfRange {
            field: field.to_string(),
            value,
            min,
            max,
        });
    }
}

/// Validate the complete configuration
///
/// Checks:
/// - `pipeline.batch_size` in 1-1024
/// - `pipeline.num_threads` in 1-(online CPUs), after resolving `0 = auto`
/// - `pipeline.queue_depth` in 2-128
/// - `pipeline.acquire_timeout_ms` positive
/// - `logging.level` a known level
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every violation
pub fn validate_config(config: &MmprepConfig) -> ConfigResult<()> {
    let mut errors = Vec::new();
    let pipeline = &config.pipeline;

    check_range(
        &mut errors,
        "pipeline.batch_size",
        pipeline.batch_size,
        MIN_BATCH_SIZE,
        MAX_BATCH_SIZE,
    );
    check_range(
        &mut errors,
        "pipeline.num_threads",
        pipeline.resolved_threads(),
        1,
        num_cpus::get(),
    );
    check_range(
        &mut errors,
        "pipeline.queue_depth",
        pipeline.queue_depth,
        MIN_QUEUE_DEPTH,
        MAX_QUEUE_DEPTH,
    );
    if pipeline.acquire_timeout_ms == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "pipeline.acquire_timeout_ms".to_string(),
            reason: "must be positive".to_string(),
        });
    }
    if !LOG_LEVELS.contains(&config.logging.level.to_lowercase().as_str()) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "logging.level".to_string(),
            reason: format!("must be one of {}", LOG_LEVELS.join(", ")),
        });
    }

    if !errors.is_empty() {
        let error_messages = errors
            .iter()
            .map(|e| format!("  - {}", e))
            .collect::<Vec<_>>()
            .join("\n");

        return Err(ConfigError::ValidationError(format!(
            "Configuration validation failed:\n{}",
            error_messages
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&MmprepConfig::default()).is_ok());
    }

    #[test]
    fn test_batch_size_bounds() {
        let mut config = MmprepConfig::default();
        config.pipeline.batch_size = 1024;
        assert!(validate_config(&config).is_ok());

        config.pipeline.batch_size = 1025;
        match validate_config(&config) {
            Err(ConfigError::ValidationError(msg)) => {
                assert!(msg.contains("pipeline.batch_size"));
                assert!(msg.contains("1-1024"));
            }
            other => panic!("unexpected {:?}", other),
        }

        config.pipeline.batch_size = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_queue_depth_bounds() {
        let mut config = MmprepConfig::default();
        config.pipeline.queue_depth = 1;
        assert!(validate_config(&config).is_err());
        config.pipeline.queue_depth = 128;
        assert!(validate_config(&config).is_ok());
        config.pipeline.queue_depth = 129;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_thread_count_bounds() {
        let mut config = MmprepConfig::default();
        config.pipeline.num_threads = num_cpus::get() + 1;
        assert!(validate_config(&config).is_err());
        config.pipeline.num_threads = 0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_all_violations_reported() {
        let mut config = MmprepConfig::default();
        config.pipeline.batch_size = 0;
        config.pipeline.queue_depth = 500;
        config.logging.level = "loud".to_string();
        match validate_config(&config) {
            Err(ConfigError::ValidationError(msg)) => {
                assert!(msg.contains("batch_size"));
                assert!(msg.contains("queue_depth"));
                assert!(msg.contains("logging.level"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
