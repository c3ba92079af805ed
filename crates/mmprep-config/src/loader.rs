// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! Three tiers, later ones win:
//! 1. TOML file (base values)
//! 2. Environment variables (runtime overrides)
//! 3. CLI arguments (explicit user overrides)

use crate::{ConfigError, ConfigResult, MmprepConfig};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "mmprep.toml";

/// Find the mmprep configuration file
///
/// Search order:
/// 1. `MMPREP_CONFIG_PATH` environment variable
/// 2. Current working directory: `./mmprep.toml`
/// 3. Up to 5 parent directories
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var("MMPREP_CONFIG_PATH") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::FileNotFound(format!(
            "Config file specified by MMPREP_CONFIG_PATH not found: {}",
            path.display()
        )));
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));
        let mut current = cwd.as_path();
        for _ in 0..5 {
            match current.parent() {
                Some(parent) => {
                    search_paths.push(parent.join(CONFIG_FILE_NAME));
                    current = parent;
                }
                None => break,
            }
        }
    }

    if let Some(found) = search_paths.iter().find(|p| p.exists()) {
        return Ok(found.clone());
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "'{}' not found in any of these locations:\n{}\n\nSet MMPREP_CONFIG_PATH to specify a custom location.",
        CONFIG_FILE_NAME, search_list
    )))
}

/// Load configuration from a TOML file
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, the file is searched for.
/// * `cli_args` - Optional CLI overrides keyed by dotted field name
///
/// # Errors
///
/// Returns error if the config file is not found or contains invalid TOML.
/// Range validation is a separate step, see [`crate::validate_config`].
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<MmprepConfig> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };

    let content = fs::read_to_string(&config_file)?;
    let mut config: MmprepConfig = toml::from_str(&content)?;

    apply_environment_overrides(&mut config);
    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli)?;
    }

    Ok(config)
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
}

/// Apply environment variable overrides to configuration
///
/// Supported environment variables:
/// - `MMPREP_BATCH_SIZE` -> `pipeline.batch_size`
/// - `MMPREP_NUM_THREADS` -> `pipeline.num_threads`
/// - `MMPREP_QUEUE_DEPTH` -> `pipeline.queue_depth`
/// - `MMPREP_ENABLE_FUSION` -> `pipeline.enable_fusion`
/// - `MMPREP_ACQUIRE_TIMEOUT_MS` -> `pipeline.acquire_timeout_ms`
/// - `MMPREP_LOG_LEVEL` -> `logging.level`
/// - `MMPREP_LOG_FORMAT` -> `logging.format`
///
/// Values that fail to parse are ignored.
pub fn apply_environment_overrides(config: &mut MmprepConfig) {
    if let Some(v) = env::var("MMPREP_BATCH_SIZE").ok().and_then(|v| v.parse().ok()) {
        config.pipeline.batch_size = v;
    }
    if let Some(v) = env::var("MMPREP_NUM_THREADS").ok().and_then(|v| v.parse().ok()) {
        config.pipeline.num_threads = v;
    }
    if let Some(v) = env::var("MMPREP_QUEUE_DEPTH").ok().and_then(|v| v.parse().ok()) {
        config.pipeline.queue_depth = v;
    }
    if let Ok(value) = env::var("MMPREP_ENABLE_FUSION") {
        config.pipeline.enable_fusion = parse_bool(&value);
    }
    if let Some(v) = env::var("MMPREP_ACQUIRE_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()) {
        config.pipeline.acquire_timeout_ms = v;
    }
    if let Ok(value) = env::var("MMPREP_LOG_LEVEL") {
        config.logging.level = value;
    }
    if let Some(v) = env::var("MMPREP_LOG_FORMAT").ok().and_then(|v| v.parse().ok()) {
        config.logging.format = v;
    }
}

fn parse_cli<T: std::str::FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidValue(format!("{} = '{}'", key, value)))
}

/// Apply CLI argument overrides to configuration
///
/// Keys are dotted field paths, e.g. `{"pipeline.batch_size": "32"}`. Unlike
/// environment overrides, a CLI value that fails to parse is an error since the
/// user typed it explicitly.
pub fn apply_cli_overrides(
    config: &mut MmprepConfig,
    cli_args: &HashMap<String, String>,
) -> ConfigResult<()> {
    for (key, value) in cli_args {
        match key.as_str() {
            "pipeline.batch_size" => config.pipeline.batch_size = parse_cli(key, value)?,
            "pipeline.num_threads" => config.pipeline.num_threads = parse_cli(key, value)?,
            "pipeline.queue_depth" => config.pipeline.queue_depth = parse_cli(key, value)?,
            "pipeline.enable_fusion" => config.pipeline.enable_fusion = parse_bool(value),
            "pipeline.acquire_timeout_ms" => {
                config.pipeline.acquire_timeout_ms = parse_cli(key, value)?
            }
            "logging.level" => config.logging.level = value.clone(),
            "logging.format" => config.logging.format = parse_cli(key, value)?,
            "logging.log_dir" => config.logging.log_dir = value.clone(),
            other => {
                return Err(ConfigError::InvalidValue(format!(
                    "unknown configuration key '{}'",
                    other
                )))
            }
        }
    }
    Ok(())
}
