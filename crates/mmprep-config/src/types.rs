// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! Each struct maps to one section of `mmprep.toml`. Every field has a default
//! so a partial file is always accepted.

use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MmprepConfig {
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// Pipeline construction parameters
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum samples per batch, 1..=1024
    pub batch_size: usize,
    /// Worker threads, 1..=online CPUs; 0 = one per online CPU
    pub num_threads: usize,
    /// Buffering depth of declared outputs, 2..=128
    pub queue_depth: usize,
    /// Rewrite operator chains into registered fused operators
    pub enable_fusion: bool,
    /// Wait window of the non-blocking slot acquisitions
    pub acquire_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            num_threads: 1,
            queue_depth: 2,
            enable_fusion: true,
            acquire_timeout_ms: 200,
        }
    }
}

impl PipelineConfig {
    /// Worker count with the `0 = auto` convention resolved.
    pub fn resolved_threads(&self) -> usize {
        if self.num_threads == 0 {
            num_cpus::get()
        } else {
            self.num_threads
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter level (trace, debug, info, warn, error)
    pub level: String,
    pub format: LogFormat,
    /// Base directory for file logs (used with the `file-logging` feature)
    pub log_dir: String,
    pub retention_days: u64,
    pub retention_runs: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            log_dir: "./logs".to_string(),
            retention_days: 30,
            retention_runs: 10,
        }
    }
}
