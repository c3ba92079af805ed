// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-crate debug flags
//!
//! Supports flags like `--debug-mmprep-pipeline`, `--debug-all`, and the
//! `MMPREP_DEBUG` environment variable.

use std::collections::BTreeSet;
use std::env;

use crate::KNOWN_CRATES;

/// Crates for which debug-level logging was requested
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrateDebugFlags {
    enabled_crates: BTreeSet<String>,
}

impl CrateDebugFlags {
    /// Parse debug flags from command-line arguments
    ///
    /// Looks for arguments matching `--debug-{crate-name}`; `--debug-all`
    /// enables every crate in [`KNOWN_CRATES`]. Other arguments are ignored.
    pub fn from_args<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut flags = CrateDebugFlags::default();
        for arg in args {
            if arg == "--debug-all" {
                flags.enable_all();
            } else if let Some(crate_name) = arg.strip_prefix("--debug-") {
                flags.enable(crate_name);
            }
        }
        flags
    }

    /// Parse the `MMPREP_DEBUG` format: `all` or comma-separated crate names.
    pub fn from_env_value(value: &str) -> Self {
        let mut flags = CrateDebugFlags::default();
        flags.merge_env_value(value);
        flags
    }

    fn merge_env_value(&mut self, value: &str) {
        if value.trim() == "all" {
            self.enable_all();
            return;
        }
        for crate_name in value.split(',') {
            let crate_name = crate_name.trim();
            if !crate_name.is_empty() {
                self.enable(crate_name);
            }
        }
    }

    pub fn enable(&mut self, crate_name: &str) {
        self.enabled_crates.insert(crate_name.to_string());
    }

    pub fn enable_all(&mut self) {
        for crate_name in KNOWN_CRATES {
            self.enable(crate_name);
        }
    }

    pub fn is_enabled(&self, crate_name: &str) -> bool {
        self.enabled_crates.contains(crate_name)
    }

    pub fn any_enabled(&self) -> bool {
        !self.enabled_crates.is_empty()
    }

    /// Build an `EnvFilter` directive string.
    ///
    /// Crate names are converted to tracing targets (`mmprep-pipeline` ->
    /// `mmprep_pipeline`). `default_level` applies to everything else.
    pub fn to_filter_string(&self, default_level: &str) -> String {
        let mut directives: Vec<String> = self
            .enabled_crates
            .iter()
            .map(|name| format!("{}=debug", name.replace('-', "_")))
            .collect();
        directives.push(default_level.to_lowercase());
        directives.join(",")
    }
}

/// Debug flags from the process arguments plus `MMPREP_DEBUG`.
pub fn parse_debug_flags() -> CrateDebugFlags {
    let mut flags = CrateDebugFlags::from_args(env::args());
    if let Ok(value) = env::var("MMPREP_DEBUG") {
        flags.merge_env_value(&value);
    }
    flags
}

/// Generate help text for debug flags
pub fn debug_flags_help() -> String {
    format!(
        r#"Debug Flags:
  --debug-all                    Enable debug logging for all crates
  --debug-{{crate-name}}          Enable debug logging for specific crate

Available crates:
  {}

Environment Variable:
  MMPREP_DEBUG={{crate-name}}[,{{crate-name}}]  Enable debug for crates (comma-separated)
  MMPREP_DEBUG=all                             Enable debug for all crates
"#,
        KNOWN_CRATES.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_crate_flag() {
        let flags = CrateDebugFlags::from_args(vec![
            "pipeline_bench".to_string(),
            "--debug-mmprep-pipeline".to_string(),
        ]);
        assert!(flags.is_enabled("mmprep-pipeline"));
        assert!(!flags.is_enabled("mmprep-runtime"));
    }

    #[test]
    fn test_debug_all() {
        let flags = CrateDebugFlags::from_args(vec!["--debug-all".to_string()]);
        for crate_name in KNOWN_CRATES {
            assert!(flags.is_enabled(crate_name), "{} should be enabled", crate_name);
        }
    }

    #[test]
    fn test_env_value() {
        let flags = CrateDebugFlags::from_env_value(" mmprep-runtime, ,mmprep-pipeline ");
        assert!(flags.is_enabled("mmprep-runtime"));
        assert!(flags.is_enabled("mmprep-pipeline"));
        assert!(!flags.is_enabled("mmprep-config"));
        assert!(CrateDebugFlags::from_env_value("all").is_enabled("mmprep"));
    }

    #[test]
    fn test_filter_string_uses_targets() {
        let flags = CrateDebugFlags::from_args(vec!["--debug-mmprep-pipeline".to_string()]);
        assert_eq!(flags.to_filter_string("WARN"), "mmprep_pipeline=debug,warn");
        assert_eq!(CrateDebugFlags::default().to_filter_string("info"), "info");
    }
}
