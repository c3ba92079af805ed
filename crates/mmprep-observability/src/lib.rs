// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # mmprep-observability
//!
//! Logging setup shared by every mmprep binary, with per-crate debug flag support.
//!
//! ## Features
//! - `file-logging`: timestamped run folders with daily rotation and retention cleanup

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod init;

pub use cli::*;
pub use init::*;

/// Known mmprep crate names for debug flags
pub const KNOWN_CRATES: &[&str] = &[
    "mmprep",
    "mmprep-structures",
    "mmprep-config",
    "mmprep-observability",
    "mmprep-runtime",
    "mmprep-pipeline",
];
