// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # mmprep-runtime
//!
//! Threading primitives for the pipeline:
//! - [`WorkerPool`]: fixed set of named worker threads behind one shared queue
//! - [`TaskBatch`]: a caller-scoped group of tasks with its own completion barrier
//! - [`balance`]: even, contiguous partitioning of work across workers
//! - [`channels`]: bounded channel helpers used for token queues

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod balance;
pub mod channels;
pub mod worker_pool;

pub use balance::{assign, ranges};
pub use channels::{create_bounded, ChannelStats};
pub use worker_pool::{TaskBatch, WorkerPool};

/// Number of logical CPUs currently online.
pub fn online_cpus() -> usize {
    num_cpus::get()
}
