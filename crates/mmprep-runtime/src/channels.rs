// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Bounded channel helpers.
//!
//! Run-slot tokens circulate through bounded channels sized to the slot count,
//! so a send can never block and a receive is the only suspension point.

use crossbeam::channel::{bounded, Receiver, Sender};

/// Create a bounded channel with the specified capacity
///
/// - `send()` blocks when the queue is full
/// - `try_send()` returns `Err` immediately if full
pub fn create_bounded<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    bounded(capacity)
}

/// Snapshot of a channel's occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelStats {
    pub capacity: usize,
    pub len: usize,
}

impl ChannelStats {
    pub fn from_sender<T>(sender: &Sender<T>) -> Self {
        Self {
            capacity: sender.capacity().unwrap_or(0),
            len: sender.len(),
        }
    }

    pub fn is_full(&self) -> bool {
        self.capacity > 0 && self.len >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
