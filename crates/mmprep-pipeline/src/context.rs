// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Shared construction context for pipelines.

use std::time::Duration;

use mmprep_structures::PipelineResult;

use crate::registry::OperatorRegistry;

/// Wait window of the non-blocking slot acquisitions
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_millis(200);

/// Everything a pipeline needs that outlives a single pipeline: the operator
/// registry and the slot acquisition window. Build once, share by `Arc`.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub registry: OperatorRegistry,
    pub acquire_timeout: Duration,
}

impl PipelineContext {
    pub fn new(registry: OperatorRegistry) -> Self {
        Self {
            registry,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }

    pub fn with_builtin_ops() -> PipelineResult<Self> {
        Ok(Self::new(OperatorRegistry::with_builtin_ops()?))
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}
