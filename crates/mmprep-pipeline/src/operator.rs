// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! The contract every graph node implements.

use std::any::Any;
use std::sync::Arc;

use mmprep_structures::{OpSpec, PipelineResult};

use crate::workspace::Workspace;

/// One operator instance bound to its specification.
///
/// Operators are shared between run slots, so `run` takes `&self`; per-run
/// buffers live in the [`Workspace`]. Arguments are re-read from the spec (or
/// the bound argument-input) on every run.
pub trait Operator: Send + Sync {
    fn spec(&self) -> &OpSpec;

    /// Execute against one slot's working context.
    fn run(&self, ws: &Workspace) -> PipelineResult<()>;

    /// Used to reach concrete operators (e.g. feeding an `ExternalSource`).
    fn as_any(&self) -> &dyn Any;

    fn name(&self) -> &str {
        self.spec().name()
    }
}

/// Constructor stored in the [`crate::OperatorRegistry`]
pub type OperatorFactory = Arc<dyn Fn(OpSpec) -> PipelineResult<Box<dyn Operator>> + Send + Sync>;
