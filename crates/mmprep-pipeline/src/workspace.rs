// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Working context of one operator within one run slot.

use std::sync::Arc;

use mmprep_runtime::WorkerPool;
use mmprep_structures::{ArgValue, OpSpec, PipelineError, PipelineResult, SharedTensorList};

/// Buffers bound to one (run slot, operator) pair plus the shared pool.
///
/// Assembled once when the executor is built and reused by every run of the
/// slot. Handles are `Arc`s into the buffer rings, so the same interior buffer
/// may appear in several workspaces.
#[derive(Clone)]
pub struct Workspace {
    pool: Arc<WorkerPool>,
    inputs: Vec<SharedTensorList>,
    outputs: Vec<SharedTensorList>,
    /// (argument name, buffer)
    arg_inputs: Vec<(String, SharedTensorList)>,
    max_batch_size: usize,
}

impl Workspace {
    pub fn new(pool: Arc<WorkerPool>, max_batch_size: usize) -> Self {
        Self {
            pool,
            inputs: Vec::new(),
            outputs: Vec::new(),
            arg_inputs: Vec::new(),
            max_batch_size,
        }
    }

    pub fn add_input(&mut self, buffer: SharedTensorList) {
        self.inputs.push(buffer);
    }

    pub fn add_output(&mut self, buffer: SharedTensorList) {
        self.outputs.push(buffer);
    }

    pub fn add_arg_input(&mut self, name: impl Into<String>, buffer: SharedTensorList) {
        self.arg_inputs.push((name.into(), buffer));
    }

    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    pub fn num_arg_inputs(&self) -> usize {
        self.arg_inputs.len()
    }

    pub fn input(&self, index: usize) -> PipelineResult<&SharedTensorList> {
        self.inputs.get(index).ok_or_else(|| {
            PipelineError::State(format!(
                "input {} out of range ({} bound)",
                index,
                self.inputs.len()
            ))
        })
    }

    pub fn output(&self, index: usize) -> PipelineResult<&SharedTensorList> {
        self.outputs.get(index).ok_or_else(|| {
            PipelineError::State(format!(
                "output {} out of range ({} bound)",
                index,
                self.outputs.len()
            ))
        })
    }

    /// Buffer bound to the named argument-input, if any.
    pub fn arg_input(&self, name: &str) -> Option<&SharedTensorList> {
        self.arg_inputs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, buffer)| buffer)
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn num_threads(&self) -> usize {
        self.pool.num_threads()
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Resolve a required argument: the bound argument-input wins over the literal.
    pub fn arg<T: ArgValue>(&self, spec: &OpSpec, name: &str) -> PipelineResult<T> {
        match self.arg_input(name) {
            Some(buffer) => decode_arg_input(spec, name, buffer),
            None => spec.arg(name),
        }
    }

    /// Optional form of [`Workspace::arg`].
    pub fn try_arg<T: ArgValue>(&self, spec: &OpSpec, name: &str) -> PipelineResult<Option<T>> {
        match self.arg_input(name) {
            Some(buffer) => decode_arg_input(spec, name, buffer).map(Some),
            None => spec.try_arg(name),
        }
    }
}

fn decode_arg_input<T: ArgValue>(
    spec: &OpSpec,
    name: &str,
    buffer: &SharedTensorList,
) -> PipelineResult<T> {
    T::from_tensors(&buffer.read()).ok_or_else(|| {
        PipelineError::Argument(format!(
            "argument-input '{}' of {} does not hold a {}",
            name,
            spec.name(),
            T::TYPE_NAME
        ))
    })
}
