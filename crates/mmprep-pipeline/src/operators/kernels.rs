// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Helpers shared by the built-in operators: buffer access and sample-parallel
//! execution on the worker pool.

use std::ops::Range;
use std::sync::Arc;

use ndarray::{ArcArray, ArrayD, ArrayViewD, Axis, IxDyn, Slice};

use mmprep_runtime::{balance, WorkerPool};
use mmprep_structures::{ImageDims, OpSpec, PipelineError, PipelineResult, Tensor, TensorList};

use crate::workspace::Workspace;

/// Snapshot of input `index`. Tensors are reference counted, so this is cheap.
pub(crate) fn read_input(spec: &OpSpec, ws: &Workspace, index: usize) -> PipelineResult<TensorList> {
    let input = ws.input(index)?.read().clone();
    if input.is_empty() {
        return Err(PipelineError::operator(spec.name(), "Illegal input: tensor list is empty"));
    }
    Ok(input)
}

pub(crate) fn write_output(ws: &Workspace, index: usize, list: TensorList) -> PipelineResult<()> {
    *ws.output(index)?.write() = list;
    Ok(())
}

pub(crate) fn check_outputs(spec: &OpSpec, ws: &Workspace) -> PipelineResult<()> {
    if ws.num_outputs() != spec.num_outputs() {
        return Err(PipelineError::operator(
            spec.name(),
            format!(
                "the number of outputs is inconsistent: {} bound, {} declared",
                ws.num_outputs(),
                spec.num_outputs()
            ),
        ));
    }
    Ok(())
}

/// Image dimensions of `tensor`; an empty plane or channel axis is an error.
pub(crate) fn image_dims(spec_name: &str, tensor: &Tensor) -> PipelineResult<ImageDims> {
    let dims = tensor.image_dims()?;
    if dims.height == 0 || dims.width == 0 || dims.channels == 0 {
        return Err(PipelineError::Tensor(format!(
            "{} got an empty image, shape {:?}",
            spec_name,
            tensor.shape()
        )));
    }
    Ok(dims)
}

/// Samples `range` of a batched array, along axis 0.
pub(crate) fn sample_view<A>(array: &ArcArray<A, IxDyn>, range: Range<usize>) -> ArrayViewD<'_, A> {
    array.slice_axis(Axis(0), Slice::from(range))
}

/// Run `kernel` over every tensor of `input`, each tensor's samples split
/// evenly across the pool, and stitch the partial results back along axis 0.
///
/// Results are returned per tensor, in input order.
pub(crate) fn map_samples<F>(
    pool: &WorkerPool,
    input: &TensorList,
    kernel: F,
) -> PipelineResult<Vec<ArrayD<f32>>>
where
    F: Fn(&Tensor, Range<usize>) -> PipelineResult<ArrayD<f32>> + Send + Sync + 'static,
{
    let kernel = Arc::new(kernel);
    let mut batch = pool.batch::<(usize, ArrayD<f32>)>();
    for (index, tensor) in input.iter().enumerate() {
        let samples = tensor.shape().first().copied().unwrap_or(0);
        for range in balance::ranges(samples, pool.num_threads())? {
            if range.is_empty() {
                break;
            }
            let kernel = Arc::clone(&kernel);
            let tensor = tensor.clone();
            batch.add_task(move |_| Ok((index, kernel(&tensor, range)?)));
        }
    }
    batch.run_all(true);
    let parts = batch.collect()?;

    (0..input.len())
        .map(|index| {
            let views: Vec<ArrayViewD<'_, f32>> = parts
                .iter()
                .filter(|(owner, _)| *owner == index)
                .map(|(_, part)| part.view())
                .collect();
            if views.is_empty() {
                return Err(PipelineError::Tensor(format!("tensor {} has no samples", index)));
            }
            ndarray::concatenate(Axis(0), &views).map_err(|e| PipelineError::Tensor(e.to_string()))
        })
        .collect()
}
