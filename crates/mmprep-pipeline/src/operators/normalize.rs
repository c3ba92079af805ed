// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! `Normalize`: per-channel `(x - mean) * scale / stddev` on 3-channel f32 images.

use std::any::Any;

use ndarray::{ArrayD, Axis};

use mmprep_structures::{DataType, OpSpec, PipelineError, PipelineResult, Tensor, TensorLayout, TensorList};

use super::kernels::{check_outputs, map_samples, read_input, sample_view, write_output};
use crate::operator::Operator;
use crate::workspace::Workspace;

pub const RGB_CHANNELS: usize = 3;

/// Parsed arguments of `Normalize`; the divisor is folded into `factor`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizeArgs {
    pub mean: [f32; RGB_CHANNELS],
    /// `scale / stddev[c]`
    pub factor: [f32; RGB_CHANNELS],
}

impl NormalizeArgs {
    pub fn parse(spec: &OpSpec, ws: &Workspace) -> PipelineResult<Self> {
        let mean = ws.arg::<Vec<f32>>(spec, "mean")?;
        let stddev = ws.arg::<Vec<f32>>(spec, "stddev")?;
        let (Ok(mean), Ok(stddev)) = (
            <[f32; RGB_CHANNELS]>::try_from(mean.as_slice()),
            <[f32; RGB_CHANNELS]>::try_from(stddev.as_slice()),
        ) else {
            return Err(PipelineError::Argument(format!(
                "{}: mean and stddev should have {} elements",
                spec.name(),
                RGB_CHANNELS
            )));
        };

        if let Some(m) = mean.iter().find(|m| !(0.0..=1.0).contains(*m)) {
            return Err(PipelineError::Argument(format!(
                "{}: mean must be in [0, 1], got {}",
                spec.name(),
                m
            )));
        }
        if stddev.iter().any(|s| *s <= 0.0) {
            return Err(PipelineError::Argument(format!(
                "{}: stddev must be larger than zero",
                spec.name()
            )));
        }

        let scale = ws.try_arg::<f32>(spec, "scale")?.unwrap_or(1.0);
        Ok(Self {
            mean,
            factor: stddev.map(|s| scale / s),
        })
    }
}

fn channel_axis(layout: TensorLayout) -> PipelineResult<Axis> {
    match layout {
        TensorLayout::Nchw => Ok(Axis(1)),
        TensorLayout::Nhwc => Ok(Axis(3)),
        TensorLayout::Plain => Err(PipelineError::Tensor(
            "Normalize needs an NCHW or NHWC tensor".to_string(),
        )),
    }
}

/// Normalize a batch of samples in place.
pub(crate) fn normalize_in_place(
    samples: &mut ArrayD<f32>,
    layout: TensorLayout,
    args: &NormalizeArgs,
) -> PipelineResult<()> {
    let axis = channel_axis(layout)?;
    if samples.ndim() != 4 || samples.len_of(axis) != RGB_CHANNELS {
        return Err(PipelineError::Tensor(format!(
            "Normalize expects {} channels, got shape {:?}",
            RGB_CHANNELS,
            samples.shape()
        )));
    }
    for (c, mut channel) in samples.axis_iter_mut(axis).enumerate() {
        let (mean, factor) = (args.mean[c], args.factor[c]);
        channel.mapv_inplace(|x| (x - mean) * factor);
    }
    Ok(())
}

pub struct Normalize {
    spec: OpSpec,
}

impl Normalize {
    pub fn new(spec: OpSpec) -> Self {
        Self { spec }
    }
}

fn check_input(spec: &OpSpec, input: &TensorList) -> PipelineResult<TensorLayout> {
    let first = input
        .get(0)
        .ok_or_else(|| PipelineError::operator(spec.name(), "Illegal input: tensor list is empty"))?;
    if first.dtype() != DataType::F32 {
        return Err(PipelineError::Tensor(format!(
            "the input of {} should be F32, got {:?}",
            spec.name(),
            first.dtype()
        )));
    }
    Ok(first.layout())
}

impl Operator for Normalize {
    fn spec(&self) -> &OpSpec {
        &self.spec
    }

    fn run(&self, ws: &Workspace) -> PipelineResult<()> {
        check_outputs(&self.spec, ws)?;
        let input = read_input(&self.spec, ws, 0)?;
        let layout = check_input(&self.spec, &input)?;
        let args = NormalizeArgs::parse(&self.spec, ws)?;

        let arrays = map_samples(ws.pool(), &input, move |tensor, range| {
            let data = tensor
                .as_f32()
                .ok_or_else(|| PipelineError::Tensor("Normalize expects F32 input".to_string()))?;
            let mut samples = sample_view(data, range).to_owned();
            normalize_in_place(&mut samples, tensor.layout(), &args)?;
            Ok(samples)
        })?;

        write_output(ws, 0, arrays.into_iter().map(|a| Tensor::new(a, layout)).collect())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
