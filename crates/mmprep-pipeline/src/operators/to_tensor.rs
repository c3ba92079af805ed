// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! `ToTensor`: u8 image batch -> f32 in `[0, 1]`, optionally changing layout.

use std::any::Any;

use ndarray::{ArrayD, ArrayViewD, IxDyn};

use mmprep_structures::{DataType, OpSpec, PipelineError, PipelineResult, Tensor, TensorLayout, TensorList};

use super::kernels::{check_outputs, image_dims, map_samples, read_input, sample_view, write_output};
use crate::operator::Operator;
use crate::workspace::Workspace;

const PIXEL_SCALE: f32 = 1.0 / 255.0;

/// Parsed arguments of `ToTensor`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToTensorArgs {
    /// Requested output layout (`layout` argument: 0 = NCHW, 1 = NHWC)
    pub layout: TensorLayout,
}

impl ToTensorArgs {
    pub fn parse(spec: &OpSpec, ws: &Workspace, input: &TensorList) -> PipelineResult<Self> {
        let layout = TensorLayout::from_code(ws.arg::<i64>(spec, "layout")?)?;
        check_image_input(spec, input, DataType::U8)?;
        Ok(Self { layout })
    }
}

/// The first tensor decides dtype and layout for the whole list.
pub(crate) fn check_image_input(spec: &OpSpec, input: &TensorList, dtype: DataType) -> PipelineResult<()> {
    let first = input
        .get(0)
        .ok_or_else(|| PipelineError::operator(spec.name(), "Illegal input: tensor list is empty"))?;
    if first.dtype() != dtype {
        return Err(PipelineError::Tensor(format!(
            "{} expects {:?} input, got {:?}",
            spec.name(),
            dtype,
            first.dtype()
        )));
    }
    if !matches!(first.layout(), TensorLayout::Nchw | TensorLayout::Nhwc) {
        return Err(PipelineError::Tensor(format!(
            "{} input layout should be NHWC or NCHW",
            spec.name()
        )));
    }
    Ok(())
}

/// Scale to `[0, 1]` and move axes from `from` to `to`.
pub(crate) fn to_tensor_samples(input: ArrayViewD<'_, u8>, from: TensorLayout, to: TensorLayout) -> ArrayD<f32> {
    let scaled = input.mapv(|v| f32::from(v) * PIXEL_SCALE);
    match (from, to) {
        (TensorLayout::Nhwc, TensorLayout::Nchw) => scaled
            .permuted_axes(IxDyn(&[0, 3, 1, 2]))
            .as_standard_layout()
            .into_owned(),
        (TensorLayout::Nchw, TensorLayout::Nhwc) => scaled
            .permuted_axes(IxDyn(&[0, 2, 3, 1]))
            .as_standard_layout()
            .into_owned(),
        _ => scaled,
    }
}

pub(crate) fn u8_image<'t>(spec_name: &str, tensor: &'t Tensor) -> PipelineResult<&'t ndarray::ArcArray<u8, IxDyn>> {
    image_dims(spec_name, tensor)?;
    tensor.as_u8().ok_or_else(|| {
        PipelineError::Tensor(format!("{} expects U8 input, got {:?}", spec_name, tensor.dtype()))
    })
}

pub struct ToTensor {
    spec: OpSpec,
}

impl ToTensor {
    pub fn new(spec: OpSpec) -> Self {
        Self { spec }
    }
}

impl Operator for ToTensor {
    fn spec(&self) -> &OpSpec {
        &self.spec
    }

    fn run(&self, ws: &Workspace) -> PipelineResult<()> {
        check_outputs(&self.spec, ws)?;
        let input = read_input(&self.spec, ws, 0)?;
        let args = ToTensorArgs::parse(&self.spec, ws, &input)?;

        let name = self.spec.name().to_string();
        let to = args.layout;
        let arrays = map_samples(ws.pool(), &input, move |tensor, range| {
            let data = u8_image(&name, tensor)?;
            Ok(to_tensor_samples(sample_view(data, range), tensor.layout(), to))
        })?;

        write_output(ws, 0, arrays.into_iter().map(|a| Tensor::new(a, to)).collect())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
