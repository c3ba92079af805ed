// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! `ToTensorResizeCropNormalize`: the `ToTensor -> ResizeCrop -> Normalize`
//! chain as one operator.
//!
//! Each sample range goes through all three stages inside a single pool task,
//! so the intermediate f32 tensors never land in a graph buffer.

use std::any::Any;

use mmprep_structures::{OpSpec, PipelineResult, Tensor, TensorLayout};

use super::kernels::{check_outputs, map_samples, read_input, sample_view, write_output};
use super::normalize::{normalize_in_place, NormalizeArgs};
use super::resize_crop::{resize_crop_samples, ResizeCropArgs};
use super::to_tensor::{to_tensor_samples, u8_image, ToTensorArgs};
use crate::operator::Operator;
use crate::workspace::Workspace;

pub struct ToTensorResizeCropNormalize {
    spec: OpSpec,
}

impl ToTensorResizeCropNormalize {
    pub fn new(spec: OpSpec) -> Self {
        Self { spec }
    }
}

impl Operator for ToTensorResizeCropNormalize {
    fn spec(&self) -> &OpSpec {
        &self.spec
    }

    fn run(&self, ws: &Workspace) -> PipelineResult<()> {
        check_outputs(&self.spec, ws)?;
        let input = read_input(&self.spec, ws, 0)?;
        let layout = ToTensorArgs::parse(&self.spec, ws, &input)?.layout;
        let resize_crop = ResizeCropArgs::parse(&self.spec, ws)?;
        let normalize = NormalizeArgs::parse(&self.spec, ws)?;

        let name = self.spec.name().to_string();
        let arrays = map_samples(ws.pool(), &input, move |tensor, range| {
            let data = u8_image(&name, tensor)?;
            let planar = to_tensor_samples(sample_view(data, range), tensor.layout(), TensorLayout::Nchw);
            let mut cropped = resize_crop_samples(planar.view(), &resize_crop)?;
            normalize_in_place(&mut cropped, TensorLayout::Nchw, &normalize)?;
            if layout == TensorLayout::Nhwc {
                cropped = cropped
                    .permuted_axes(ndarray::IxDyn(&[0, 2, 3, 1]))
                    .as_standard_layout()
                    .into_owned();
            }
            Ok(cropped)
        })?;

        write_output(ws, 0, arrays.into_iter().map(|a| Tensor::new(a, layout)).collect())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
