// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Built-in operators.
//!
//! Kernels favour clarity over speed; the pipeline machinery around them is
//! what this crate is about.

mod external_source;
mod fused;
pub(crate) mod kernels;
mod normalize;
mod resize_crop;
mod to_tensor;

pub use external_source::ExternalSource;
pub use fused::ToTensorResizeCropNormalize;
pub use normalize::{Normalize, NormalizeArgs};
pub use resize_crop::{InterpolationMode, ResizeCrop, ResizeCropArgs, RoundMode};
pub use to_tensor::{ToTensor, ToTensorArgs};

use mmprep_structures::PipelineResult;

use crate::operator::Operator;
use crate::registry::OperatorRegistry;

pub const EXTERNAL_SOURCE: &str = "ExternalSource";
pub const TO_TENSOR: &str = "ToTensor";
pub const RESIZE_CROP: &str = "ResizeCrop";
pub const NORMALIZE: &str = "Normalize";
pub const TO_TENSOR_RESIZE_CROP_NORMALIZE: &str = "ToTensorResizeCropNormalize";

/// Register every built-in operator and fusion operator.
pub fn register_builtin(registry: &mut OperatorRegistry) -> PipelineResult<()> {
    registry.register(EXTERNAL_SOURCE, |spec| {
        Ok(Box::new(ExternalSource::new(spec)) as Box<dyn Operator>)
    })?;
    registry.register(TO_TENSOR, |spec| Ok(Box::new(ToTensor::new(spec)) as Box<dyn Operator>))?;
    registry.register(RESIZE_CROP, |spec| {
        Ok(Box::new(ResizeCrop::new(spec)) as Box<dyn Operator>)
    })?;
    registry.register(NORMALIZE, |spec| Ok(Box::new(Normalize::new(spec)) as Box<dyn Operator>))?;
    registry.register_fusion(TO_TENSOR_RESIZE_CROP_NORMALIZE, |spec| {
        Ok(Box::new(ToTensorResizeCropNormalize::new(spec)) as Box<dyn Operator>)
    })?;
    Ok(())
}
