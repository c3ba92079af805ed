// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! `ResizeCrop`: resize an f32 NCHW batch and cut a window out of the result.
//!
//! Only the cropped window is ever computed. Source coordinates use half-pixel
//! centres, matching torch's `align_corners=False`.

use std::any::Any;

use ndarray::{Array4, ArrayD, ArrayViewD, Ix4};

use mmprep_structures::{DataType, OpSpec, PipelineError, PipelineResult, Tensor, TensorLayout, TensorList};

use super::kernels::{check_outputs, image_dims, map_samples, read_input, sample_view, write_output};
use crate::operator::Operator;
use crate::workspace::Workspace;

pub const MIN_EXTENT: i64 = 10;
pub const MAX_EXTENT: i64 = 8192;

const CUBIC_A: f32 = -0.75;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterpolationMode {
    #[default]
    Bilinear,
    Bicubic,
}

/// How the crop window origin is snapped to the pixel grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoundMode {
    #[default]
    Round,
    Truncate,
}

impl RoundMode {
    fn apply(self, v: f64) -> usize {
        match self {
            RoundMode::Round => v.round() as usize,
            RoundMode::Truncate => v as usize,
        }
    }
}

/// Parsed arguments of `ResizeCrop`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizeCropArgs {
    pub resize_height: usize,
    pub resize_width: usize,
    pub crop_height: usize,
    pub crop_width: usize,
    pub mode: InterpolationMode,
    pub crop_pos_x: f32,
    pub crop_pos_y: f32,
    pub round: RoundMode,
}

fn extent_pair(spec: &OpSpec, ws: &Workspace, name: &str) -> PipelineResult<(usize, usize)> {
    let values = ws.arg::<Vec<i64>>(spec, name)?;
    let &[height, width] = values.as_slice() else {
        return Err(PipelineError::operator(
            spec.name(),
            format!("'{}' argument should have 2 elements [height, width]", name),
        ));
    };
    for v in [height, width] {
        if !(MIN_EXTENT..=MAX_EXTENT).contains(&v) {
            return Err(PipelineError::operator(
                spec.name(),
                format!(
                    "{} size should be within {}x{} to {}x{}, got ({}, {})",
                    name, MIN_EXTENT, MIN_EXTENT, MAX_EXTENT, MAX_EXTENT, height, width
                ),
            ));
        }
    }
    Ok((height as usize, width as usize))
}

impl ResizeCropArgs {
    pub fn parse(spec: &OpSpec, ws: &Workspace) -> PipelineResult<Self> {
        let (resize_height, resize_width) = extent_pair(spec, ws, "resize")?;
        let (crop_height, crop_width) = extent_pair(spec, ws, "crop")?;
        if crop_height > resize_height || crop_width > resize_width {
            return Err(PipelineError::operator(
                spec.name(),
                "crop size can not be greater than resize size",
            ));
        }

        let mode = match ws.try_arg::<String>(spec, "interpolation_mode")?.as_deref() {
            None | Some("bilinear") => InterpolationMode::Bilinear,
            Some("bicubic") => InterpolationMode::Bicubic,
            Some(other) => {
                return Err(PipelineError::operator(
                    spec.name(),
                    format!("unknown interpolation mode '{}'", other),
                ))
            }
        };

        let crop_pos_x = ws.try_arg::<f32>(spec, "crop_pos_x")?.unwrap_or(0.5);
        let crop_pos_y = ws.try_arg::<f32>(spec, "crop_pos_y")?.unwrap_or(0.5);
        if !(0.0..=1.0).contains(&crop_pos_x) || !(0.0..=1.0).contains(&crop_pos_y) {
            return Err(PipelineError::operator(
                spec.name(),
                format!(
                    "crop_pos_x({}) or crop_pos_y({}) is out of range [0, 1]",
                    crop_pos_x, crop_pos_y
                ),
            ));
        }

        let round = match ws.try_arg::<String>(spec, "round_mode")?.as_deref() {
            None | Some("round") => RoundMode::Round,
            Some("truncate") => RoundMode::Truncate,
            Some(other) => {
                return Err(PipelineError::operator(
                    spec.name(),
                    format!("unsupported round mode '{}'", other),
                ))
            }
        };

        Ok(Self {
            resize_height,
            resize_width,
            crop_height,
            crop_width,
            mode,
            crop_pos_x,
            crop_pos_y,
            round,
        })
    }

    /// Top-left corner of the crop window in resized coordinates, as (y, x).
    pub fn crop_origin(&self) -> (usize, usize) {
        let y = self
            .round
            .apply((self.resize_height - self.crop_height) as f64 * f64::from(self.crop_pos_y));
        let x = self
            .round
            .apply((self.resize_width - self.crop_width) as f64 * f64::from(self.crop_pos_x));
        (y, x)
    }
}

/// Four source indices and weights for one output coordinate.
/// Bilinear taps only use the first two entries.
#[derive(Debug, Clone, Copy)]
struct Taps {
    index: [usize; 4],
    weight: [f32; 4],
}

fn cubic_near(x: f32) -> f32 {
    ((CUBIC_A + 2.0) * x - (CUBIC_A + 3.0)) * x * x + 1.0
}

fn cubic_far(x: f32) -> f32 {
    ((CUBIC_A * x - 5.0 * CUBIC_A) * x + 8.0 * CUBIC_A) * x - 4.0 * CUBIC_A
}

/// Taps along one axis for output positions `offset..offset + len` of a
/// `resized`-long axis sampled from a `source`-long one.
fn axis_taps(mode: InterpolationMode, source: usize, resized: usize, offset: usize, len: usize) -> Vec<Taps> {
    let scale = source as f32 / resized as f32;
    let last = source.saturating_sub(1) as isize;
    let clamp = |i: isize| i.clamp(0, last) as usize;

    (offset..offset + len)
        .map(|dst| {
            let centre = (dst as f32 + 0.5) * scale - 0.5;
            match mode {
                InterpolationMode::Bilinear => {
                    let src = centre.max(0.0);
                    let i0 = (src.floor() as isize).min(last);
                    let lambda = src - i0 as f32;
                    Taps {
                        index: [clamp(i0), clamp(i0 + 1), 0, 0],
                        weight: [1.0 - lambda, lambda, 0.0, 0.0],
                    }
                }
                InterpolationMode::Bicubic => {
                    let floor = centre.floor();
                    let t = centre - floor;
                    let i = floor as isize;
                    Taps {
                        index: [clamp(i - 1), clamp(i), clamp(i + 1), clamp(i + 2)],
                        weight: [cubic_far(t + 1.0), cubic_near(t), cubic_near(1.0 - t), cubic_far(2.0 - t)],
                    }
                }
            }
        })
        .collect()
}

/// Resize-and-crop a batch of NCHW samples.
pub(crate) fn resize_crop_samples(input: ArrayViewD<'_, f32>, args: &ResizeCropArgs) -> PipelineResult<ArrayD<f32>> {
    let input = input
        .into_dimensionality::<Ix4>()
        .map_err(|e| PipelineError::Tensor(format!("ResizeCrop expects 4-D input: {}", e)))?;
    let (batch, channels, height, width) = input.dim();
    let (origin_y, origin_x) = args.crop_origin();
    let rows = axis_taps(args.mode, height, args.resize_height, origin_y, args.crop_height);
    let cols = axis_taps(args.mode, width, args.resize_width, origin_x, args.crop_width);

    let mut out = Array4::<f32>::zeros((batch, channels, args.crop_height, args.crop_width));
    for ((n, c, oy, ox), value) in out.indexed_iter_mut() {
        let row = &rows[oy];
        let col = &cols[ox];
        let mut acc = 0.0f32;
        for (iy, wy) in row.index.iter().zip(row.weight.iter()) {
            if *wy == 0.0 {
                continue;
            }
            let mut line = 0.0f32;
            for (ix, wx) in col.index.iter().zip(col.weight.iter()) {
                line += wx * input[[n, c, *iy, *ix]];
            }
            acc += wy * line;
        }
        *value = acc;
    }
    Ok(out.into_dyn())
}

pub(crate) fn f32_nchw<'t>(spec_name: &str, tensor: &'t Tensor) -> PipelineResult<&'t ndarray::ArcArray<f32, ndarray::IxDyn>> {
    if tensor.layout() != TensorLayout::Nchw {
        return Err(PipelineError::Tensor(format!(
            "{} only supports NCHW layout for f32 input",
            spec_name
        )));
    }
    image_dims(spec_name, tensor)?;
    tensor.as_f32().ok_or_else(|| {
        PipelineError::Tensor(format!("{} expects F32 input, got {:?}", spec_name, tensor.dtype()))
    })
}

pub struct ResizeCrop {
    spec: OpSpec,
}

impl ResizeCrop {
    pub fn new(spec: OpSpec) -> Self {
        Self { spec }
    }
}

fn check_input(spec: &OpSpec, input: &TensorList) -> PipelineResult<()> {
    match input.get(0) {
        Some(first) if first.dtype() == DataType::F32 => Ok(()),
        Some(first) => Err(PipelineError::Tensor(format!(
            "{} only supports F32 input, got {:?}",
            spec.name(),
            first.dtype()
        ))),
        None => Err(PipelineError::operator(spec.name(), "Illegal input: tensor list is empty")),
    }
}

impl Operator for ResizeCrop {
    fn spec(&self) -> &OpSpec {
        &self.spec
    }

    fn run(&self, ws: &Workspace) -> PipelineResult<()> {
        check_outputs(&self.spec, ws)?;
        let input = read_input(&self.spec, ws, 0)?;
        check_input(&self.spec, &input)?;
        let args = ResizeCropArgs::parse(&self.spec, ws)?;

        let name = self.spec.name().to_string();
        let arrays = map_samples(ws.pool(), &input, move |tensor, range| {
            let data = f32_nchw(&name, tensor)?;
            resize_crop_samples(sample_view(data, range), &args)
        })?;

        write_output(
            ws,
            0,
            arrays
                .into_iter()
                .map(|a| Tensor::new(a, TensorLayout::Nchw))
                .collect(),
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
