// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Tensor storage handed between operators.
//!
//! Arrays are held as `ndarray::ArcArray` so that moving a tensor between
//! worker tasks or sharing a fed input is a reference-count bump, not a copy.

use std::sync::Arc;

use ndarray::{ArcArray, ArrayD, IxDyn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{PipelineError, PipelineResult};

/// Memory layout of a 4-D image tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TensorLayout {
    /// Batch, channels, height, width
    Nchw,
    /// Batch, height, width, channels
    Nhwc,
    /// No image semantics attached
    #[default]
    Plain,
}

impl TensorLayout {
    /// Decode the integer form used by the `layout` operator argument.
    pub fn from_code(code: i64) -> PipelineResult<Self> {
        match code {
            0 => Ok(TensorLayout::Nchw),
            1 => Ok(TensorLayout::Nhwc),
            other => Err(PipelineError::Argument(format!(
                "layout must be 0 (NCHW) or 1 (NHWC), got {}",
                other
            ))),
        }
    }

    pub fn code(&self) -> Option<i64> {
        match self {
            TensorLayout::Nchw => Some(0),
            TensorLayout::Nhwc => Some(1),
            TensorLayout::Plain => None,
        }
    }
}

/// Element type of a [`TensorData`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    U8,
    I64,
    F32,
}

/// Closed set of element types a tensor may hold.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    U8(ArcArray<u8, IxDyn>),
    I64(ArcArray<i64, IxDyn>),
    F32(ArcArray<f32, IxDyn>),
}

impl TensorData {
    pub fn dtype(&self) -> DataType {
        match self {
            TensorData::U8(_) => DataType::U8,
            TensorData::I64(_) => DataType::I64,
            TensorData::F32(_) => DataType::F32,
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            TensorData::U8(a) => a.shape(),
            TensorData::I64(a) => a.shape(),
            TensorData::F32(a) => a.shape(),
        }
    }

    /// Copy the elements into freshly owned storage.
    pub fn deep_copy(&self) -> TensorData {
        match self {
            TensorData::U8(a) => TensorData::U8(a.to_owned().into_shared()),
            TensorData::I64(a) => TensorData::I64(a.to_owned().into_shared()),
            TensorData::F32(a) => TensorData::F32(a.to_owned().into_shared()),
        }
    }
}

impl From<ArrayD<u8>> for TensorData {
    fn from(array: ArrayD<u8>) -> Self {
        TensorData::U8(array.into_shared())
    }
}

impl From<ArrayD<i64>> for TensorData {
    fn from(array: ArrayD<i64>) -> Self {
        TensorData::I64(array.into_shared())
    }
}

impl From<ArrayD<f32>> for TensorData {
    fn from(array: ArrayD<f32>) -> Self {
        TensorData::F32(array.into_shared())
    }
}

/// Channel and spatial extents of a 4-D image tensor, independent of layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDims {
    pub batch: usize,
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

/// One tensor plus its layout tag.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: TensorData,
    layout: TensorLayout,
}

impl Tensor {
    pub fn new(data: impl Into<TensorData>, layout: TensorLayout) -> Self {
        Tensor {
            data: data.into(),
            layout,
        }
    }

    /// A 1-element-per-value `I64` tensor, used for argument inputs.
    pub fn from_i64_slice(values: &[i64]) -> Self {
        let array = ArrayD::from_shape_vec(IxDyn(&[values.len()]), values.to_vec())
            .unwrap_or_else(|_| ArrayD::zeros(IxDyn(&[0])));
        Tensor::new(array, TensorLayout::Plain)
    }

    /// A 1-element-per-value `F32` tensor, used for argument inputs.
    pub fn from_f32_slice(values: &[f32]) -> Self {
        let array = ArrayD::from_shape_vec(IxDyn(&[values.len()]), values.to_vec())
            .unwrap_or_else(|_| ArrayD::zeros(IxDyn(&[0])));
        Tensor::new(array, TensorLayout::Plain)
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn layout(&self) -> TensorLayout {
        self.layout
    }

    pub fn dtype(&self) -> DataType {
        self.data.dtype()
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn as_u8(&self) -> Option<&ArcArray<u8, IxDyn>> {
        match &self.data {
            TensorData::U8(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<&ArcArray<i64, IxDyn>> {
        match &self.data {
            TensorData::I64(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<&ArcArray<f32, IxDyn>> {
        match &self.data {
            TensorData::F32(a) => Some(a),
            _ => None,
        }
    }

    pub fn deep_copy(&self) -> Tensor {
        Tensor {
            data: self.data.deep_copy(),
            layout: self.layout,
        }
    }

    /// Interpret the shape according to the layout tag.
    ///
    /// Fails for `Plain` tensors and for anything that is not 4-D.
    pub fn image_dims(&self) -> PipelineResult<ImageDims> {
        let shape = self.shape();
        if shape.len() != 4 {
            return Err(PipelineError::Tensor(format!(
                "expected a 4-D image tensor, got shape {:?}",
                shape
            )));
        }
        match self.layout {
            TensorLayout::Nchw => Ok(ImageDims {
                batch: shape[0],
                channels: shape[1],
                height: shape[2],
                width: shape[3],
            }),
            TensorLayout::Nhwc => Ok(ImageDims {
                batch: shape[0],
                height: shape[1],
                width: shape[2],
                channels: shape[3],
            }),
            TensorLayout::Plain => Err(PipelineError::Tensor(
                "tensor has no image layout".to_string(),
            )),
        }
    }
}

/// An ordered batch of tensors flowing along one data node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TensorList {
    tensors: Vec<Tensor>,
}

impl TensorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tensors(tensors: Vec<Tensor>) -> Self {
        TensorList { tensors }
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn push(&mut self, tensor: Tensor) {
        self.tensors.push(tensor);
    }

    pub fn get(&self, index: usize) -> Option<&Tensor> {
        self.tensors.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tensor> {
        self.tensors.iter()
    }

    pub fn tensors(&self) -> &[Tensor] {
        &self.tensors
    }

    /// Swap in a new batch, keeping the allocation of the list itself.
    pub fn replace(&mut self, tensors: Vec<Tensor>) {
        self.tensors = tensors;
    }

    pub fn clear(&mut self) {
        self.tensors.clear();
    }

    /// Layout of the batch, taken from the first tensor.
    pub fn layout(&self) -> Option<TensorLayout> {
        self.tensors.first().map(Tensor::layout)
    }

    pub fn deep_copy(&self) -> TensorList {
        TensorList {
            tensors: self.tensors.iter().map(Tensor::deep_copy).collect(),
        }
    }
}

impl FromIterator<Tensor> for TensorList {
    fn from_iter<I: IntoIterator<Item = Tensor>>(iter: I) -> Self {
        TensorList {
            tensors: iter.into_iter().collect(),
        }
    }
}

/// Thread-safe handle to one data node buffer
pub type SharedTensorList = Arc<RwLock<TensorList>>;

pub fn shared_tensor_list(list: TensorList) -> SharedTensorList {
    Arc::new(RwLock::new(list))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(layout: TensorLayout, shape: &[usize]) -> Tensor {
        Tensor::new(ArrayD::<u8>::zeros(IxDyn(shape)), layout)
    }

    #[test]
    fn test_image_dims_follow_layout() {
        let nchw = image(TensorLayout::Nchw, &[1, 3, 20, 30]);
        let dims = nchw.image_dims().unwrap();
        assert_eq!((dims.channels, dims.height, dims.width), (3, 20, 30));

        let nhwc = image(TensorLayout::Nhwc, &[1, 20, 30, 3]);
        let dims = nhwc.image_dims().unwrap();
        assert_eq!((dims.channels, dims.height, dims.width), (3, 20, 30));
    }

    #[test]
    fn test_image_dims_rejects_plain_and_wrong_rank() {
        assert!(image(TensorLayout::Plain, &[1, 3, 4, 4]).image_dims().is_err());
        assert!(image(TensorLayout::Nchw, &[3, 4, 4]).image_dims().is_err());
    }

    #[test]
    fn test_deep_copy_detaches_storage() {
        let original = image(TensorLayout::Nchw, &[1, 1, 2, 2]);
        let mut copy = original.deep_copy();
        if let TensorData::U8(a) = &mut copy.data {
            a[[0, 0, 0, 0]] = 7;
        }
        assert_eq!(original.as_u8().unwrap()[[0, 0, 0, 0]], 0);
        assert_eq!(copy.as_u8().unwrap()[[0, 0, 0, 0]], 7);
    }

    #[test]
    fn test_layout_codes() {
        assert_eq!(TensorLayout::from_code(0).unwrap(), TensorLayout::Nchw);
        assert_eq!(TensorLayout::from_code(1).unwrap(), TensorLayout::Nhwc);
        assert!(TensorLayout::from_code(2).is_err());
        assert_eq!(TensorLayout::Plain.code(), None);
    }

    #[test]
    fn test_list_layout_from_first_tensor() {
        let mut list = TensorList::new();
        assert_eq!(list.layout(), None);
        list.push(image(TensorLayout::Nhwc, &[1, 2, 2, 3]));
        assert_eq!(list.layout(), Some(TensorLayout::Nhwc));
    }
}
