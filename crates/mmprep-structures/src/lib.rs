// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # mmprep-structures
//!
//! The most core library of mmprep. Defines the data types every other crate
//! speaks in:
//! - [`PipelineError`] / [`PipelineResult`]: the single error taxonomy
//! - [`OpArg`] and [`ArgValue`]: closed argument cells with typed extraction
//! - [`OpSpec`]: the declarative description of one operator node
//! - [`Tensor`], [`TensorList`], [`SharedTensorList`]: batch storage handed between operators

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod error;
pub mod op_arg;
pub mod op_spec;
pub mod tensor;

pub use error::{PipelineError, PipelineResult};
pub use op_arg::{ArgValue, OpArg};
pub use op_spec::{InOutDesc, OpSpec, MAX_SPEC_STRING_LENGTH};
pub use tensor::{
    shared_tensor_list, DataType, ImageDims, SharedTensorList, Tensor, TensorData, TensorLayout,
    TensorList,
};
