// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # mmprep-pipeline
//!
//! Graph construction and pipelined execution of preprocessing operators:
//! - [`OperatorRegistry`]: name-keyed operator factories, including fusion operators
//! - [`Graph`]: path discovery from requested outputs, linked in topological order
//! - [`fusion`]: minimum-tiling planner rewriting operator chains into fused operators
//! - [`WorkspaceManager`]: per-slot buffers and the free/ready/shared slot protocol
//! - [`Executor`]: Build -> Run -> Outputs over a shared [`mmprep_runtime::WorkerPool`]
//! - [`Pipeline`]: the caller-facing facade
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use mmprep_pipeline::{Pipeline, PipelineContext};
//! use mmprep_structures::{OpSpec, Tensor, TensorLayout, TensorList};
//!
//! let context = Arc::new(PipelineContext::with_builtin_ops().unwrap());
//! let mut pipeline = Pipeline::new(context, 4, 2, 2, true).unwrap();
//! pipeline
//!     .build(
//!         vec![
//!             OpSpec::new("ExternalSource").with_output("raw", "cpu"),
//!             OpSpec::new("ToTensor")
//!                 .with_input("raw", "cpu")
//!                 .with_output("t", "cpu")
//!                 .with_arg("layout", 0i64),
//!         ],
//!         &["t"],
//!     )
//!     .unwrap();
//!
//! let mut inputs = HashMap::new();
//! let frame = ndarray::ArrayD::<u8>::zeros(ndarray::IxDyn(&[1, 32, 32, 3]));
//! let batch = TensorList::from_tensors(vec![Tensor::new(frame, TensorLayout::Nhwc)]);
//! inputs.insert("raw".to_string(), batch);
//! let outputs = pipeline.run_and_fetch(inputs, false);
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod context;
pub mod executor;
pub mod fusion;
pub mod graph;
pub mod operator;
pub mod operators;
pub mod pipeline;
pub mod registry;
pub mod workspace;
pub mod workspace_manager;

pub use context::{PipelineContext, DEFAULT_ACQUIRE_TIMEOUT};
pub use executor::{Executor, ExecutorState};
pub use fusion::{min_tiling, FusionPlan};
pub use graph::{DataNode, DataNodeId, Graph, OpNode, OpNodeId};
pub use operator::{Operator, OperatorFactory};
pub use pipeline::Pipeline;
pub use registry::OperatorRegistry;
pub use workspace::Workspace;
pub use workspace_manager::{QueueStats, SlotIdx, WorkspaceManager};
