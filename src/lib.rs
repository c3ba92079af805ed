// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # mmprep - multimodal preprocessing pipelines
//!
//! Build a graph of named tensor operators, let the planner fuse compatible
//! chains, and run it repeatedly over a shared worker pool with several
//! batches in flight.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! mmprep = "0.1"  # Default: config + observability
//! ```
//!
//! ## Feature Flags
//!
//! - **`config`** (default): TOML/env/CLI configuration loading
//! - **`observability`** (default): logging initialization and debug flags
//! - **`file-logging`**: rotating JSON log files per run
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use mmprep::prelude::*;
//!
//! let context = Arc::new(PipelineContext::with_builtin_ops().unwrap());
//! let mut pipeline = Pipeline::new(context, 8, 2, 2, true).unwrap();
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
//! let frame = ndarray::ArrayD::<u8>::zeros(ndarray::IxDyn(&[8, 32, 32, 3]));
//! let inputs = HashMap::from([(
//!     "raw".to_string(),
//!     TensorList::from_tensors(vec![Tensor::new(frame, TensorLayout::Nhwc)]),
//! )]);
//! let outputs = pipeline.run_and_fetch(inputs, false).unwrap();
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-export foundation
pub use mmprep_structures as structures;

// Re-export runtime and pipeline
pub use mmprep_pipeline as pipeline;
pub use mmprep_runtime as runtime;

#[cfg(feature = "config")]
pub use mmprep_config as config;

#[cfg(feature = "observability")]
pub use mmprep_observability as observability;

/// Prelude - commonly used types and traits
pub mod prelude {
    pub use crate::structures::{
        OpArg, OpSpec, PipelineError, PipelineResult, SharedTensorList, Tensor, TensorLayout, TensorList,
    };

    pub use crate::pipeline::{Operator, OperatorRegistry, Pipeline, PipelineContext, Workspace};

    #[cfg(feature = "config")]
    pub use crate::config::{load_config, validate_config, MmprepConfig};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_facade_imports() {
        use crate::prelude::*;
        let spec = OpSpec::new("ExternalSource").with_output("raw", "cpu");
        let registry = OperatorRegistry::with_builtin_ops().unwrap();
        assert!(registry.contains(spec.name()));
    }
}
