// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy shared by every mmprep crate.

/// Common error type for pipeline construction and execution.
///
/// # Examples
/// ```
/// use mmprep_structures::PipelineError;
///
/// fn check_batch(batch: usize) -> Result<(), PipelineError> {
///     if batch == 0 {
///         return Err(PipelineError::InvalidConfig("batch size must be > 0".into()));
///     }
///     Ok(())
/// }
///
/// assert!(check_batch(0).is_err());
/// assert!(check_batch(8).is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    /// Construction parameters out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Graph could not be built (duplicate names, dangling references, cycles)
    #[error("Pipeline build failed: {0}")]
    Build(String),

    /// No factory registered under this operator name
    #[error("Unknown operator: {0}")]
    UnknownOperator(String),

    /// An operator name was registered twice
    #[error("Operator already registered: {0}")]
    DuplicateOperator(String),

    /// API called out of Build -> Run -> Outputs order
    #[error("Invalid pipeline state: {0}")]
    State(String),

    /// An operator reported failure while running
    #[error("Operator {op} failed: {reason}")]
    Operator { op: String, reason: String },

    /// A worker task faulted
    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    /// No free or ready run slot within the wait window
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Missing or mistyped operator argument
    #[error("Bad argument: {0}")]
    Argument(String),

    /// Shape, dtype or layout mismatch
    #[error("Tensor error: {0}")]
    Tensor(String),
}

impl PipelineError {
    /// Shorthand for [`PipelineError::Operator`].
    pub fn operator(op: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::Operator {
            op: op.into(),
            reason: reason.into(),
        }
    }

    /// Stable numeric code for callers that cross an FFI boundary.
    ///
    /// `0` is reserved for success and never returned.
    pub fn code(&self) -> u32 {
        match self {
            PipelineError::InvalidConfig(_) => 4,
            PipelineError::Argument(_) => 4,
            PipelineError::Operator { .. } => 5,
            PipelineError::UnknownOperator(_) => 7,
            PipelineError::DuplicateOperator(_) => 9,
            PipelineError::Timeout(_) => 10,
            PipelineError::Build(_) => 11,
            PipelineError::State(_) => 12,
            PipelineError::Tensor(_) => 13,
            PipelineError::WorkerPool(_) => 14,
        }
    }

    /// True for failures that abort `build` rather than a single run.
    pub fn is_build_error(&self) -> bool {
        matches!(
            self,
            PipelineError::Build(_)
                | PipelineError::UnknownOperator(_)
                | PipelineError::DuplicateOperator(_)
        )
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
