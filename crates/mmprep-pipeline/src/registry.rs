// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Name-keyed operator factories.
//!
//! A registry is a plain value owned by the [`crate::PipelineContext`]; there
//! is no process-wide instance. Besides the factories it remembers which names
//! denote fused compound operators, in registration order, because the fusion
//! planner offers them as tiling candidates in that order.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use mmprep_structures::{OpSpec, PipelineError, PipelineResult};
use tracing::debug;

use crate::operator::{Operator, OperatorFactory};
use crate::operators;

#[derive(Clone, Default)]
pub struct OperatorRegistry {
    factories: HashMap<String, OperatorFactory>,
    fusion_names: Vec<String>,
}

impl OperatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every operator shipped with this crate.
    pub fn with_builtin_ops() -> PipelineResult<Self> {
        let mut registry = Self::new();
        operators::register_builtin(&mut registry)?;
        Ok(registry)
    }

    /// Register a plain operator.
    ///
    /// # Errors
    /// [`PipelineError::DuplicateOperator`] if `name` is taken.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> PipelineResult<()>
    where
        F: Fn(OpSpec) -> PipelineResult<Box<dyn Operator>> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(PipelineError::DuplicateOperator(name));
        }
        debug!(operator = %name, "registered operator");
        self.factories.insert(name, Arc::new(factory));
        Ok(())
    }

    /// Register an operator that the fusion planner may substitute for a chain.
    ///
    /// The name must be the concatenation of the chain's operator names.
    pub fn register_fusion<F>(&mut self, name: impl Into<String>, factory: F) -> PipelineResult<()>
    where
        F: Fn(OpSpec) -> PipelineResult<Box<dyn Operator>> + Send + Sync + 'static,
    {
        let name = name.into();
        self.register(name.clone(), factory)?;
        self.fusion_names.push(name);
        Ok(())
    }

    /// Instantiate the operator named by `spec`.
    pub fn create(&self, spec: OpSpec) -> PipelineResult<Box<dyn Operator>> {
        let factory = self
            .factories
            .get(spec.name())
            .ok_or_else(|| PipelineError::UnknownOperator(spec.name().to_string()))?;
        factory(spec)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn is_fusion(&self, name: &str) -> bool {
        self.fusion_names.iter().any(|n| n == name)
    }

    /// Fusion operator names in registration order.
    pub fn fusion_op_names(&self) -> &[String] {
        &self.fusion_names
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for OperatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("OperatorRegistry")
            .field("operators", &names)
            .field("fusion", &self.fusion_names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::{EXTERNAL_SOURCE, TO_TENSOR_RESIZE_CROP_NORMALIZE};

    #[test]
    fn test_builtin_registry() {
        let registry = OperatorRegistry::with_builtin_ops().unwrap();
        assert!(registry.contains(EXTERNAL_SOURCE));
        assert!(registry.contains("ToTensor"));
        assert!(registry.contains("ResizeCrop"));
        assert!(registry.contains("Normalize"));
        assert_eq!(registry.fusion_op_names(), &[TO_TENSOR_RESIZE_CROP_NORMALIZE.to_string()]);
        assert!(registry.is_fusion(TO_TENSOR_RESIZE_CROP_NORMALIZE));
        assert!(!registry.is_fusion("ToTensor"));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = OperatorRegistry::with_builtin_ops().unwrap();
        let err = operators::register_builtin(&mut registry).unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateOperator(_)));
    }

    #[test]
    fn test_unknown_operator() {
        let registry = OperatorRegistry::with_builtin_ops().unwrap();
        match registry.create(OpSpec::new("tom")) {
            Err(PipelineError::UnknownOperator(name)) => assert_eq!(name, "tom"),
            Err(other) => panic!("unexpected error {:?}", other),
            Ok(_) => panic!("tom is not an operator"),
        }
    }
}
