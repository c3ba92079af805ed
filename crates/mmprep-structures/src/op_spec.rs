// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Declarative description of one operator node.
//!
//! A spec names the operator, its ordered inputs and outputs, its literal
//! arguments, and its argument-inputs (arguments whose value is read from
//! another node's output at run time). Insertion order is preserved for all
//! four collections so that specs can be re-emitted faithfully when nodes are
//! fused.

use serde::{Deserialize, Serialize};

use crate::{ArgValue, OpArg, PipelineError, PipelineResult};

/// Upper bound on the byte length of every name and device string in a spec
pub const MAX_SPEC_STRING_LENGTH: usize = 1024;

/// One input or output endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InOutDesc {
    pub name: String,
    pub device: String,
}

impl InOutDesc {
    pub fn new(name: impl Into<String>, device: impl Into<String>) -> Self {
        InOutDesc {
            name: name.into(),
            device: device.into(),
        }
    }
}

/// Operator specification.
///
/// # Examples
/// ```
/// use mmprep_structures::OpSpec;
///
/// let spec = OpSpec::new("ToTensor")
///     .with_input("raw", "cpu")
///     .with_output("t", "cpu")
///     .with_arg("layout", 0i64);
///
/// assert_eq!(spec.num_inputs(), 1);
/// assert_eq!(spec.arg::<i64>("layout").unwrap(), 0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpSpec {
    name: String,
    #[serde(default)]
    inputs: Vec<InOutDesc>,
    #[serde(default)]
    outputs: Vec<InOutDesc>,
    /// (argument name, data node name)
    #[serde(default)]
    arg_inputs: Vec<(String, String)>,
    #[serde(default)]
    args: Vec<(String, OpArg)>,
}

impl OpSpec {
    pub fn new(name: impl Into<String>) -> Self {
        OpSpec {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            arg_inputs: Vec::new(),
            args: Vec::new(),
        }
    }

    pub fn with_input(mut self, name: impl Into<String>, device: impl Into<String>) -> Self {
        self.add_input(name, device);
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, device: impl Into<String>) -> Self {
        self.add_output(name, device);
        self
    }

    /// Add a literal argument, overwriting an existing one of the same name.
    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<OpArg>) -> Self {
        self.set_arg(name, value, true);
        self
    }

    /// Bind an argument to the output of another node, overwriting an existing binding.
    pub fn with_arg_input(mut self, name: impl Into<String>, data_node: impl Into<String>) -> Self {
        self.set_arg_input(name, data_node, true);
        self
    }

    pub fn add_input(&mut self, name: impl Into<String>, device: impl Into<String>) -> &mut Self {
        self.inputs.push(InOutDesc::new(name, device));
        self
    }

    pub fn add_output(&mut self, name: impl Into<String>, device: impl Into<String>) -> &mut Self {
        self.outputs.push(InOutDesc::new(name, device));
        self
    }

    /// Insert a literal argument. An existing value is replaced only when `overwrite` is set.
    pub fn set_arg(&mut self, name: impl Into<String>, value: impl Into<OpArg>, overwrite: bool) -> &mut Self {
        let name = name.into();
        let value = value.into();
        match self.args.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => {
                if overwrite {
                    slot.1 = value;
                }
            }
            None => self.args.push((name, value)),
        }
        self
    }

    /// Insert an argument-input. An existing binding is replaced only when `overwrite` is set.
    pub fn set_arg_input(
        &mut self,
        name: impl Into<String>,
        data_node: impl Into<String>,
        overwrite: bool,
    ) -> &mut Self {
        let name = name.into();
        let data_node = data_node.into();
        match self.arg_inputs.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => {
                if overwrite {
                    slot.1 = data_node;
                }
            }
            None => self.arg_inputs.push((name, data_node)),
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    pub fn num_arg_inputs(&self) -> usize {
        self.arg_inputs.len()
    }

    pub fn num_args(&self) -> usize {
        self.args.len()
    }

    pub fn input(&self, index: usize) -> Option<&InOutDesc> {
        self.inputs.get(index)
    }

    pub fn output(&self, index: usize) -> Option<&InOutDesc> {
        self.outputs.get(index)
    }

    pub fn inputs(&self) -> &[InOutDesc] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[InOutDesc] {
        &self.outputs
    }

    /// Data node name of the `index`-th argument-input.
    pub fn arg_input(&self, index: usize) -> Option<&str> {
        self.arg_inputs.get(index).map(|(_, node)| node.as_str())
    }

    /// Iterate `(argument name, data node name)` in insertion order.
    pub fn arg_inputs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.arg_inputs.iter().map(|(n, d)| (n.as_str(), d.as_str()))
    }

    /// Iterate `(argument name, value)` in insertion order.
    pub fn args(&self) -> impl Iterator<Item = (&str, &OpArg)> {
        self.args.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn has_arg(&self, name: &str) -> bool {
        self.args.iter().any(|(n, _)| n == name)
    }

    pub fn has_arg_input(&self, name: &str) -> bool {
        self.arg_inputs.iter().any(|(n, _)| n == name)
    }

    /// Position of the named argument-input among all argument-inputs.
    pub fn arg_input_index(&self, name: &str) -> Option<usize> {
        self.arg_inputs.iter().position(|(n, _)| n == name)
    }

    pub fn op_arg(&self, name: &str) -> Option<&OpArg> {
        self.args.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Read a required literal argument.
    pub fn arg<T: ArgValue>(&self, name: &str) -> PipelineResult<T> {
        self.try_arg(name)?.ok_or_else(|| {
            PipelineError::Argument(format!(
                "operator {} has no argument named '{}'",
                self.name, name
            ))
        })
    }

    /// Read an optional literal argument. A present argument of the wrong type is an error.
    pub fn try_arg<T: ArgValue>(&self, name: &str) -> PipelineResult<Option<T>> {
        match self.op_arg(name) {
            None => Ok(None),
            Some(arg) => T::from_arg(arg).map(Some).ok_or_else(|| {
                PipelineError::Argument(format!(
                    "argument '{}' of {} is {}, expected {}",
                    name,
                    self.name,
                    arg.type_name(),
                    T::TYPE_NAME
                ))
            }),
        }
    }

    /// Check every name, device and argument key against [`MAX_SPEC_STRING_LENGTH`].
    pub fn validate(&self) -> PipelineResult<()> {
        if self.name.is_empty() {
            return Err(PipelineError::Build("operator name is empty".to_string()));
        }
        let strings = std::iter::once(self.name.as_str())
            .chain(self.inputs.iter().flat_map(|d| [d.name.as_str(), d.device.as_str()]))
            .chain(self.outputs.iter().flat_map(|d| [d.name.as_str(), d.device.as_str()]))
            .chain(self.arg_inputs.iter().flat_map(|(n, d)| [n.as_str(), d.as_str()]))
            .chain(self.args.iter().map(|(n, _)| n.as_str()));
        for s in strings {
            if s.len() > MAX_SPEC_STRING_LENGTH {
                return Err(PipelineError::Build(format!(
                    "string of length {} in spec of {} exceeds the limit of {}",
                    s.len(),
                    self.name.chars().take(32).collect::<String>(),
                    MAX_SPEC_STRING_LENGTH
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overwrite_flag() {
        let mut spec = OpSpec::new("Normalize");
        spec.set_arg("scale", 1.0f32, true);
        spec.set_arg("scale", 2.0f32, false);
        assert_eq!(spec.arg::<f32>("scale").unwrap(), 1.0);
        spec.set_arg("scale", 3.0f32, true);
        assert_eq!(spec.arg::<f32>("scale").unwrap(), 3.0);
        assert_eq!(spec.num_args(), 1);
    }

    #[test]
    fn test_insertion_order_kept() {
        let spec = OpSpec::new("ResizeCrop")
            .with_arg("resize", vec![256i64, 256])
            .with_arg("crop", vec![224i64, 224])
            .with_arg_input("crop_pos_x", "px")
            .with_arg_input("crop_pos_y", "py");
        let names: Vec<&str> = spec.args().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["resize", "crop"]);
        assert_eq!(spec.arg_input(1), Some("py"));
        assert_eq!(spec.arg_input_index("crop_pos_y"), Some(1));
    }

    #[test]
    fn test_missing_and_mistyped_args() {
        let spec = OpSpec::new("ToTensor").with_arg("layout", "nchw");
        assert!(matches!(spec.arg::<i64>("missing"), Err(PipelineError::Argument(_))));
        assert!(matches!(spec.arg::<i64>("layout"), Err(PipelineError::Argument(_))));
        assert_eq!(spec.try_arg::<i64>("missing").unwrap(), None);
    }

    #[test]
    fn test_validate_string_limit() {
        let ok = OpSpec::new("A").with_output(&*"o".repeat(MAX_SPEC_STRING_LENGTH), "cpu");
        assert!(ok.validate().is_ok());
        let too_long = OpSpec::new("A").with_output(&*"o".repeat(MAX_SPEC_STRING_LENGTH + 1), "cpu");
        assert!(matches!(too_long.validate(), Err(PipelineError::Build(_))));
        assert!(OpSpec::new("").validate().is_err());
    }
}
