// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Literal operator arguments.
//!
//! An argument is one of a small, closed set of value types. Typed access goes
//! through [`ArgValue`], which returns `None` on a type mismatch instead of
//! relying on a runtime cast.

use serde::{Deserialize, Serialize};

use crate::tensor::TensorList;

/// One literal argument value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum OpArg {
    Bool(bool),
    BoolList(Vec<bool>),
    Int(i64),
    IntList(Vec<i64>),
    Float(f32),
    FloatList(Vec<f32>),
    Str(String),
    StrList(Vec<String>),
}

impl OpArg {
    pub fn type_name(&self) -> &'static str {
        match self {
            OpArg::Bool(_) => "bool",
            OpArg::BoolList(_) => "list<bool>",
            OpArg::Int(_) => "int",
            OpArg::IntList(_) => "list<int>",
            OpArg::Float(_) => "float",
            OpArg::FloatList(_) => "list<float>",
            OpArg::Str(_) => "string",
            OpArg::StrList(_) => "list<string>",
        }
    }

    /// Typed extraction; `None` when the stored type differs.
    pub fn get<T: ArgValue>(&self) -> Option<T> {
        T::from_arg(self)
    }
}

/// Types that can be read out of an [`OpArg`] or out of an argument-input buffer.
pub trait ArgValue: Sized {
    /// Human readable type name used in error messages
    const TYPE_NAME: &'static str;

    fn from_arg(arg: &OpArg) -> Option<Self>;

    /// Decode from the tensor list bound to an argument-input.
    ///
    /// Only numeric scalars and numeric lists can travel as tensors.
    fn from_tensors(_list: &TensorList) -> Option<Self> {
        None
    }
}

impl ArgValue for bool {
    const TYPE_NAME: &'static str = "bool";

    fn from_arg(arg: &OpArg) -> Option<Self> {
        match arg {
            OpArg::Bool(v) => Some(*v),
            _ => None,
        }
    }

    fn from_tensors(list: &TensorList) -> Option<Self> {
        list.get(0)?.as_u8()?.iter().next().map(|v| *v != 0)
    }
}

impl ArgValue for i64 {
    const TYPE_NAME: &'static str = "int";

    fn from_arg(arg: &OpArg) -> Option<Self> {
        match arg {
            OpArg::Int(v) => Some(*v),
            _ => None,
        }
    }

    fn from_tensors(list: &TensorList) -> Option<Self> {
        list.get(0)?.as_i64()?.iter().next().copied()
    }
}

impl ArgValue for f32 {
    const TYPE_NAME: &'static str = "float";

    fn from_arg(arg: &OpArg) -> Option<Self> {
        match arg {
            OpArg::Float(v) => Some(*v),
            _ => None,
        }
    }

    fn from_tensors(list: &TensorList) -> Option<Self> {
        list.get(0)?.as_f32()?.iter().next().copied()
    }
}

impl ArgValue for String {
    const TYPE_NAME: &'static str = "string";

    fn from_arg(arg: &OpArg) -> Option<Self> {
        match arg {
            OpArg::Str(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl ArgValue for Vec<bool> {
    const TYPE_NAME: &'static str = "list<bool>";

    fn from_arg(arg: &OpArg) -> Option<Self> {
        match arg {
            OpArg::BoolList(v) => Some(v.clone()),
            _ => None,
        }
    }

    fn from_tensors(list: &TensorList) -> Option<Self> {
        Some(list.get(0)?.as_u8()?.iter().map(|v| *v != 0).collect())
    }
}

impl ArgValue for Vec<i64> {
    const TYPE_NAME: &'static str = "list<int>";

    fn from_arg(arg: &OpArg) -> Option<Self> {
        match arg {
            OpArg::IntList(v) => Some(v.clone()),
            _ => None,
        }
    }

    fn from_tensors(list: &TensorList) -> Option<Self> {
        Some(list.get(0)?.as_i64()?.iter().copied().collect())
    }
}

impl ArgValue for Vec<f32> {
    const TYPE_NAME: &'static str = "list<float>";

    fn from_arg(arg: &OpArg) -> Option<Self> {
        match arg {
            OpArg::FloatList(v) => Some(v.clone()),
            _ => None,
        }
    }

    fn from_tensors(list: &TensorList) -> Option<Self> {
        Some(list.get(0)?.as_f32()?.iter().copied().collect())
    }
}

impl ArgValue for Vec<String> {
    const TYPE_NAME: &'static str = "list<string>";

    fn from_arg(arg: &OpArg) -> Option<Self> {
        match arg {
            OpArg::StrList(v) => Some(v.clone()),
            _ => None,
        }
    }
}

macro_rules! impl_from_for_op_arg {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for OpArg {
                fn from(value: $ty) -> Self {
                    OpArg::$variant(value)
                }
            }
        )*
    };
}

impl_from_for_op_arg!(
    bool => Bool,
    Vec<bool> => BoolList,
    i64 => Int,
    Vec<i64> => IntList,
    f32 => Float,
    Vec<f32> => FloatList,
    String => Str,
    Vec<String> => StrList,
);

impl From<&str> for OpArg {
    fn from(value: &str) -> Self {
        OpArg::Str(value.to_string())
    }
}

impl From<&[i64]> for OpArg {
    fn from(value: &[i64]) -> Self {
        OpArg::IntList(value.to_vec())
    }
}

impl From<&[f32]> for OpArg {
    fn from(value: &[f32]) -> Self {
        OpArg::FloatList(value.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Tensor;

    #[test]
    fn test_typed_extraction() {
        assert_eq!(OpArg::from(3i64).get::<i64>(), Some(3));
        assert_eq!(OpArg::from(3i64).get::<f32>(), None);
        assert_eq!(
            OpArg::from(vec![0.5f32, 0.25]).get::<Vec<f32>>(),
            Some(vec![0.5, 0.25])
        );
        assert_eq!(OpArg::from("bilinear").get::<String>().as_deref(), Some("bilinear"));
        assert_eq!(OpArg::from("bilinear").get::<Vec<String>>(), None);
    }

    #[test]
    fn test_from_tensors() {
        let list = TensorList::from_tensors(vec![Tensor::from_i64_slice(&[224, 224])]);
        assert_eq!(<Vec<i64>>::from_tensors(&list), Some(vec![224, 224]));
        assert_eq!(i64::from_tensors(&list), Some(224));
        assert_eq!(f32::from_tensors(&list), None);
        assert_eq!(String::from_tensors(&list), None);
        assert_eq!(i64::from_tensors(&TensorList::new()), None);
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_string(&OpArg::Int(1)).unwrap();
        assert_eq!(json, r#"{"type":"int","value":1}"#);
        let back: OpArg = serde_json::from_str(r#"{"type":"float_list","value":[0.5]}"#).unwrap();
        assert_eq!(back, OpArg::FloatList(vec![0.5]));
    }
}
