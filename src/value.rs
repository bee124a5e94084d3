//! Types describing the values that flow through a graph.

use rten_tensor::prelude::*;
use rten_tensor::Tensor;

use crate::dim::{from_fixed, Dim};
use crate::dtype::{float_to_int, int_to_float, round_float, wrap_int, DataType};

/// Element storage for a [`Constant`].
///
/// Float types are stored as `f64` and integer and bool types as `i64`.
#[derive(Clone, Debug, PartialEq)]
pub enum TensorData {
    Float(Tensor<f64>),
    Int(Tensor<i64>),
}

impl TensorData {
    pub fn shape(&self) -> &[usize] {
        match self {
            TensorData::Float(t) => t.shape(),
            TensorData::Int(t) => t.shape(),
        }
    }
}

/// A tensor whose value is known before the graph is run.
///
/// Constants come from initializers, `Constant` nodes and from evaluating
/// operators whose inputs are all constant.
#[derive(Clone, Debug, PartialEq)]
pub struct Constant {
    dtype: DataType,
    data: TensorData,
}

impl Constant {
    /// Create a constant of an integer or bool type.
    ///
    /// Values are wrapped to the range of `dtype`.
    ///
    /// Panics if the length of `values` does not match `shape`.
    pub fn from_ints(dtype: DataType, shape: &[usize], values: Vec<i64>) -> Constant {
        if dtype.is_float() {
            let values = values.into_iter().map(|x| x as f64).collect();
            return Self::from_floats(dtype, shape, values);
        }
        let values: Vec<_> = values.into_iter().map(|x| wrap_int(x, dtype)).collect();
        Constant {
            dtype,
            data: TensorData::Int(Tensor::from_data(shape, values)),
        }
    }

    /// Create a constant of a float type.
    ///
    /// If `dtype` is an integer type, values are converted as by a cast.
    ///
    /// Panics if the length of `values` does not match `shape`.
    pub fn from_floats(dtype: DataType, shape: &[usize], values: Vec<f64>) -> Constant {
        if !dtype.is_float() {
            let values = values.into_iter().map(|x| float_to_int(x, dtype)).collect();
            return Self::from_ints(dtype, shape, values);
        }
        let values: Vec<_> = values.into_iter().map(|x| round_float(x, dtype)).collect();
        Constant {
            dtype,
            data: TensorData::Float(Tensor::from_data(shape, values)),
        }
    }

    /// Create a 1D `int64` tensor.
    pub fn int64_vec(values: Vec<i64>) -> Constant {
        let len = values.len();
        Self::from_ints(DataType::Int64, &[len], values)
    }

    /// Create a scalar `int64` tensor.
    pub fn int64_scalar(value: i64) -> Constant {
        Self::from_ints(DataType::Int64, &[], vec![value])
    }

    /// Create a 1D `float32` tensor.
    pub fn float_vec(values: Vec<f64>) -> Constant {
        let len = values.len();
        Self::from_floats(DataType::Float, &[len], values)
    }

    /// Create a scalar `float32` tensor.
    pub fn float_scalar(value: f64) -> Constant {
        Self::from_floats(DataType::Float, &[], vec![value])
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Return the number of elements.
    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the elements as integers, in logical order.
    ///
    /// Float values are truncated.
    pub fn to_i64s(&self) -> Vec<i64> {
        match &self.data {
            TensorData::Int(t) => t.to_vec(),
            TensorData::Float(t) => t.iter().map(|x| float_to_int(*x, DataType::Int64)).collect(),
        }
    }

    /// Return the elements as floats, in logical order.
    pub fn to_f64s(&self) -> Vec<f64> {
        match &self.data {
            TensorData::Int(t) => t.iter().map(|x| int_to_float(*x, self.dtype)).collect(),
            TensorData::Float(t) => t.to_vec(),
        }
    }

    /// Return the value of a single-element tensor as an integer.
    pub fn int_item(&self) -> Option<i64> {
        (self.len() == 1).then(|| self.to_i64s()[0])
    }

    /// Return the value of a single-element tensor as a float.
    pub fn float_item(&self) -> Option<f64> {
        (self.len() == 1).then(|| self.to_f64s()[0])
    }

    /// Convert the elements to another type.
    pub fn cast(&self, to: DataType) -> Constant {
        if to == self.dtype {
            return self.clone();
        }
        let shape = self.shape();
        match &self.data {
            TensorData::Int(t) if to.is_float() => {
                let values = t.iter().map(|x| int_to_float(*x, self.dtype)).collect();
                Self::from_floats(to, shape, values)
            }
            TensorData::Int(t) => Self::from_ints(to, shape, t.to_vec()),
            TensorData::Float(t) => Self::from_floats(to, shape, t.to_vec()),
        }
    }

    /// Return a copy of this tensor with a new shape.
    ///
    /// Panics if the number of elements differs.
    pub fn reshaped(&self, shape: &[usize]) -> Constant {
        let data = match &self.data {
            TensorData::Int(t) => TensorData::Int(Tensor::from_data(shape, t.to_vec())),
            TensorData::Float(t) => TensorData::Float(Tensor::from_data(shape, t.to_vec())),
        };
        Constant {
            dtype: self.dtype,
            data,
        }
    }

    /// Return a copy of this tensor with its axes permuted.
    pub fn permuted(&self, perm: &[usize]) -> Constant {
        let data = match &self.data {
            TensorData::Int(t) => TensorData::Int(t.permuted(perm).to_tensor()),
            TensorData::Float(t) => TensorData::Float(t.permuted(perm).to_tensor()),
        };
        Constant {
            dtype: self.dtype,
            data,
        }
    }

    /// Create a tensor with the same type as this one, from the elements of
    /// this tensor at `indices`.
    pub fn select(&self, shape: &[usize], indices: &[usize]) -> Constant {
        match &self.data {
            TensorData::Int(t) => {
                let values = t.to_vec();
                let selected = indices.iter().map(|&i| values[i]).collect();
                Self::from_ints(self.dtype, shape, selected)
            }
            TensorData::Float(t) => {
                let values = t.to_vec();
                let selected = indices.iter().map(|&i| values[i]).collect();
                Self::from_floats(self.dtype, shape, selected)
            }
        }
    }

    /// Select elements by position along each axis.
    ///
    /// `indices[i]` lists the positions taken from axis `i`. The result holds
    /// every combination of positions in row-major order and has shape
    /// `shape`.
    pub fn select_axes(&self, shape: &[usize], indices: &[Vec<usize>]) -> Constant {
        let src_shape = self.shape();
        let mut flat = vec![0usize];
        for (axis, positions) in indices.iter().enumerate() {
            let stride: usize = src_shape[axis + 1..].iter().product();
            flat = flat
                .iter()
                .flat_map(|&base| positions.iter().map(move |&i| base + i * stride))
                .collect();
        }
        self.select(shape, &flat)
    }
}

/// Inferred type, shape and (if known) value of a tensor.
#[derive(Clone, Debug, PartialEq)]
pub struct ValueInfo {
    pub dtype: DataType,
    pub shape: Vec<Dim>,
    pub constant: Option<Constant>,
}

impl ValueInfo {
    pub fn new(dtype: DataType, shape: Vec<Dim>) -> ValueInfo {
        ValueInfo {
            dtype,
            shape,
            constant: None,
        }
    }

    /// Create a value whose contents are known.
    pub fn from_constant(constant: Constant) -> ValueInfo {
        ValueInfo {
            dtype: constant.dtype(),
            shape: from_fixed(constant.shape()),
            constant: Some(constant),
        }
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Return the shape if all dimensions are fixed.
    pub fn fixed_shape(&self) -> Option<Vec<usize>> {
        crate::dim::fixed_shape(&self.shape)
    }
}
