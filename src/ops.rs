//! Type and shape inference for ONNX operators.
//!
//! See the [ONNX operator reference](https://onnx.ai/onnx/operators/index.html)
//! for operator details.
//!
//! Each operator is a struct holding its parsed attributes and implementing
//! [`InferOp`]. Where an operator parameter can be given either as an
//! attribute (older opsets) or as an input (newer opsets), the struct keeps
//! the attribute form and [`merge_ints`] combines it with the input form
//! when inference runs.

use std::fmt::Debug;

use crate::dim::{Dim, ShapeDisplay, SymbolGen};
use crate::dtype::DataType;
use crate::error::OpError;
use crate::value::{Constant, ValueInfo};

mod aten;
mod binary;
mod concat;
mod conv_pool;
mod convert;
mod gather;
mod generate;
mod layout;
mod matmul;
mod norm;
mod pad;
mod reduce;
mod slice;
mod split;
mod unary;

pub use aten::{EmbeddingBag, EmbeddingBagMode};
pub use binary::{Binary, BinaryKind, PRelu, Variadic, VariadicKind};
pub use concat::Concat;
pub use conv_pool::{Conv, ConvTranspose, GlobalPool, Pool, PoolKind};
pub use convert::Cast;
pub use gather::{Gather, GatherElements};
pub use generate::{Constant as ConstantOp, ConstantFill, ConstantOfShape, NonZero, OneHot, Range};
pub use layout::{Expand, Flatten, Reshape, Shape, Squeeze, Tile, Transpose, Unsqueeze};
pub use matmul::{Gemm, MatMul};
pub use norm::{BatchNormalization, ImageScaler, InstanceNormalization, Lrn};
pub use pad::{Pad, PadMode};
pub use reduce::{ArgReduce, Reduce, ReduceKind};
pub use slice::Slice;
pub use split::Split;
pub use unary::{Clip, Dropout, Softmax, Unary, UnaryKind};

/// Largest number of elements in a constant produced by folding.
///
/// Operators whose output would be larger than this produce only a type and
/// shape, even if all their inputs are constant.
pub const MAX_FOLD_ELEMENTS: usize = 65536;

/// State shared by operators while inferring a graph.
pub struct InferCtx<'a> {
    /// Generator for dimensions whose size cannot be determined.
    pub sym_gen: &'a mut SymbolGen,

    /// Number of outputs the node declares.
    pub num_outputs: usize,

    /// Convert mismatched input types using [`DataType::promote`] instead of
    /// reporting an error.
    pub implicit_promotion: bool,
}

/// Infer the types, shapes and (where possible) values of an operator's
/// outputs given its inputs.
pub trait InferOp: Debug {
    /// Return the ONNX operator type.
    fn op_type(&self) -> &str;

    /// Infer the outputs of the operator.
    ///
    /// `inputs` has one entry per input declared by the node. Omitted
    /// optional inputs are `None`. The result should have at most
    /// `ctx.num_outputs` entries. Operators may return fewer outputs than
    /// declared if trailing optional outputs are not produced.
    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError>;
}

/// Check the number of inputs is in `[min, max]`.
pub(crate) fn check_inputs(
    inputs: &[Option<&ValueInfo>],
    min: usize,
    max: usize,
) -> Result<(), OpError> {
    if inputs.len() < min {
        return Err(OpError::IncorrectInputCount {
            expected: min,
            actual: inputs.len(),
        });
    }
    if inputs.len() > max {
        return Err(OpError::IncorrectInputCount {
            expected: max,
            actual: inputs.len(),
        });
    }
    Ok(())
}

/// Get a required input.
pub(crate) fn required<'a>(
    inputs: &[Option<&'a ValueInfo>],
    index: usize,
) -> Result<&'a ValueInfo, OpError> {
    inputs
        .get(index)
        .copied()
        .flatten()
        .ok_or(OpError::MissingInput(index))
}

/// Get an optional input.
pub(crate) fn optional<'a>(inputs: &[Option<&'a ValueInfo>], index: usize) -> Option<&'a ValueInfo> {
    inputs.get(index).copied().flatten()
}

/// Return a value with `constant` as its contents, if it is small enough to
/// keep.
pub(crate) fn folded(constant: Constant) -> ValueInfo {
    if constant.len() > MAX_FOLD_ELEMENTS {
        let shape = crate::dim::from_fixed(constant.shape());
        ValueInfo::new(constant.dtype(), shape)
    } else {
        ValueInfo::from_constant(constant)
    }
}

/// Return true if a tensor with `shape` may be folded.
pub(crate) fn can_fold(shape: &[usize]) -> bool {
    shape.iter().product::<usize>() <= MAX_FOLD_ELEMENTS
}

/// A parameter whose value may be given by an attribute or an input.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Param<T> {
    /// The value is known.
    Known(T),

    /// The parameter is given by an input whose value is not known.
    Dynamic,

    /// Neither the attribute nor the input was given.
    Absent,
}

/// Combine the attribute and input forms of an integer list parameter.
///
/// Specifying both is an error, reported against `name`.
pub(crate) fn merge_ints(
    name: &str,
    attr: Option<&[i64]>,
    inputs: &[Option<&ValueInfo>],
    index: usize,
) -> Result<Param<Vec<i64>>, OpError> {
    let input = optional(inputs, index);
    match (attr, input) {
        (Some(_), Some(_)) => Err(OpError::attr(
            name,
            "cannot be given as both an attribute and an input",
        )),
        (Some(values), None) => Ok(Param::Known(values.to_vec())),
        (None, Some(input)) => {
            if !input.dtype.is_integer() {
                return Err(OpError::dtype(format!(
                    "\"{}\" input must be an integer tensor but has type {}",
                    name, input.dtype
                )));
            }
            if input.ndim() > 1 {
                return Err(OpError::attr(name, "input must be a scalar or vector"));
            }
            Ok(match &input.constant {
                Some(value) => Param::Known(value.to_i64s()),
                None => Param::Dynamic,
            })
        }
        (None, None) => Ok(Param::Absent),
    }
}

/// Combine the attribute and input forms of a scalar float parameter.
pub(crate) fn merge_float(
    name: &str,
    attr: Option<f32>,
    inputs: &[Option<&ValueInfo>],
    index: usize,
) -> Result<Param<f64>, OpError> {
    let input = optional(inputs, index);
    match (attr, input) {
        (Some(_), Some(_)) => Err(OpError::attr(
            name,
            "cannot be given as both an attribute and an input",
        )),
        (Some(value), None) => Ok(Param::Known(value as f64)),
        (None, Some(input)) => {
            check_scalar(name, input)?;
            Ok(match &input.constant {
                Some(value) => value.float_item().map_or(Param::Dynamic, Param::Known),
                None => Param::Dynamic,
            })
        }
        (None, None) => Ok(Param::Absent),
    }
}

/// Check that an input holds a single element.
pub(crate) fn check_scalar(name: &str, input: &ValueInfo) -> Result<(), OpError> {
    let single = input
        .shape
        .iter()
        .all(|d| matches!(d, Dim::Fixed(1) | Dim::Symbol(_)));
    if input.ndim() > 1 || !single {
        return Err(OpError::shape(format!(
            "\"{}\" must be a scalar but has shape {}",
            name,
            ShapeDisplay(&input.shape)
        )));
    }
    Ok(())
}

/// Check that an input has one of the accepted element types.
pub(crate) fn check_dtype(
    op_type: &str,
    input: &ValueInfo,
    accept: impl Fn(DataType) -> bool,
) -> Result<(), OpError> {
    if input.dtype == DataType::String || !accept(input.dtype) {
        return Err(OpError::dtype(format!(
            "{} does not support inputs of type {}",
            op_type, input.dtype
        )));
    }
    Ok(())
}

/// Check that an input has exactly `ndim` dimensions.
pub(crate) fn check_rank(name: &str, input: &ValueInfo, ndim: usize) -> Result<(), OpError> {
    if input.ndim() != ndim {
        return Err(OpError::shape(format!(
            "\"{}\" must have {} dims but has shape {}",
            name,
            ndim,
            ShapeDisplay(&input.shape)
        )));
    }
    Ok(())
}

/// Resolve the common type of operands which must have the same type.
///
/// If the types differ and `implicit_promotion` is enabled, the promoted
/// type is returned.
pub(crate) fn common_dtype(
    op_type: &str,
    dtypes: &[DataType],
    implicit_promotion: bool,
) -> Result<DataType, OpError> {
    let Some((&first, rest)) = dtypes.split_first() else {
        return Err(OpError::IncorrectInputCount {
            expected: 1,
            actual: 0,
        });
    };
    let mut common = first;
    for &dtype in rest {
        if dtype == common {
            continue;
        }
        let promoted = implicit_promotion
            .then(|| common.promote(dtype))
            .flatten();
        common = promoted.ok_or_else(|| {
            OpError::dtype(format!(
                "{} inputs have different types {} and {}",
                op_type, common, dtype
            ))
        })?;
    }
    Ok(common)
}

/// Check that two dims are equal if both are fixed.
pub(crate) fn check_dims_match(what: &str, a: &Dim, b: &Dim) -> Result<(), OpError> {
    match (a, b) {
        (Dim::Fixed(x), Dim::Fixed(y)) if x != y => Err(OpError::shape(format!(
            "{} mismatch: {} vs {}",
            what, x, y
        ))),
        _ => Ok(()),
    }
}
