use rten_tensor::prelude::*;

use crate::axes::resolve_axis;
use crate::dtype::DataType;
use crate::error::OpError;
use crate::ops::{
    can_fold, check_dtype, check_inputs, folded, merge_float, required, InferCtx, InferOp, Param,
};
use crate::value::{Constant, TensorData, ValueInfo};

/// Elementwise operators with one input and one output of the same shape.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum UnaryKind {
    Abs,
    Acos,
    Acosh,
    Asin,
    Asinh,
    Atan,
    Atanh,
    Ceil,
    Cos,
    Cosh,
    Elu { alpha: f32 },
    Erf,
    Exp,
    Floor,
    Identity,
    LeakyRelu { alpha: f32 },
    Log,
    Neg,
    Not,
    Reciprocal,
    Relu,
    Sigmoid,
    Sign,
    Sin,
    Sinh,
    Sqrt,
    Tan,
    Tanh,
}

impl UnaryKind {
    pub fn name(self) -> &'static str {
        use UnaryKind::*;
        match self {
            Abs => "Abs",
            Acos => "Acos",
            Acosh => "Acosh",
            Asin => "Asin",
            Asinh => "Asinh",
            Atan => "Atan",
            Atanh => "Atanh",
            Ceil => "Ceil",
            Cos => "Cos",
            Cosh => "Cosh",
            Elu { .. } => "Elu",
            Erf => "Erf",
            Exp => "Exp",
            Floor => "Floor",
            Identity => "Identity",
            LeakyRelu { .. } => "LeakyRelu",
            Log => "Log",
            Neg => "Neg",
            Not => "Not",
            Reciprocal => "Reciprocal",
            Relu => "Relu",
            Sigmoid => "Sigmoid",
            Sign => "Sign",
            Sin => "Sin",
            Sinh => "Sinh",
            Sqrt => "Sqrt",
            Tan => "Tan",
            Tanh => "Tanh",
        }
    }

    fn accepts(self, dtype: DataType) -> bool {
        use UnaryKind::*;
        match self {
            Identity => true,
            Not => dtype == DataType::Bool,
            Abs | Neg | Relu | Sign => dtype.is_numeric(),
            _ => dtype.is_float(),
        }
    }

    fn apply_float(self, x: f64) -> Option<f64> {
        use UnaryKind::*;
        let y = match self {
            Abs => x.abs(),
            Acos => x.acos(),
            Acosh => x.acosh(),
            Asin => x.asin(),
            Asinh => x.asinh(),
            Atan => x.atan(),
            Atanh => x.atanh(),
            Ceil => x.ceil(),
            Cos => x.cos(),
            Cosh => x.cosh(),
            Elu { alpha } => {
                if x < 0. {
                    alpha as f64 * (x.exp() - 1.)
                } else {
                    x
                }
            }
            Exp => x.exp(),
            Floor => x.floor(),
            Identity => x,
            LeakyRelu { alpha } => {
                if x < 0. {
                    alpha as f64 * x
                } else {
                    x
                }
            }
            Log => x.ln(),
            Neg => -x,
            Reciprocal => 1. / x,
            Relu => x.max(0.),
            Sigmoid => 1. / (1. + (-x).exp()),
            Sign => {
                if x == 0. || x.is_nan() {
                    x
                } else {
                    x.signum()
                }
            }
            Sin => x.sin(),
            Sinh => x.sinh(),
            Sqrt => x.sqrt(),
            Tan => x.tan(),
            Tanh => x.tanh(),
            Erf | Not => return None,
        };
        Some(y)
    }

    fn apply_int(self, x: i64) -> Option<i64> {
        use UnaryKind::*;
        let y = match self {
            Abs => x.wrapping_abs(),
            Identity => x,
            Neg => x.wrapping_neg(),
            Not => (x == 0) as i64,
            Relu => x.max(0),
            Sign => x.signum(),
            _ => return None,
        };
        Some(y)
    }

    fn fold(self, value: &Constant) -> Option<Constant> {
        let dtype = value.dtype();
        match value.data() {
            TensorData::Float(t) => {
                let values = t
                    .iter()
                    .map(|x| self.apply_float(*x))
                    .collect::<Option<Vec<_>>>()?;
                Some(Constant::from_floats(dtype, t.shape(), values))
            }
            TensorData::Int(t) => {
                let values = t
                    .iter()
                    .map(|x| self.apply_int(*x))
                    .collect::<Option<Vec<_>>>()?;
                Some(Constant::from_ints(dtype, t.shape(), values))
            }
        }
    }
}

/// Elementwise unary operator.
#[derive(Debug)]
pub struct Unary {
    pub kind: UnaryKind,
}

impl InferOp for Unary {
    fn op_type(&self) -> &str {
        self.kind.name()
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        _ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 1, 1)?;
        let input = required(inputs, 0)?;
        check_dtype(self.op_type(), input, |dtype| self.kind.accepts(dtype))?;

        if let Some(value) = input.constant.as_ref().and_then(|c| self.kind.fold(c)) {
            return Ok([ValueInfo::from_constant(value)].into());
        }
        Ok([ValueInfo::new(input.dtype, input.shape.clone())].into())
    }
}

/// Softmax and LogSoftmax operators.
///
/// See <https://onnx.ai/onnx/operators/onnx__Softmax.html>.
#[derive(Debug)]
pub struct Softmax {
    pub axis: i64,
    pub log: bool,
}

impl InferOp for Softmax {
    fn op_type(&self) -> &str {
        if self.log {
            "LogSoftmax"
        } else {
            "Softmax"
        }
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        _ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 1, 1)?;
        let input = required(inputs, 0)?;
        check_dtype(self.op_type(), input, DataType::is_float)?;
        resolve_axis("axis", input.ndim(), self.axis)?;
        Ok([ValueInfo::new(input.dtype, input.shape.clone())].into())
    }
}

/// Clip operator.
///
/// Opsets before 11 give the bounds as `min` and `max` attributes. Later
/// opsets use optional scalar inputs.
///
/// See <https://onnx.ai/onnx/operators/onnx__Clip.html>.
#[derive(Debug, Default)]
pub struct Clip {
    pub min: Option<f32>,
    pub max: Option<f32>,
}

impl InferOp for Clip {
    fn op_type(&self) -> &str {
        "Clip"
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        _ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 1, 3)?;
        let input = required(inputs, 0)?;
        check_dtype("Clip", input, DataType::is_numeric)?;

        for (index, name) in [(1, "min"), (2, "max")] {
            if let Some(bound) = inputs.get(index).copied().flatten() {
                if bound.dtype != input.dtype {
                    return Err(OpError::dtype(format!(
                        "\"{}\" has type {} but input has type {}",
                        name, bound.dtype, input.dtype
                    )));
                }
            }
        }
        let min = merge_float("min", self.min, inputs, 1)?;
        let max = merge_float("max", self.max, inputs, 2)?;

        let bound = |param: Param<f64>, default: f64| match param {
            Param::Known(value) => Some(value),
            Param::Absent => Some(default),
            Param::Dynamic => None,
        };
        let bounds = bound(min, f64::NEG_INFINITY).zip(bound(max, f64::INFINITY));

        if let (Some(value), Some((min, max))) = (&input.constant, bounds) {
            let values = value
                .to_f64s()
                .into_iter()
                .map(|x| x.max(min).min(max))
                .collect();
            let clipped = Constant::from_floats(value.dtype(), value.shape(), values);
            return Ok([folded(clipped)].into());
        }

        Ok([ValueInfo::new(input.dtype, input.shape.clone())].into())
    }
}

/// Dropout operator.
///
/// Inference treats dropout as the identity. If a second output is declared
/// it is a `bool` mask with the shape of the input.
#[derive(Debug)]
pub struct Dropout;

impl InferOp for Dropout {
    fn op_type(&self) -> &str {
        "Dropout"
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 1, 3)?;
        let input = required(inputs, 0)?;

        let mut outputs = vec![input.clone()];
        if ctx.num_outputs > 1 {
            let mask = match input.fixed_shape() {
                Some(shape) if can_fold(&shape) => {
                    let len = shape.iter().product();
                    ValueInfo::from_constant(Constant::from_ints(
                        DataType::Bool,
                        &shape,
                        vec![1; len],
                    ))
                }
                _ => ValueInfo::new(DataType::Bool, input.shape.clone()),
            };
            outputs.push(mask);
        }
        Ok(outputs)
    }
}
