use tracing::trace;

use crate::axes::resolve_axis;
use crate::dim::{from_fixed, Dim, ShapeDisplay, SymbolGen};
use crate::dtype::DataType;
use crate::error::OpError;
use crate::ops::{
    can_fold, check_dtype, check_inputs, check_rank, check_scalar, folded, optional, required,
    InferCtx, InferOp, MAX_FOLD_ELEMENTS,
};
use crate::value::{self, ValueInfo};

/// Create a tensor of `shape` where every element is `fill`.
fn filled(fill: &value::Constant, shape: &[usize]) -> ValueInfo {
    if !can_fold(shape) {
        return ValueInfo::new(fill.dtype(), from_fixed(shape));
    }
    let len: usize = shape.iter().product();
    let filled = if fill.dtype().is_float() {
        let x = fill.to_f64s()[0];
        value::Constant::from_floats(fill.dtype(), shape, vec![x; len])
    } else {
        let x = fill.to_i64s()[0];
        value::Constant::from_ints(fill.dtype(), shape, vec![x; len])
    };
    folded(filled)
}

/// Resolve the output shape given by a 1-D integer shape input.
///
/// If the values are unknown the dims are dynamic. The number of dims must
/// be known.
fn shape_from_input(
    name: &str,
    input: &ValueInfo,
    sym_gen: &mut SymbolGen,
) -> Result<Vec<Dim>, OpError> {
    check_dtype(name, input, DataType::is_integer)?;
    check_rank(name, input, 1)?;
    if let Some(value) = &input.constant {
        return value
            .to_i64s()
            .into_iter()
            .map(|size| {
                usize::try_from(size)
                    .map(Dim::Fixed)
                    .map_err(|_| OpError::shape(format!("{} has negative size {}", name, size)))
            })
            .collect();
    }
    match &input.shape[0] {
        Dim::Fixed(len) => Ok(sym_gen.gen_shape(*len)),
        Dim::Symbol(_) => Err(OpError::shape(format!(
            "rank of {} output cannot be determined from input of shape {}",
            name,
            ShapeDisplay(&input.shape)
        ))),
    }
}

/// Constant operator.
///
/// The value is normalized from whichever of the `value*` attributes the
/// node has.
///
/// See <https://onnx.ai/onnx/operators/onnx__Constant.html>.
#[derive(Debug)]
pub struct Constant {
    pub value: value::Constant,
}

impl InferOp for Constant {
    fn op_type(&self) -> &str {
        "Constant"
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        _ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 0, 0)?;
        Ok([ValueInfo::from_constant(self.value.clone())].into())
    }
}

/// ConstantOfShape operator.
///
/// See <https://onnx.ai/onnx/operators/onnx__ConstantOfShape.html>.
#[derive(Debug, Default)]
pub struct ConstantOfShape {
    /// Single-element fill value. Defaults to a `float32` zero.
    pub value: Option<value::Constant>,
}

impl InferOp for ConstantOfShape {
    fn op_type(&self) -> &str {
        "ConstantOfShape"
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 1, 1)?;
        let shape_input = required(inputs, 0)?;

        let fill = match &self.value {
            Some(value) if value.len() != 1 => {
                return Err(OpError::attr(
                    "value",
                    format!("must have one element but has {}", value.len()),
                ))
            }
            Some(value) => value.reshaped(&[]),
            None => value::Constant::float_scalar(0.),
        };

        let shape = shape_from_input("ConstantOfShape", shape_input, ctx.sym_gen)?;
        match crate::dim::fixed_shape(&shape) {
            Some(shape) => Ok([filled(&fill, &shape)].into()),
            None => Ok([ValueInfo::new(fill.dtype(), shape)].into()),
        }
    }
}

/// ConstantFill operator from the experimental ONNX opsets.
///
/// The output shape comes from the `shape` attribute, the value of the
/// input (if `input_as_shape` is set) or the shape of the input. In each
/// case `extra_shape` is appended.
#[derive(Debug)]
pub struct ConstantFill {
    pub dtype: DataType,
    pub value: f32,
    pub shape: Option<Vec<i64>>,
    pub input_as_shape: bool,
    pub extra_shape: Vec<i64>,
}

impl Default for ConstantFill {
    fn default() -> Self {
        ConstantFill {
            dtype: DataType::Float,
            value: 0.,
            shape: None,
            input_as_shape: false,
            extra_shape: Vec::new(),
        }
    }
}

impl InferOp for ConstantFill {
    fn op_type(&self) -> &str {
        "ConstantFill"
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 0, 1)?;
        let input = optional(inputs, 0);

        let to_dims = |name: &str, sizes: &[i64]| -> Result<Vec<Dim>, OpError> {
            sizes
                .iter()
                .map(|&size| {
                    usize::try_from(size)
                        .map(Dim::Fixed)
                        .map_err(|_| OpError::attr(name, format!("size {} is negative", size)))
                })
                .collect()
        };

        let mut shape = match (input, &self.shape) {
            (Some(_), Some(_)) => {
                return Err(OpError::attr(
                    "shape",
                    "cannot be combined with an input",
                ))
            }
            (Some(input), None) if self.input_as_shape => {
                shape_from_input("ConstantFill", input, ctx.sym_gen)?
            }
            (Some(input), None) => input.shape.clone(),
            (None, Some(shape)) => to_dims("shape", shape)?,
            (None, None) if self.input_as_shape => return Err(OpError::MissingInput(0)),
            (None, None) => return Err(OpError::attr("shape", "is required")),
        };
        shape.extend(to_dims("extra_shape", &self.extra_shape)?);

        let fill = value::Constant::from_floats(self.dtype, &[], vec![self.value as f64]);
        match crate::dim::fixed_shape(&shape) {
            Some(shape) => Ok([filled(&fill, &shape)].into()),
            None => Ok([ValueInfo::new(self.dtype, shape)].into()),
        }
    }
}

/// Number of elements in an integer range, `max(ceil((limit - start) / delta), 0)`.
fn range_len(start: i64, limit: i64, delta: i64) -> usize {
    let (diff, delta) = (limit as i128 - start as i128, delta as i128);
    let mut len = diff / delta;
    if diff % delta != 0 && (diff < 0) == (delta < 0) {
        len += 1;
    }
    usize::try_from(len.max(0)).unwrap_or(usize::MAX)
}

/// Range operator.
///
/// See <https://onnx.ai/onnx/operators/onnx__Range.html>.
#[derive(Debug)]
pub struct Range;

impl InferOp for Range {
    fn op_type(&self) -> &str {
        "Range"
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 3, 3)?;
        let start = required(inputs, 0)?;
        let limit = required(inputs, 1)?;
        let delta = required(inputs, 2)?;

        check_dtype("Range", start, DataType::is_numeric)?;
        for (name, input) in [("start", start), ("limit", limit), ("delta", delta)] {
            check_scalar(name, input)?;
            if input.dtype != start.dtype {
                return Err(OpError::dtype(format!(
                    "\"{}\" has type {} but \"start\" has type {}",
                    name, input.dtype, start.dtype
                )));
            }
        }
        let dtype = start.dtype;

        let value = if dtype.is_float() {
            let (Some(start), Some(limit), Some(delta)) = (
                start.constant.as_ref().and_then(|c| c.float_item()),
                limit.constant.as_ref().and_then(|c| c.float_item()),
                delta.constant.as_ref().and_then(|c| c.float_item()),
            ) else {
                return Ok([ValueInfo::new(dtype, vec![ctx.sym_gen.gen_dim()])].into());
            };
            if delta == 0. {
                return Err(OpError::attr("delta", "cannot be zero"));
            }
            let len = ((limit - start) / delta).ceil().max(0.) as usize;
            if len > MAX_FOLD_ELEMENTS {
                return Ok([ValueInfo::new(dtype, vec![Dim::Fixed(len)])].into());
            }
            let values = (0..len).map(|i| start + i as f64 * delta).collect();
            value::Constant::from_floats(dtype, &[len], values)
        } else {
            let (Some(start), Some(limit), Some(delta)) = (
                start.constant.as_ref().and_then(|c| c.int_item()),
                limit.constant.as_ref().and_then(|c| c.int_item()),
                delta.constant.as_ref().and_then(|c| c.int_item()),
            ) else {
                return Ok([ValueInfo::new(dtype, vec![ctx.sym_gen.gen_dim()])].into());
            };
            if delta == 0 {
                return Err(OpError::attr("delta", "cannot be zero"));
            }
            let len = range_len(start, limit, delta);
            if len > MAX_FOLD_ELEMENTS {
                return Ok([ValueInfo::new(dtype, vec![Dim::Fixed(len)])].into());
            }
            let values = (0..len as i64).map(|i| start + i * delta).collect();
            value::Constant::from_ints(dtype, &[len], values)
        };
        trace!(len = value.len(), "evaluated Range");
        Ok([ValueInfo::from_constant(value)].into())
    }
}

/// NonZero operator.
///
/// The number of non-zero elements is only known if the input is constant.
///
/// See <https://onnx.ai/onnx/operators/onnx__NonZero.html>.
#[derive(Debug)]
pub struct NonZero;

impl InferOp for NonZero {
    fn op_type(&self) -> &str {
        "NonZero"
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 1, 1)?;
        let input = required(inputs, 0)?;
        check_dtype("NonZero", input, |dtype| dtype != DataType::String)?;
        let ndim = input.ndim();

        let Some(value) = &input.constant else {
            let shape = vec![Dim::Fixed(ndim), ctx.sym_gen.gen_dim()];
            return Ok([ValueInfo::new(DataType::Int64, shape)].into());
        };

        let shape = value.shape();
        let nonzero: Vec<usize> = value
            .to_f64s()
            .iter()
            .enumerate()
            .filter(|(_, x)| **x != 0.)
            .map(|(i, _)| i)
            .collect();
        let count = nonzero.len();

        // Output row `d` holds the coordinate along dim `d` of each element.
        let mut coords = vec![0i64; ndim * count];
        for (col, &flat) in nonzero.iter().enumerate() {
            let mut rem = flat;
            for d in (0..ndim).rev() {
                coords[d * count + col] = (rem % shape[d]) as i64;
                rem /= shape[d];
            }
        }
        let indices = value::Constant::from_ints(DataType::Int64, &[ndim, count], coords);
        Ok([folded(indices)].into())
    }
}

/// OneHot operator.
///
/// See <https://onnx.ai/onnx/operators/onnx__OneHot.html>.
#[derive(Debug)]
pub struct OneHot {
    pub axis: i64,
}

impl Default for OneHot {
    fn default() -> Self {
        OneHot { axis: -1 }
    }
}

impl InferOp for OneHot {
    fn op_type(&self) -> &str {
        "OneHot"
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 3, 3)?;
        let indices = required(inputs, 0)?;
        let depth = required(inputs, 1)?;
        let values = required(inputs, 2)?;

        check_dtype("OneHot", indices, DataType::is_numeric)?;
        check_dtype("OneHot", depth, DataType::is_numeric)?;
        check_scalar("depth", depth)?;
        check_rank("values", values, 1)?;
        if let Dim::Fixed(len) = values.shape[0] {
            if len != 2 {
                return Err(OpError::shape(format!(
                    "\"values\" must have 2 elements but has {}",
                    len
                )));
            }
        }

        let axis = resolve_axis("axis", indices.ndim() + 1, self.axis)?;
        let depth_dim = match depth.constant.as_ref().and_then(|c| c.float_item()) {
            Some(depth) if depth < 1. => {
                return Err(OpError::shape(format!("depth {} must be positive", depth)))
            }
            Some(depth) => Dim::Fixed(depth as usize),
            None => ctx.sym_gen.gen_dim(),
        };

        let mut shape = indices.shape.clone();
        shape.insert(axis, depth_dim);
        Ok([ValueInfo::new(values.dtype, shape)].into())
    }
}

#[cfg(test)]
mod tests {
    use onnx_sema_testing::TestCases;

    use super::{Constant, ConstantFill, ConstantOfShape, NonZero, OneHot, Range};
    use crate::dim::Dim;
    use crate::dtype::DataType;
    use crate::error::OpError;
    use crate::ops::test_util::{float, infer, infer_shape};
    use crate::value::{self, ValueInfo};

    fn int32_vec(values: &[i64]) -> ValueInfo {
        ValueInfo::from_constant(value::Constant::from_ints(
            DataType::Int32,
            &[values.len()],
            values.to_vec(),
        ))
    }

    #[test]
    fn test_constant() {
        let op = Constant {
            value: value::Constant::float_vec(vec![0., 1., 2.]),
        };
        let outputs = infer(&op, &[]).unwrap();
        assert_eq!(outputs[0].shape, dims![3]);
        assert_eq!(outputs[0].constant.as_ref().unwrap().to_f64s(), [0., 1., 2.]);
    }

    #[test]
    fn test_constant_of_shape() {
        #[derive(Debug)]
        struct Case {
            value: Option<value::Constant>,
            shape: Vec<i64>,
            expected_dtype: DataType,
            expected_shape: Vec<Dim>,
        }

        let cases = [
            Case {
                value: None,
                shape: vec![2, 3, 4],
                expected_dtype: DataType::Float,
                expected_shape: dims![2, 3, 4],
            },
            Case {
                value: Some(value::Constant::int64_vec(vec![10])),
                shape: vec![2, 3, 4],
                expected_dtype: DataType::Int64,
                expected_shape: dims![2, 3, 4],
            },
            Case {
                value: Some(value::Constant::int64_vec(vec![10])),
                shape: vec![],
                expected_dtype: DataType::Int64,
                expected_shape: dims![],
            },
        ];

        cases.test_each(|case| {
            let op = ConstantOfShape {
                value: case.value.clone(),
            };
            let outputs = infer(&op, &[int32_vec(&case.shape)]).unwrap();
            assert_eq!(outputs[0].dtype, case.expected_dtype);
            assert_eq!(outputs[0].shape, case.expected_shape);
            assert!(outputs[0].constant.is_some());
        })
    }

    #[test]
    fn test_constant_of_shape_dynamic() {
        let op = ConstantOfShape::default();
        let shape = ValueInfo::new(DataType::Int64, dims![3]);
        let outputs = infer(&op, &[shape]).unwrap();
        assert_eq!(outputs[0].ndim(), 3);
        assert!(outputs[0].shape.iter().all(|d| !d.is_fixed()));

        let shape = ValueInfo::new(DataType::Int64, dims!["n"]);
        assert!(matches!(infer(&op, &[shape]), Err(OpError::ShapeMismatch(_))));

        let op = ConstantOfShape {
            value: Some(value::Constant::float_vec(vec![1., 2.])),
        };
        assert!(matches!(
            infer(&op, &[int32_vec(&[2])]),
            Err(OpError::InvalidAttribute { .. })
        ));
    }

    #[test]
    fn test_constant_fill() {
        let op = ConstantFill {
            value: 1.,
            shape: Some(vec![2, 3]),
            ..Default::default()
        };
        let outputs = infer(&op, &[]).unwrap();
        assert_eq!(outputs[0].shape, dims![2, 3]);
        assert_eq!(outputs[0].constant.as_ref().unwrap().to_f64s(), [1.; 6]);

        let op = ConstantFill {
            value: 1.,
            input_as_shape: true,
            ..Default::default()
        };
        assert_eq!(infer_shape(&op, &[int32_vec(&[2, 3])]), Ok(dims![2, 3]));

        let op = ConstantFill {
            dtype: DataType::Int32,
            extra_shape: vec![4],
            ..Default::default()
        };
        let outputs = infer(&op, &[float(dims!["n", 2])]).unwrap();
        assert_eq!(outputs[0].dtype, DataType::Int32);
        assert_eq!(outputs[0].shape, dims!["n", 2, 4]);

        assert!(matches!(
            infer(&ConstantFill::default(), &[]),
            Err(OpError::InvalidAttribute { .. })
        ));
    }

    #[test]
    fn test_range() {
        #[derive(Debug)]
        struct Case {
            dtype: DataType,
            start: f64,
            limit: f64,
            delta: f64,
            expected: Vec<f64>,
        }

        let cases = [
            Case {
                dtype: DataType::Int64,
                start: 10.,
                limit: 6.,
                delta: -3.,
                expected: vec![10., 7.],
            },
            Case {
                dtype: DataType::Float,
                start: 2.,
                limit: 11.,
                delta: 2.,
                expected: vec![2., 4., 6., 8., 10.],
            },
            Case {
                dtype: DataType::Int32,
                start: 5.,
                limit: 1.,
                delta: 1.,
                expected: vec![],
            },
        ];

        cases.test_each(|case| {
            let scalar = |x: f64| {
                ValueInfo::from_constant(value::Constant::from_floats(case.dtype, &[], vec![x]))
            };
            let inputs = [scalar(case.start), scalar(case.limit), scalar(case.delta)];
            let outputs = infer(&Range, &inputs).unwrap();
            let value = outputs[0].constant.as_ref().unwrap();
            assert_eq!(value.dtype(), case.dtype);
            assert_eq!(value.to_f64s(), case.expected);
        })
    }

    #[test]
    fn test_range_exact_ints() {
        let scalar = |x: i64| ValueInfo::from_constant(value::Constant::int64_scalar(x));
        let start = (1 << 53) + 1;

        let outputs = infer(&Range, &[scalar(start), scalar(start + 3), scalar(1)]).unwrap();
        let value = outputs[0].constant.as_ref().unwrap();
        assert_eq!(value.to_i64s(), [start, start + 1, start + 2]);

        let outputs = infer(&Range, &[scalar(start), scalar(start - 5), scalar(-2)]).unwrap();
        let value = outputs[0].constant.as_ref().unwrap();
        assert_eq!(value.to_i64s(), [start, start - 2, start - 4]);

        let outputs = infer(&Range, &[scalar(i64::MIN), scalar(i64::MAX), scalar(1)]).unwrap();
        assert_eq!(outputs[0].shape, dims![u64::MAX as usize]);
        assert!(outputs[0].constant.is_none());
    }

    #[test]
    fn test_range_errors() {
        let scalar = |x: i64| ValueInfo::from_constant(value::Constant::int64_scalar(x));
        assert!(matches!(
            infer(&Range, &[scalar(0), scalar(5), scalar(0)]),
            Err(OpError::InvalidAttribute { .. })
        ));

        let dynamic = ValueInfo::new(DataType::Int64, dims![]);
        let outputs = infer(&Range, &[scalar(0), dynamic, scalar(1)]).unwrap();
        assert_eq!(outputs[0].ndim(), 1);
        assert!(!outputs[0].shape[0].is_fixed());

        let float_limit = ValueInfo::from_constant(value::Constant::float_scalar(5.));
        assert!(matches!(
            infer(&Range, &[scalar(0), float_limit, scalar(1)]),
            Err(OpError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_nonzero() {
        let data = value::Constant::from_floats(DataType::Float, &[2, 2], vec![1., 0., 1., 1.]);
        let outputs = infer(&NonZero, &[ValueInfo::from_constant(data)]).unwrap();
        let indices = outputs[0].constant.as_ref().unwrap();
        assert_eq!(indices.shape(), [2, 3]);
        assert_eq!(indices.to_i64s(), [0, 1, 1, 0, 0, 1]);

        let outputs = infer(&NonZero, &[float(dims![4, 5, 6])]).unwrap();
        assert_eq!(outputs[0].dtype, DataType::Int64);
        assert_eq!(outputs[0].shape[0], Dim::Fixed(3));
        assert!(!outputs[0].shape[1].is_fixed());
    }

    #[test]
    fn test_onehot() {
        let indices = ValueInfo::new(DataType::Int32, dims![5, 2]);
        let depth = ValueInfo::from_constant(value::Constant::from_ints(
            DataType::Int32,
            &[],
            vec![3],
        ));
        let values = ValueInfo::new(DataType::Float16, dims![2]);

        let op = OneHot { axis: 0 };
        let outputs = infer(&op, &[indices.clone(), depth.clone(), values.clone()]).unwrap();
        assert_eq!(outputs[0].dtype, DataType::Float16);
        assert_eq!(outputs[0].shape, dims![3, 5, 2]);

        let op = OneHot::default();
        assert_eq!(
            infer_shape(&op, &[indices.clone(), depth.clone(), values]),
            Ok(dims![5, 2, 3])
        );

        let values = ValueInfo::new(DataType::Float, dims![3]);
        assert!(matches!(
            infer(&op, &[indices, depth, values]),
            Err(OpError::ShapeMismatch(_))
        ));
    }
}
