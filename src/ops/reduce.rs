use crate::axes::{resolve_axes, resolve_axis, Axes};
use crate::dim::{fixed_shape, Dim};
use crate::dtype::DataType;
use crate::error::OpError;
use crate::ops::{check_dtype, check_inputs, folded, merge_ints, required, InferCtx, InferOp, Param};
use crate::value::{Constant, ValueInfo};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReduceKind {
    L1,
    L2,
    LogSum,
    LogSumExp,
    Max,
    Mean,
    Min,
    Prod,
    Sum,
    SumSquare,
}

impl ReduceKind {
    pub fn name(self) -> &'static str {
        match self {
            ReduceKind::L1 => "ReduceL1",
            ReduceKind::L2 => "ReduceL2",
            ReduceKind::LogSum => "ReduceLogSum",
            ReduceKind::LogSumExp => "ReduceLogSumExp",
            ReduceKind::Max => "ReduceMax",
            ReduceKind::Mean => "ReduceMean",
            ReduceKind::Min => "ReduceMin",
            ReduceKind::Prod => "ReduceProd",
            ReduceKind::Sum => "ReduceSum",
            ReduceKind::SumSquare => "ReduceSumSquare",
        }
    }

    fn accepts(self, dtype: DataType) -> bool {
        match self {
            ReduceKind::LogSum | ReduceKind::LogSumExp => dtype.is_float(),
            _ => dtype.is_numeric(),
        }
    }

    /// Reduce a group of elements. `values` is never empty.
    fn apply(self, values: &[f64]) -> f64 {
        let sum = || values.iter().sum::<f64>();
        let sum_squares = || values.iter().map(|x| x * x).sum::<f64>();
        match self {
            ReduceKind::L1 => values.iter().map(|x| x.abs()).sum(),
            ReduceKind::L2 => sum_squares().sqrt(),
            ReduceKind::LogSum => sum().ln(),
            ReduceKind::LogSumExp => {
                let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                max + values.iter().map(|x| (x - max).exp()).sum::<f64>().ln()
            }
            ReduceKind::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            ReduceKind::Mean => sum() / values.len() as f64,
            ReduceKind::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            ReduceKind::Prod => values.iter().product(),
            ReduceKind::Sum => sum(),
            ReduceKind::SumSquare => sum_squares(),
        }
    }

    /// Reduce a group of integers, for the reductions that stay in the
    /// integer domain. Arithmetic wraps like the output type does.
    fn apply_int(self, values: &[i64]) -> Option<i64> {
        let x = match self {
            ReduceKind::L1 => values
                .iter()
                .fold(0i64, |acc, x| acc.wrapping_add(x.wrapping_abs())),
            ReduceKind::Max => values.iter().copied().max()?,
            ReduceKind::Min => values.iter().copied().min()?,
            ReduceKind::Prod => values.iter().fold(1i64, |acc, &x| acc.wrapping_mul(x)),
            ReduceKind::Sum => values.iter().fold(0i64, |acc, &x| acc.wrapping_add(x)),
            ReduceKind::SumSquare => {
                values.iter().fold(0i64, |acc, &x| acc.wrapping_add(x.wrapping_mul(x)))
            }
            ReduceKind::L2 | ReduceKind::LogSum | ReduceKind::LogSumExp | ReduceKind::Mean => {
                return None
            }
        };
        Some(x)
    }
}

/// Return the shape of a reduction's output, with reduced axes either kept
/// as size 1 or removed.
fn reduced_shape(shape: &[Dim], axes: &[usize], keep_dims: bool) -> Vec<Dim> {
    shape
        .iter()
        .enumerate()
        .filter_map(|(i, dim)| match (axes.contains(&i), keep_dims) {
            (false, _) => Some(dim.clone()),
            (true, true) => Some(Dim::Fixed(1)),
            (true, false) => None,
        })
        .collect()
}

/// Split the elements of `values`, which has shape `shape`, into the groups
/// that reduce to each element of an output of shape `kept`.
fn group_elements<T: Clone>(values: Vec<T>, shape: &[usize], kept: &[usize]) -> Vec<Vec<T>> {
    let out_len: usize = kept.iter().product();
    let mut groups = vec![Vec::new(); out_len];
    let mut coords = vec![0usize; shape.len()];
    for x in values {
        let out_index = coords
            .iter()
            .zip(kept)
            .fold(0, |index, (&c, &size)| index * size + c.min(size - 1));
        groups[out_index].push(x);

        for (c, &size) in coords.iter_mut().zip(shape).rev() {
            *c += 1;
            if *c < size {
                break;
            }
            *c = 0;
        }
    }
    groups
}

/// Evaluate a reduction of a constant.
///
/// Integer sums, products and extrema are computed exactly in `i64`.
fn reduce_constant(kind: ReduceKind, value: &Constant, axes: &[usize]) -> Option<Constant> {
    let shape = value.shape();
    if value.is_empty() {
        return None;
    }
    let kept: Vec<usize> = shape
        .iter()
        .enumerate()
        .map(|(i, &size)| if axes.contains(&i) { 1 } else { size })
        .collect();

    // uint64 values above `i64::MAX` are stored wrapped, so they do not
    // order correctly as `i64`.
    let unsigned_extremum = value.dtype() == DataType::UInt64
        && matches!(kind, ReduceKind::Max | ReduceKind::Min);
    if !value.dtype().is_float() && !unsigned_extremum {
        let groups = group_elements(value.to_i64s(), shape, &kept);
        let values: Option<Vec<i64>> = groups.iter().map(|g| kind.apply_int(g)).collect();
        if let Some(values) = values {
            return Some(Constant::from_ints(value.dtype(), &kept, values));
        }
    }

    let groups = group_elements(value.to_f64s(), shape, &kept);
    let values: Vec<_> = groups.iter().map(|g| kind.apply(g)).collect();
    Some(Constant::from_floats(value.dtype(), &kept, values))
}

/// Reduction operators (ReduceSum, ReduceMean etc.).
///
/// See <https://onnx.ai/onnx/operators/onnx__ReduceSum.html>.
#[derive(Debug)]
pub struct Reduce {
    pub kind: ReduceKind,

    /// Axes from the attribute form. Newer opsets pass axes as the second
    /// input instead.
    pub axes: Option<Vec<i64>>,
    pub keep_dims: bool,
    pub noop_with_empty_axes: bool,
}

impl Reduce {
    pub fn new(kind: ReduceKind) -> Reduce {
        Reduce {
            kind,
            axes: None,
            keep_dims: true,
            noop_with_empty_axes: false,
        }
    }
}

impl InferOp for Reduce {
    fn op_type(&self) -> &str {
        self.kind.name()
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 1, 2)?;
        let data = required(inputs, 0)?;
        check_dtype(self.op_type(), data, |dtype| self.kind.accepts(dtype))?;
        let ndim = data.ndim();

        let axes: Axes = match merge_ints("axes", self.axes.as_deref(), inputs, 1)? {
            Param::Known(axes) if !axes.is_empty() => resolve_axes("axes", ndim, axes.iter())?,
            Param::Known(_) | Param::Absent if self.noop_with_empty_axes => {
                return Ok([data.clone()].into());
            }
            Param::Known(_) | Param::Absent => (0..ndim).collect(),
            Param::Dynamic if self.keep_dims => {
                let shape = ctx.sym_gen.gen_shape(ndim);
                return Ok([ValueInfo::new(data.dtype, shape)].into());
            }
            Param::Dynamic => {
                return Err(OpError::attr(
                    "axes",
                    "must be constant when \"keepdims\" is 0",
                ));
            }
        };

        let shape = reduced_shape(&data.shape, &axes, self.keep_dims);
        let output = match &data.constant {
            Some(value) => match reduce_constant(self.kind, value, &axes) {
                Some(result) => {
                    let out_shape = fixed_shape(&shape).unwrap_or_default();
                    folded(result.reshaped(&out_shape))
                }
                None => ValueInfo::new(data.dtype, shape),
            },
            None => ValueInfo::new(data.dtype, shape),
        };
        Ok([output].into())
    }
}

/// ArgMax and ArgMin operators.
///
/// See <https://onnx.ai/onnx/operators/onnx__ArgMax.html>.
#[derive(Debug)]
pub struct ArgReduce {
    /// True for ArgMax, false for ArgMin.
    pub max: bool,
    pub axis: i64,
    pub keep_dims: bool,
    pub select_last_index: bool,
}

impl InferOp for ArgReduce {
    fn op_type(&self) -> &str {
        if self.max {
            "ArgMax"
        } else {
            "ArgMin"
        }
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        _ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 1, 1)?;
        let data = required(inputs, 0)?;
        check_dtype(self.op_type(), data, DataType::is_numeric)?;
        let axis = resolve_axis("axis", data.ndim(), self.axis)?;
        let shape = reduced_shape(&data.shape, &[axis], self.keep_dims);
        Ok([ValueInfo::new(DataType::Int64, shape)].into())
    }
}

#[cfg(test)]
mod tests {
    use onnx_sema_testing::TestCases;

    use super::{ArgReduce, Reduce, ReduceKind};
    use crate::dim::Dim;
    use crate::dtype::DataType;
    use crate::error::OpError;
    use crate::ops::test_util::{float, infer, infer_shape, infer_with};
    use crate::value::{Constant, ValueInfo};

    #[test]
    fn test_reduce_shapes() {
        #[derive(Clone, Debug)]
        struct Case {
            input: Vec<Dim>,
            axes: Option<Vec<i64>>,
            keep_dims: bool,
            expected: Vec<Dim>,
        }

        let cases = [
            Case {
                input: dims![3, 4, 5, 6],
                axes: Some(vec![2]),
                keep_dims: false,
                expected: dims![3, 4, 6],
            },
            Case {
                input: dims![3, 4, 5, 6],
                axes: Some(vec![-4]),
                keep_dims: true,
                expected: dims![1, 4, 5, 6],
            },
            Case {
                input: dims![3, 4, 5, 6],
                axes: Some(vec![2, 3]),
                keep_dims: false,
                expected: dims![3, 4],
            },
            Case {
                input: dims![3, 4, 5, 6],
                axes: Some(vec![2, -1, 2]),
                keep_dims: true,
                expected: dims![3, 4, 1, 1],
            },
            Case {
                input: dims!["batch", 4],
                axes: None,
                keep_dims: true,
                expected: dims![1, 1],
            },
            Case {
                input: dims!["batch", 4],
                axes: None,
                keep_dims: false,
                expected: dims![],
            },
        ];

        cases.test_each_clone(|case| {
            let op = Reduce {
                axes: case.axes,
                keep_dims: case.keep_dims,
                ..Reduce::new(ReduceKind::Sum)
            };
            assert_eq!(infer_shape(&op, &[float(case.input)]), Ok(case.expected));
        })
    }

    #[test]
    fn test_reduce_axes_input() {
        let op = Reduce::new(ReduceKind::Mean);
        let data = float(dims![3, 4, 5]);
        let axes = ValueInfo::from_constant(Constant::int64_vec(vec![1]));
        let outputs = infer_with(&op, &[Some(&data), Some(&axes)], 1).unwrap();
        assert_eq!(outputs[0].shape, dims![3, 1, 5]);

        // Both attribute and input.
        let op = Reduce {
            axes: Some(vec![1]),
            ..Reduce::new(ReduceKind::Mean)
        };
        let result = infer_with(&op, &[Some(&data), Some(&axes)], 1);
        assert!(matches!(result, Err(OpError::InvalidAttribute { .. })));

        // Empty axes with `noop_with_empty_axes`.
        let op = Reduce {
            noop_with_empty_axes: true,
            ..Reduce::new(ReduceKind::Sum)
        };
        assert_eq!(infer_shape(&op, &[data.clone()]), Ok(dims![3, 4, 5]));

        // Dynamic axes.
        let dynamic = ValueInfo::new(DataType::Int64, dims![1]);
        let op = Reduce::new(ReduceKind::Sum);
        let outputs = infer_with(&op, &[Some(&data), Some(&dynamic)], 1).unwrap();
        assert_eq!(outputs[0].ndim(), 3);
        assert!(outputs[0].shape.iter().all(|d| !d.is_fixed()));
    }

    #[test]
    fn test_reduce_fold() {
        #[derive(Debug)]
        struct Case {
            kind: ReduceKind,
            axes: Vec<i64>,
            expected: Vec<f64>,
        }

        let cases = [
            Case {
                kind: ReduceKind::Sum,
                axes: vec![1],
                expected: vec![6., 15.],
            },
            Case {
                kind: ReduceKind::Prod,
                axes: vec![0],
                expected: vec![4., 10., 18.],
            },
            Case {
                kind: ReduceKind::Max,
                axes: vec![0, 1],
                expected: vec![6.],
            },
            Case {
                kind: ReduceKind::Mean,
                axes: vec![1],
                expected: vec![2., 5.],
            },
            Case {
                kind: ReduceKind::SumSquare,
                axes: vec![1],
                expected: vec![14., 77.],
            },
        ];

        let data = ValueInfo::from_constant(Constant::from_floats(
            DataType::Float,
            &[2, 3],
            vec![1., 2., 3., 4., 5., 6.],
        ));

        cases.test_each(|case| {
            let op = Reduce {
                axes: Some(case.axes.clone()),
                keep_dims: false,
                ..Reduce::new(case.kind)
            };
            let outputs = infer(&op, &[data.clone()]).unwrap();
            let value = outputs[0].constant.as_ref().unwrap();
            assert_eq!(value.to_f64s(), case.expected);
        })
    }

    #[test]
    fn test_reduce_fold_exact_ints() {
        let big = (1i64 << 53) + 1;
        let data = ValueInfo::from_constant(Constant::from_ints(
            DataType::Int64,
            &[2, 2],
            vec![big, 2, 3, big],
        ));
        let op = |kind| Reduce {
            axes: Some(vec![1]),
            keep_dims: false,
            ..Reduce::new(kind)
        };

        let outputs = infer(&op(ReduceKind::Sum), &[data.clone()]).unwrap();
        let value = outputs[0].constant.as_ref().unwrap();
        assert_eq!(value.to_i64s(), [big + 2, big + 3]);

        let outputs = infer(&op(ReduceKind::Prod), &[data.clone()]).unwrap();
        let value = outputs[0].constant.as_ref().unwrap();
        assert_eq!(value.to_i64s(), [big * 2, big * 3]);

        let outputs = infer(&op(ReduceKind::Min), &[data]).unwrap();
        let value = outputs[0].constant.as_ref().unwrap();
        assert_eq!(value.to_i64s(), [2, 3]);
    }

    #[test]
    fn test_reduce_types() {
        let op = Reduce::new(ReduceKind::LogSumExp);
        let ints = ValueInfo::new(DataType::Int32, dims![2, 3]);
        assert!(matches!(infer(&op, &[ints]), Err(OpError::TypeMismatch(_))));
    }

    #[test]
    fn test_arg_reduce() {
        let op = ArgReduce {
            max: true,
            axis: 2,
            keep_dims: false,
            select_last_index: false,
        };
        let outputs = infer(&op, &[float(dims![3, 4, 5, 6])]).unwrap();
        assert_eq!(outputs[0].dtype, DataType::Int64);
        assert_eq!(outputs[0].shape, dims![3, 4, 6]);

        let op = ArgReduce {
            max: false,
            axis: -1,
            keep_dims: true,
            select_last_index: false,
        };
        let shape = infer_shape(&op, &[float(dims![3, 4, 5, 6])]);
        assert_eq!(shape, Ok(dims![3, 4, 5, 1]));

        let op = ArgReduce { axis: 4, ..op };
        assert!(infer(&op, &[float(dims![3, 4, 5, 6])]).is_err());
    }
}
