use rten_tensor::prelude::*;
use rten_tensor::Tensor;

use crate::broadcast::{
    broadcast_fixed, broadcast_many, broadcast_shapes, broadcast_zip, check_unidirectional,
    legacy_aligned_shape, legacy_broadcast, legacy_broadcast_axis,
};
use crate::dtype::DataType;
use crate::error::OpError;
use crate::ops::{can_fold, check_dtype, check_inputs, common_dtype, required, InferCtx, InferOp};
use crate::value::{Constant, TensorData, ValueInfo};

/// Elementwise operators with two inputs.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinaryKind {
    Add,
    And,
    Div,
    Equal,
    Greater,
    Less,
    Mul,
    Or,
    Pow,
    Sub,
    Xor,
}

impl BinaryKind {
    pub fn name(self) -> &'static str {
        match self {
            BinaryKind::Add => "Add",
            BinaryKind::And => "And",
            BinaryKind::Div => "Div",
            BinaryKind::Equal => "Equal",
            BinaryKind::Greater => "Greater",
            BinaryKind::Less => "Less",
            BinaryKind::Mul => "Mul",
            BinaryKind::Or => "Or",
            BinaryKind::Pow => "Pow",
            BinaryKind::Sub => "Sub",
            BinaryKind::Xor => "Xor",
        }
    }

    fn is_logical(self) -> bool {
        matches!(self, BinaryKind::And | BinaryKind::Or | BinaryKind::Xor)
    }

    /// Return true if the operator produces a `bool` output.
    fn is_predicate(self) -> bool {
        self.is_logical()
            || matches!(
                self,
                BinaryKind::Equal | BinaryKind::Greater | BinaryKind::Less
            )
    }

    fn accepts(self, dtype: DataType) -> bool {
        match self {
            BinaryKind::And | BinaryKind::Or | BinaryKind::Xor => dtype == DataType::Bool,
            BinaryKind::Equal => true,
            _ => dtype.is_numeric(),
        }
    }

    fn apply_float(self, x: f64, y: f64) -> f64 {
        match self {
            BinaryKind::Add => x + y,
            BinaryKind::Sub => x - y,
            BinaryKind::Mul => x * y,
            BinaryKind::Div => x / y,
            BinaryKind::Pow => x.powf(y),
            BinaryKind::Equal => (x == y) as i64 as f64,
            BinaryKind::Greater => (x > y) as i64 as f64,
            BinaryKind::Less => (x < y) as i64 as f64,
            BinaryKind::And | BinaryKind::Or | BinaryKind::Xor => 0.,
        }
    }

    fn apply_int(self, x: i64, y: i64) -> Option<i64> {
        let z = match self {
            BinaryKind::Add => x.wrapping_add(y),
            BinaryKind::Sub => x.wrapping_sub(y),
            BinaryKind::Mul => x.wrapping_mul(y),
            BinaryKind::Div if y == 0 => return None,
            BinaryKind::Div => x.wrapping_div(y),
            BinaryKind::Pow if y < 0 => return None,
            BinaryKind::Pow => x.wrapping_pow(y.min(u32::MAX as i64) as u32),
            BinaryKind::Equal => (x == y) as i64,
            BinaryKind::Greater => (x > y) as i64,
            BinaryKind::Less => (x < y) as i64,
            BinaryKind::And => (x != 0 && y != 0) as i64,
            BinaryKind::Or => (x != 0 || y != 0) as i64,
            BinaryKind::Xor => ((x != 0) != (y != 0)) as i64,
        };
        Some(z)
    }
}

/// Elementwise binary operator.
///
/// If `broadcast` is set, the legacy (opset < 7) broadcasting rules are used,
/// where `B` is aligned into `A` starting at `axis`.
///
/// See <https://onnx.ai/onnx/repo-docs/Broadcasting.html>.
#[derive(Debug)]
pub struct Binary {
    pub kind: BinaryKind,
    pub broadcast: bool,
    pub axis: Option<i64>,
}

impl Binary {
    pub fn new(kind: BinaryKind) -> Binary {
        Binary {
            kind,
            broadcast: false,
            axis: None,
        }
    }

    fn fold(&self, a: &Constant, b: &Constant, dtype: DataType) -> Option<Constant> {
        let b = if self.broadcast {
            let axis = legacy_broadcast_axis(a.ndim(), b.ndim(), self.axis).ok()?;
            b.reshaped(&legacy_aligned_shape(b.shape(), a.ndim(), axis))
        } else {
            b.clone()
        };
        let out_shape = broadcast_fixed(a.shape(), b.shape())?;
        if !can_fold(&out_shape) {
            return None;
        }

        let out_dtype = if self.kind.is_predicate() {
            DataType::Bool
        } else {
            dtype
        };

        // Pow keeps the type of the base and may have an exponent of another
        // type, so it is always evaluated in floating point.
        if self.kind == BinaryKind::Pow && (dtype.is_float() || b.dtype().is_float()) {
            let x = float_tensor(a);
            let y = float_tensor(&b);
            let z = broadcast_zip(&x, &y, &out_shape, |x, y| x.powf(y));
            return Some(Constant::from_floats(out_dtype, &out_shape, z.to_vec()));
        }

        let a = a.cast(dtype);
        let b = b.cast(dtype);
        match (a.data(), b.data()) {
            (TensorData::Float(x), TensorData::Float(y)) => {
                let kind = self.kind;
                let z = broadcast_zip(x, y, &out_shape, |x, y| kind.apply_float(x, y));
                Some(Constant::from_floats(out_dtype, &out_shape, z.to_vec()))
            }
            (TensorData::Int(x), TensorData::Int(y)) => {
                let kind = self.kind;
                let z = broadcast_zip(x, y, &out_shape, |x, y| kind.apply_int(x, y));
                let values = z.iter().copied().collect::<Option<Vec<_>>>()?;
                Some(Constant::from_ints(out_dtype, &out_shape, values))
            }
            _ => None,
        }
    }
}

fn float_tensor(value: &Constant) -> Tensor<f64> {
    Tensor::from_data(value.shape(), value.to_f64s())
}

impl InferOp for Binary {
    fn op_type(&self) -> &str {
        self.kind.name()
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 2, 2)?;
        let a = required(inputs, 0)?;
        let b = required(inputs, 1)?;

        let accepts = |dtype: DataType| self.kind.accepts(dtype);
        check_dtype(self.op_type(), a, accepts)?;
        check_dtype(self.op_type(), b, accepts)?;

        let dtype = if self.kind == BinaryKind::Pow {
            a.dtype
        } else {
            common_dtype(self.op_type(), &[a.dtype, b.dtype], ctx.implicit_promotion)?
        };

        let shape = if self.broadcast {
            legacy_broadcast(&a.shape, &b.shape, self.axis)?
        } else {
            broadcast_shapes(&a.shape, &b.shape, ctx.sym_gen)?
        };

        if let (Some(x), Some(y)) = (&a.constant, &b.constant) {
            if let Some(value) = self.fold(x, y, dtype) {
                return Ok([ValueInfo::from_constant(value)].into());
            }
        }

        let out_dtype = if self.kind.is_predicate() {
            DataType::Bool
        } else {
            dtype
        };
        Ok([ValueInfo::new(out_dtype, shape)].into())
    }
}

/// PRelu operator.
///
/// The slope must be unidirectionally broadcastable to the input.
///
/// See <https://onnx.ai/onnx/operators/onnx__PRelu.html>.
#[derive(Debug)]
pub struct PRelu;

impl InferOp for PRelu {
    fn op_type(&self) -> &str {
        "PRelu"
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 2, 2)?;
        let x = required(inputs, 0)?;
        let slope = required(inputs, 1)?;
        check_dtype("PRelu", x, DataType::is_numeric)?;
        let dtype = common_dtype("PRelu", &[x.dtype, slope.dtype], ctx.implicit_promotion)?;
        check_unidirectional(&slope.shape, &x.shape)?;
        Ok([ValueInfo::new(dtype, x.shape.clone())].into())
    }
}

/// Elementwise operators with a variable number of inputs.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VariadicKind {
    Max,
    Mean,
    Min,
    Sum,
}

impl VariadicKind {
    pub fn name(self) -> &'static str {
        match self {
            VariadicKind::Max => "Max",
            VariadicKind::Mean => "Mean",
            VariadicKind::Min => "Min",
            VariadicKind::Sum => "Sum",
        }
    }
}

/// Variadic elementwise operator (Max, Mean, Min or Sum).
///
/// All inputs are broadcast together and must have the same type.
#[derive(Debug)]
pub struct Variadic {
    pub kind: VariadicKind,
}

impl Variadic {
    fn fold(&self, values: &[&Constant], dtype: DataType) -> Option<Constant> {
        let out_shape = values
            .iter()
            .try_fold(Vec::new(), |shape, value| broadcast_fixed(&shape, value.shape()))?;
        if !can_fold(&out_shape) {
            return None;
        }

        // Accumulate in f64, which is exact for the integer ranges that
        // appear in shape computations.
        let mut acc: Option<Tensor<f64>> = None;
        for value in values {
            let x = float_tensor(&value.cast(dtype));
            acc = Some(match acc {
                None => x.broadcast(out_shape.as_slice()).to_tensor(),
                Some(acc) => broadcast_zip(&acc, &x, &out_shape, |a, b| match self.kind {
                    VariadicKind::Max => a.max(b),
                    VariadicKind::Min => a.min(b),
                    VariadicKind::Mean | VariadicKind::Sum => a + b,
                }),
            });
        }
        let mut result = acc?.to_vec();
        if self.kind == VariadicKind::Mean {
            let n = values.len() as f64;
            result.iter_mut().for_each(|x| *x /= n);
        }
        Some(Constant::from_floats(dtype, &out_shape, result))
    }
}

impl InferOp for Variadic {
    fn op_type(&self) -> &str {
        self.kind.name()
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 1, usize::MAX)?;
        let inputs: Vec<&ValueInfo> = (0..inputs.len())
            .map(|i| required(inputs, i))
            .collect::<Result<_, _>>()?;

        for input in &inputs {
            if self.kind == VariadicKind::Mean {
                check_dtype(self.op_type(), input, DataType::is_float)?;
            } else {
                check_dtype(self.op_type(), input, DataType::is_numeric)?;
            }
        }
        let dtypes: Vec<DataType> = inputs.iter().map(|input| input.dtype).collect();
        let dtype = common_dtype(self.op_type(), &dtypes, ctx.implicit_promotion)?;
        let shape = broadcast_many(inputs.iter().map(|input| input.shape.as_slice()), ctx.sym_gen)?;

        let constants: Option<Vec<&Constant>> =
            inputs.iter().map(|input| input.constant.as_ref()).collect();
        if let Some(value) = constants.and_then(|values| self.fold(&values, dtype)) {
            return Ok([ValueInfo::from_constant(value)].into());
        }

        Ok([ValueInfo::new(dtype, shape)].into())
    }
}

#[cfg(test)]
mod tests {
    use onnx_sema_testing::TestCases;

    use super::{Binary, BinaryKind, PRelu, Variadic, VariadicKind};
    use crate::dim::{Dim, SymbolGen};
    use crate::dtype::DataType;
    use crate::error::OpError;
    use crate::ops::test_util::{float, infer, infer_shape};
    use crate::ops::{InferCtx, InferOp};
    use crate::value::{Constant, ValueInfo};

    #[test]
    fn test_binary_shapes() {
        #[derive(Clone, Debug)]
        struct Case {
            a: Vec<Dim>,
            b: Vec<Dim>,
            broadcast: bool,
            axis: Option<i64>,
            expected: Option<Vec<Dim>>,
        }

        let cases = [
            // Implicit broadcasting.
            Case {
                a: dims![2, 3, 4, 5],
                b: dims![3, 4, 1],
                broadcast: false,
                axis: None,
                expected: Some(dims![2, 3, 4, 5]),
            },
            Case {
                a: dims![2, 3, 4, 5],
                b: dims![],
                broadcast: false,
                axis: None,
                expected: Some(dims![2, 3, 4, 5]),
            },
            Case {
                a: dims![2, 3, 4, 5],
                b: dims![3, 4],
                broadcast: false,
                axis: None,
                expected: None,
            },
            // Legacy broadcasting with an explicit axis.
            Case {
                a: dims![2, 3, 4, 5],
                b: dims![3, 4],
                broadcast: true,
                axis: Some(1),
                expected: Some(dims![2, 3, 4, 5]),
            },
            Case {
                a: dims![2, 3, 4, 5],
                b: dims![4, 5],
                broadcast: true,
                axis: None,
                expected: Some(dims![2, 3, 4, 5]),
            },
            Case {
                a: dims![2, 3, 4, 5],
                b: dims![3, 4],
                broadcast: true,
                axis: Some(0),
                expected: None,
            },
        ];

        cases.test_each_clone(|case| {
            let op = Binary {
                kind: BinaryKind::Add,
                broadcast: case.broadcast,
                axis: case.axis,
            };
            let result = infer_shape(&op, &[float(case.a), float(case.b)]);
            assert_eq!(result.ok(), case.expected);
        })
    }

    #[test]
    fn test_binary_types() {
        let op = Binary::new(BinaryKind::Equal);
        let outputs = infer(&op, &[float(dims![2, 3]), float(dims![2, 3])]).unwrap();
        assert_eq!(outputs[0].dtype, DataType::Bool);

        let bools = ValueInfo::new(DataType::Bool, dims![2, 3]);
        let outputs = infer(&op, &[bools.clone(), bools.clone()]).unwrap();
        assert_eq!(outputs[0].dtype, DataType::Bool);

        // Mismatched types are an error without implicit promotion.
        let ints = ValueInfo::new(DataType::Int32, dims![2, 3]);
        let op = Binary::new(BinaryKind::Add);
        let err = infer(&op, &[float(dims![2, 3]), ints.clone()]).err();
        assert!(matches!(err, Some(OpError::TypeMismatch(_))));

        // With implicit promotion, the promoted type is used.
        let mut sym_gen = SymbolGen::new();
        let mut ctx = InferCtx {
            sym_gen: &mut sym_gen,
            num_outputs: 1,
            implicit_promotion: true,
        };
        let x = float(dims![2, 3]);
        let outputs = op.infer(&[Some(&x), Some(&ints)], &mut ctx).unwrap();
        assert_eq!(outputs[0].dtype, DataType::Float);

        // Pow's exponent may have a different type.
        let op = Binary::new(BinaryKind::Pow);
        let outputs = infer(&op, &[float(dims![2, 3]), ints]).unwrap();
        assert_eq!(outputs[0].dtype, DataType::Float);

        // Logical operators require bools.
        let op = Binary::new(BinaryKind::And);
        assert!(infer(&op, &[float(dims![2]), float(dims![2])]).is_err());
        assert!(infer(&op, &[bools.clone(), bools]).is_ok());
    }

    #[test]
    fn test_binary_fold() {
        let a = ValueInfo::from_constant(Constant::int64_vec(vec![4, 6]));
        let b = ValueInfo::from_constant(Constant::int64_scalar(2));

        let op = Binary::new(BinaryKind::Div);
        let outputs = infer(&op, &[a.clone(), b.clone()]).unwrap();
        assert_eq!(outputs[0].constant, Some(Constant::int64_vec(vec![2, 3])));

        let op = Binary::new(BinaryKind::Greater);
        let outputs = infer(&op, &[a.clone(), ValueInfo::from_constant(Constant::int64_scalar(5))])
            .unwrap();
        assert_eq!(
            outputs[0].constant,
            Some(Constant::from_ints(DataType::Bool, &[2], vec![0, 1]))
        );

        // Integer division by zero is not folded.
        let zero = ValueInfo::from_constant(Constant::int64_scalar(0));
        let op = Binary::new(BinaryKind::Div);
        let outputs = infer(&op, &[a.clone(), zero]).unwrap();
        assert_eq!(outputs[0].constant, None);
        assert_eq!(outputs[0].shape, dims![2]);

        // float16 arithmetic.
        let x = ValueInfo::from_constant(Constant::from_floats(DataType::Float16, &[1], vec![1.5]));
        let y = ValueInfo::from_constant(Constant::from_floats(DataType::Float16, &[1], vec![2.5]));
        let op = Binary::new(BinaryKind::Add);
        let outputs = infer(&op, &[x, y]).unwrap();
        assert_eq!(outputs[0].dtype, DataType::Float16);
        assert_eq!(outputs[0].constant.as_ref().unwrap().to_f64s(), [4.]);

        // Legacy broadcasting.
        let a = ValueInfo::from_constant(Constant::from_ints(
            DataType::Int64,
            &[2, 2],
            vec![1, 2, 3, 4],
        ));
        let b = ValueInfo::from_constant(Constant::int64_vec(vec![10, 20]));
        let op = Binary {
            kind: BinaryKind::Add,
            broadcast: true,
            axis: Some(0),
        };
        let outputs = infer(&op, &[a, b]).unwrap();
        assert_eq!(
            outputs[0].constant.as_ref().unwrap().to_i64s(),
            [11, 12, 23, 24]
        );
    }

    #[test]
    fn test_prelu() {
        let shape = infer_shape(&PRelu, &[float(dims![2, 3, 4, 5]), float(dims![4, 5])]);
        assert_eq!(shape, Ok(dims![2, 3, 4, 5]));

        let shape = infer_shape(&PRelu, &[float(dims![2, 3, 4, 5]), float(dims![3])]);
        assert!(shape.is_err());
    }

    #[test]
    fn test_variadic() {
        let op = Variadic {
            kind: VariadicKind::Max,
        };
        let shape = infer_shape(
            &op,
            &[float(dims![3]), float(dims![2, 1]), float(dims![3])],
        );
        assert_eq!(shape, Ok(dims![2, 3]));

        let op = Variadic {
            kind: VariadicKind::Sum,
        };
        let inputs = [
            ValueInfo::from_constant(Constant::from_floats(DataType::Double, &[2], vec![1., 0.])),
            ValueInfo::from_constant(Constant::from_floats(DataType::Double, &[2], vec![1., 1.])),
            ValueInfo::from_constant(Constant::from_floats(DataType::Double, &[2], vec![1.5, 2.])),
        ];
        let outputs = infer(&op, &inputs).unwrap();
        assert_eq!(outputs[0].dtype, DataType::Double);
        assert_eq!(outputs[0].constant.as_ref().unwrap().to_f64s(), [3.5, 3.]);

        let mixed = [
            float(dims![2]),
            ValueInfo::new(DataType::Double, dims![2]),
        ];
        assert!(matches!(
            infer(&op, &mixed),
            Err(OpError::TypeMismatch(_))
        ));
    }
}
