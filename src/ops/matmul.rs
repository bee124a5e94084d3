use crate::broadcast::{broadcast_shapes, check_unidirectional};
use crate::dim::{Dim, ShapeDisplay, SymbolGen};
use crate::dtype::DataType;
use crate::error::OpError;
use crate::ops::{
    check_dims_match, check_dtype, check_inputs, common_dtype, optional, required, InferCtx,
    InferOp,
};
use crate::value::ValueInfo;

/// Compute the output shape of a (batched) matrix multiplication of `a` and
/// `b`, which have already been checked to have at least 2 dims.
fn matmul_shape(a: &[Dim], b: &[Dim], sym_gen: &mut SymbolGen) -> Result<Vec<Dim>, OpError> {
    let (a_batch, a_mat) = a.split_at(a.len() - 2);
    let (b_batch, b_mat) = b.split_at(b.len() - 2);
    check_dims_match("matmul inner dim", &a_mat[1], &b_mat[0]).map_err(|_| {
        OpError::shape(format!(
            "cannot multiply matrices of shape {} and {}",
            ShapeDisplay(a),
            ShapeDisplay(b)
        ))
    })?;

    let mut shape = broadcast_shapes(a_batch, b_batch, sym_gen)?;
    shape.push(a_mat[0].clone());
    shape.push(b_mat[1].clone());
    Ok(shape)
}

/// Gemm operator.
///
/// Inputs with more than 2 dims are treated as batches of matrices.
///
/// See <https://onnx.ai/onnx/operators/onnx__Gemm.html>.
#[derive(Debug)]
pub struct Gemm {
    pub alpha: f32,
    pub beta: f32,
    pub transpose_a: bool,
    pub transpose_b: bool,
}

impl Default for Gemm {
    fn default() -> Self {
        Gemm {
            alpha: 1.,
            beta: 1.,
            transpose_a: false,
            transpose_b: false,
        }
    }
}

impl InferOp for Gemm {
    fn op_type(&self) -> &str {
        "Gemm"
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 2, 3)?;
        let a = required(inputs, 0)?;
        let b = required(inputs, 1)?;
        let c = optional(inputs, 2);

        check_dtype("Gemm", a, DataType::is_numeric)?;
        let mut dtypes = vec![a.dtype, b.dtype];
        dtypes.extend(c.map(|c| c.dtype));
        let dtype = common_dtype("Gemm", &dtypes, ctx.implicit_promotion)?;

        for (name, input) in [("A", a), ("B", b)] {
            if input.ndim() < 2 {
                return Err(OpError::shape(format!(
                    "\"{}\" must have at least 2 dims but has shape {}",
                    name,
                    ShapeDisplay(&input.shape)
                )));
            }
        }

        let transposed = |shape: &[Dim], transpose: bool| {
            let mut shape = shape.to_vec();
            if transpose {
                let n = shape.len();
                shape.swap(n - 2, n - 1);
            }
            shape
        };
        let a_shape = transposed(&a.shape, self.transpose_a);
        let b_shape = transposed(&b.shape, self.transpose_b);
        let shape = matmul_shape(&a_shape, &b_shape, ctx.sym_gen)?;

        if let Some(c) = c {
            check_unidirectional(&c.shape, &shape)?;
        }
        Ok([ValueInfo::new(dtype, shape)].into())
    }
}

/// MatMul and MatMulInteger operators.
///
/// See <https://onnx.ai/onnx/operators/onnx__MatMul.html>.
#[derive(Debug, Default)]
pub struct MatMul {
    /// Take 8-bit integer inputs and produce an `int32` output, as
    /// MatMulInteger. Inputs 2 and 3 are zero points.
    pub integer: bool,
}

impl InferOp for MatMul {
    fn op_type(&self) -> &str {
        if self.integer {
            "MatMulInteger"
        } else {
            "MatMul"
        }
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 2, if self.integer { 4 } else { 2 })?;
        let a = required(inputs, 0)?;
        let b = required(inputs, 1)?;

        let dtype = if self.integer {
            let is_int8 = |dtype: DataType| matches!(dtype, DataType::Int8 | DataType::UInt8);
            check_dtype(self.op_type(), a, is_int8)?;
            check_dtype(self.op_type(), b, is_int8)?;
            DataType::Int32
        } else {
            check_dtype(self.op_type(), a, DataType::is_numeric)?;
            common_dtype(self.op_type(), &[a.dtype, b.dtype], ctx.implicit_promotion)?
        };

        if a.ndim() == 0 || b.ndim() == 0 {
            return Err(OpError::shape("MatMul inputs must have at least 1 dim"));
        }

        // Vectors are promoted to matrices, and the added dim is removed
        // from the result.
        let mut a_shape = a.shape.clone();
        let mut b_shape = b.shape.clone();
        let a_vec = a_shape.len() == 1;
        let b_vec = b_shape.len() == 1;
        if a_vec {
            a_shape.insert(0, Dim::Fixed(1));
        }
        if b_vec {
            b_shape.push(Dim::Fixed(1));
        }

        let mut shape = matmul_shape(&a_shape, &b_shape, ctx.sym_gen)?;
        if b_vec {
            shape.pop();
        }
        if a_vec {
            let n = shape.len();
            shape.remove(n - if b_vec { 1 } else { 2 });
        }
        Ok([ValueInfo::new(dtype, shape)].into())
    }
}

#[cfg(test)]
mod tests {
    use onnx_sema_testing::TestCases;

    use super::{Gemm, MatMul};
    use crate::dim::Dim;
    use crate::dtype::DataType;
    use crate::error::OpError;
    use crate::ops::test_util::{float, infer, infer_shape};
    use crate::value::ValueInfo;

    #[test]
    fn test_gemm() {
        let op = Gemm {
            alpha: 2.,
            beta: 2.,
            transpose_a: true,
            transpose_b: true,
        };
        let shape = infer_shape(
            &op,
            &[float(dims![5, 7]), float(dims![11, 5]), float(dims![])],
        );
        assert_eq!(shape, Ok(dims![7, 11]));

        let op = Gemm {
            transpose_a: true,
            ..Default::default()
        };
        let shape = infer_shape(
            &op,
            &[
                float(dims![1, 1, 8, 6]),
                float(dims![1, 1, 8, 7]),
                float(dims![1, 1, 6, 1]),
            ],
        );
        assert_eq!(shape, Ok(dims![1, 1, 6, 7]));

        let op = Gemm::default();
        let shape = infer_shape(&op, &[float(dims!["batch", 2]), float(dims![2, 4])]);
        assert_eq!(shape, Ok(dims!["batch", 4]));

        let result = infer(&op, &[float(dims![5, 3]), float(dims![2, 4])]);
        assert!(matches!(result, Err(OpError::ShapeMismatch(_))));

        let result = infer(
            &op,
            &[float(dims![5, 2]), float(dims![2, 4]), float(dims![3, 4])],
        );
        assert!(matches!(result, Err(OpError::ShapeMismatch(_))));
    }

    #[test]
    fn test_matmul() {
        #[derive(Clone, Debug)]
        struct Case {
            a: Vec<Dim>,
            b: Vec<Dim>,
            expected: Vec<Dim>,
        }

        let cases = [
            Case {
                a: dims![3, 6, 7],
                b: dims![5, 2, 1, 7, 8],
                expected: dims![5, 2, 3, 6, 8],
            },
            Case {
                a: dims![3, 6, 7],
                b: dims![7],
                expected: dims![3, 6],
            },
            Case {
                a: dims![6, 7],
                b: dims![7],
                expected: dims![6],
            },
            Case {
                a: dims![7],
                b: dims![5, 7, 8],
                expected: dims![5, 8],
            },
            Case {
                a: dims![7],
                b: dims![7, 8],
                expected: dims![8],
            },
            Case {
                a: dims![7],
                b: dims![7],
                expected: dims![],
            },
            Case {
                a: dims!["batch", "seq", 64],
                b: dims![64, 32],
                expected: dims!["batch", "seq", 32],
            },
        ];

        cases.test_each_clone(|case| {
            let shape = infer_shape(&MatMul::default(), &[float(case.a), float(case.b)]);
            assert_eq!(shape, Ok(case.expected));
        })
    }

    #[test]
    fn test_matmul_integer() {
        let op = MatMul { integer: true };
        let a = ValueInfo::new(DataType::Int8, dims![3, 6, 16]);
        let b = ValueInfo::new(DataType::Int8, dims![3, 16, 8]);
        let outputs = infer(&op, &[a.clone(), b]).unwrap();
        assert_eq!(outputs[0].dtype, DataType::Int32);
        assert_eq!(outputs[0].shape, dims![3, 6, 8]);

        let result = infer(&op, &[a, float(dims![3, 16, 8])]);
        assert!(matches!(result, Err(OpError::TypeMismatch(_))));
    }
}
