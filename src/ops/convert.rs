use crate::dtype::DataType;
use crate::error::OpError;
use crate::ops::{check_inputs, folded, required, InferCtx, InferOp};
use crate::value::ValueInfo;

/// Cast operator.
///
/// Integer conversions wrap to the width of the target type, float to
/// integer conversions round toward zero and conversions to `bool` test for
/// non-zero values.
///
/// See <https://onnx.ai/onnx/operators/onnx__Cast.html>.
#[derive(Debug)]
pub struct Cast {
    pub to: DataType,
}

impl InferOp for Cast {
    fn op_type(&self) -> &str {
        "Cast"
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        _ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 1, 1)?;
        let input = required(inputs, 0)?;

        if (input.dtype == DataType::String) != (self.to == DataType::String) {
            // Strings can be parsed and formatted, but the contents are not
            // tracked.
            return Ok([ValueInfo::new(self.to, input.shape.clone())].into());
        }

        match &input.constant {
            Some(value) if self.to != DataType::String => {
                Ok([folded(value.cast(self.to))].into())
            }
            _ => Ok([ValueInfo::new(self.to, input.shape.clone())].into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use onnx_sema_testing::TestCases;

    use super::Cast;
    use crate::dtype::DataType;
    use crate::ops::test_util::{float, infer};
    use crate::value::{Constant, ValueInfo};

    #[test]
    fn test_cast() {
        #[derive(Debug)]
        struct Case {
            to: DataType,
            input: Vec<f64>,
            expected: Vec<i64>,
        }

        let cases = [
            Case {
                to: DataType::Int32,
                input: vec![1.9, -1.9, 0.],
                expected: vec![1, -1, 0],
            },
            Case {
                to: DataType::UInt8,
                input: vec![255., 256., -1.],
                expected: vec![255, 0, 255],
            },
            Case {
                to: DataType::Bool,
                input: vec![0., 0.5, -2.],
                expected: vec![0, 1, 1],
            },
        ];

        cases.test_each(|case| {
            let op = Cast { to: case.to };
            let input = ValueInfo::from_constant(Constant::float_vec(case.input.clone()));
            let outputs = infer(&op, &[input]).unwrap();
            assert_eq!(outputs[0].dtype, case.to);
            let value = outputs[0].constant.as_ref().unwrap();
            assert_eq!(value.to_i64s(), case.expected);
        })
    }

    #[test]
    fn test_cast_narrowing_int() {
        let op = Cast { to: DataType::Int8 };
        let input = Constant::from_ints(DataType::Int32, &[2], vec![200, -129]);
        let outputs = infer(&op, &[ValueInfo::from_constant(input)]).unwrap();
        assert_eq!(outputs[0].constant.as_ref().unwrap().to_i64s(), [-56, 127]);
    }

    #[test]
    fn test_cast_dynamic() {
        let op = Cast {
            to: DataType::Float16,
        };
        let outputs = infer(&op, &[float(dims!["batch", 3])]).unwrap();
        assert_eq!(outputs[0].dtype, DataType::Float16);
        assert_eq!(outputs[0].shape, dims!["batch", 3]);
        assert!(outputs[0].constant.is_none());
    }
}
