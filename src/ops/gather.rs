use crate::axes::resolve_axis;
use crate::dim::{fixed_shape, ShapeDisplay};
use crate::dtype::DataType;
use crate::error::OpError;
use crate::ops::{can_fold, check_dtype, check_inputs, folded, required, InferCtx, InferOp};
use crate::value::ValueInfo;

fn is_index_type(dtype: DataType) -> bool {
    matches!(dtype, DataType::Int32 | DataType::Int64)
}

/// Gather operator.
///
/// See <https://onnx.ai/onnx/operators/onnx__Gather.html>.
#[derive(Debug, Default)]
pub struct Gather {
    pub axis: i64,
}

impl InferOp for Gather {
    fn op_type(&self) -> &str {
        "Gather"
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        _ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 2, 2)?;
        let data = required(inputs, 0)?;
        let indices = required(inputs, 1)?;
        check_dtype("Gather", indices, is_index_type)?;
        let axis = resolve_axis("axis", data.ndim(), self.axis)?;

        let mut shape = data.shape[..axis].to_vec();
        shape.extend(indices.shape.iter().cloned());
        shape.extend(data.shape[axis + 1..].iter().cloned());

        let (Some(value), Some(index_values)) = (&data.constant, &indices.constant) else {
            return Ok([ValueInfo::new(data.dtype, shape)].into());
        };
        let Some(out_shape) = fixed_shape(&shape).filter(|s| can_fold(s)) else {
            return Ok([ValueInfo::new(data.dtype, shape)].into());
        };

        let axis_size = value.shape()[axis];
        let axis_positions = index_values
            .to_i64s()
            .into_iter()
            .map(|index| {
                let resolved = if index < 0 {
                    index + axis_size as i64
                } else {
                    index
                };
                if resolved < 0 || resolved >= axis_size as i64 {
                    Err(OpError::shape(format!(
                        "index {} is out of bounds for axis of size {}",
                        index, axis_size
                    )))
                } else {
                    Ok(resolved as usize)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Gathered positions along `axis` are flattened, which produces
        // elements in the same order as the output.
        let positions: Vec<Vec<usize>> = value
            .shape()
            .iter()
            .enumerate()
            .map(|(i, &size)| {
                if i == axis {
                    axis_positions.clone()
                } else {
                    (0..size).collect()
                }
            })
            .collect();
        Ok([folded(value.select_axes(&out_shape, &positions))].into())
    }
}

/// GatherElements operator.
///
/// See <https://onnx.ai/onnx/operators/onnx__GatherElements.html>.
#[derive(Debug, Default)]
pub struct GatherElements {
    pub axis: i64,
}

impl InferOp for GatherElements {
    fn op_type(&self) -> &str {
        "GatherElements"
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        _ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 2, 2)?;
        let data = required(inputs, 0)?;
        let indices = required(inputs, 1)?;
        check_dtype("GatherElements", indices, is_index_type)?;

        if indices.ndim() != data.ndim() {
            return Err(OpError::shape(format!(
                "indices shape {} must have the same rank as data shape {}",
                ShapeDisplay(&indices.shape),
                ShapeDisplay(&data.shape)
            )));
        }
        resolve_axis("axis", data.ndim(), self.axis)?;

        Ok([ValueInfo::new(data.dtype, indices.shape.clone())].into())
    }
}
