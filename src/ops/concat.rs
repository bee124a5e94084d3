use crate::axes::resolve_axis;
use crate::dim::{fixed_shape, Dim, ShapeDisplay};
use crate::error::OpError;
use crate::ops::{
    can_fold, check_dims_match, check_inputs, common_dtype, folded, required, InferCtx, InferOp,
};
use crate::value::{Constant, ValueInfo};

/// Concatenate constants along `axis`.
fn concat_constants(parts: &[&Constant], axis: usize, shape: &[usize]) -> Constant {
    let outer: usize = shape[..axis].iter().product();
    let dtype = parts[0].dtype();

    let chunk_len = |c: &Constant| -> usize { c.shape()[axis..].iter().product() };
    if dtype.is_float() {
        let values: Vec<Vec<f64>> = parts.iter().map(|c| c.to_f64s()).collect();
        let mut out = Vec::with_capacity(shape.iter().product());
        for i in 0..outer {
            for (part, values) in parts.iter().zip(&values) {
                let n = chunk_len(part);
                out.extend_from_slice(&values[i * n..(i + 1) * n]);
            }
        }
        Constant::from_floats(dtype, shape, out)
    } else {
        let values: Vec<Vec<i64>> = parts.iter().map(|c| c.to_i64s()).collect();
        let mut out = Vec::with_capacity(shape.iter().product());
        for i in 0..outer {
            for (part, values) in parts.iter().zip(&values) {
                let n = chunk_len(part);
                out.extend_from_slice(&values[i * n..(i + 1) * n]);
            }
        }
        Constant::from_ints(dtype, shape, out)
    }
}

/// Concat operator.
///
/// See <https://onnx.ai/onnx/operators/onnx__Concat.html>.
#[derive(Debug)]
pub struct Concat {
    pub axis: i64,
}

impl InferOp for Concat {
    fn op_type(&self) -> &str {
        "Concat"
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 1, usize::MAX)?;
        let parts = (0..inputs.len())
            .map(|i| required(inputs, i))
            .collect::<Result<Vec<_>, _>>()?;

        let dtypes: Vec<_> = parts.iter().map(|p| p.dtype).collect();
        let dtype = common_dtype("Concat", &dtypes, ctx.implicit_promotion)?;

        let first = parts[0];
        let ndim = first.ndim();
        let axis = resolve_axis("axis", ndim, self.axis)?;

        let mut shape = first.shape.clone();
        for part in &parts[1..] {
            if part.ndim() != ndim {
                return Err(OpError::shape(format!(
                    "cannot concatenate inputs of shape {} and {}",
                    ShapeDisplay(&first.shape),
                    ShapeDisplay(&part.shape)
                )));
            }
            for (i, dim) in part.shape.iter().enumerate() {
                if i == axis {
                    continue;
                }
                check_dims_match(&format!("Concat dim {}", i), &shape[i], dim)?;
                if let Dim::Fixed(_) = dim {
                    shape[i] = dim.clone();
                }
            }
        }

        let axis_sizes: Option<Vec<usize>> = parts.iter().map(|p| p.shape[axis].fixed()).collect();
        shape[axis] = match axis_sizes {
            Some(sizes) => Dim::Fixed(sizes.iter().sum()),
            None => {
                // Inputs of size zero along the axis do not contribute.
                let non_empty: Vec<&Dim> = parts
                    .iter()
                    .map(|p| &p.shape[axis])
                    .filter(|d| **d != Dim::Fixed(0))
                    .collect();
                match non_empty.as_slice() {
                    [dim] => (*dim).clone(),
                    _ => ctx.sym_gen.gen_dim(),
                }
            }
        };

        let constants: Option<Vec<&Constant>> = parts.iter().map(|p| p.constant.as_ref()).collect();
        if let (Some(constants), Some(sizes)) = (constants, fixed_shape(&shape)) {
            if can_fold(&sizes) && constants.iter().all(|c| c.dtype() == dtype) {
                return Ok([folded(concat_constants(&constants, axis, &sizes))].into());
            }
        }
        Ok([ValueInfo::new(dtype, shape)].into())
    }
}
