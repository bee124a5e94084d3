use crate::axes::resolve_axis;
use crate::dim::Dim;
use crate::error::OpError;
use crate::ops::{check_inputs, folded, merge_ints, required, InferCtx, InferOp, Param};
use crate::value::ValueInfo;

/// Split operator.
///
/// The sizes of the outputs are given by the `split` attribute or input. If
/// neither is given, the input is split into equal parts, one per declared
/// output.
///
/// See <https://onnx.ai/onnx/operators/onnx__Split.html>.
#[derive(Debug, Default)]
pub struct Split {
    pub axis: i64,
    pub split: Option<Vec<i64>>,

    /// Opset 18 `num_outputs` attribute. When set, the last output may be
    /// smaller than the others.
    pub num_outputs: Option<i64>,
}

impl Split {
    /// Resolve the size of each output along the split axis.
    fn sizes(&self, dim_size: usize, n_outputs: usize) -> Result<Vec<usize>, OpError> {
        if n_outputs == 0 {
            return Err(OpError::attr("num_outputs", "must be positive"));
        }
        if self.num_outputs.is_some() {
            let chunk = dim_size.div_ceil(n_outputs);
            return Ok((0..n_outputs)
                .map(|i| chunk.min(dim_size.saturating_sub(i * chunk)))
                .collect());
        }
        if dim_size % n_outputs != 0 {
            return Err(OpError::shape(format!(
                "dim of size {} cannot be split into {} equal parts",
                dim_size, n_outputs
            )));
        }
        Ok(vec![dim_size / n_outputs; n_outputs])
    }
}

impl InferOp for Split {
    fn op_type(&self) -> &str {
        "Split"
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 1, 2)?;
        let data = required(inputs, 0)?;
        let axis = resolve_axis("axis", data.ndim(), self.axis)?;
        let n_outputs = match self.num_outputs {
            Some(n) if n < 1 => {
                return Err(OpError::attr("num_outputs", format!("value {} must be positive", n)))
            }
            Some(n) => n as usize,
            None => ctx.num_outputs,
        };

        let sizes: Vec<Dim> = match merge_ints("split", self.split.as_deref(), inputs, 1)? {
            Param::Known(split) => {
                if split.len() != n_outputs {
                    return Err(OpError::attr(
                        "split",
                        format!("has {} values but there are {} outputs", split.len(), n_outputs),
                    ));
                }
                if let Some(size) = split.iter().find(|&&s| s < 0) {
                    return Err(OpError::attr("split", format!("size {} is negative", size)));
                }
                if let Dim::Fixed(dim_size) = data.shape[axis] {
                    let total: i64 = split.iter().sum();
                    if total != dim_size as i64 {
                        return Err(OpError::shape(format!(
                            "split sizes sum to {} but dim has size {}",
                            total, dim_size
                        )));
                    }
                }
                split.iter().map(|&s| Dim::Fixed(s as usize)).collect()
            }
            Param::Absent => match &data.shape[axis] {
                Dim::Fixed(size) => self
                    .sizes(*size, n_outputs)?
                    .into_iter()
                    .map(Dim::Fixed)
                    .collect(),
                Dim::Symbol(_) if n_outputs == 1 => vec![data.shape[axis].clone()],
                Dim::Symbol(_) => ctx.sym_gen.gen_shape(n_outputs),
            },
            Param::Dynamic => ctx.sym_gen.gen_shape(n_outputs),
        };

        let mut offset = 0;
        let outputs = sizes
            .into_iter()
            .map(|size| {
                let mut shape = data.shape.clone();
                shape[axis] = size.clone();

                let (Some(value), Dim::Fixed(len)) = (&data.constant, size) else {
                    return ValueInfo::new(data.dtype, shape);
                };
                let positions: Vec<Vec<usize>> = value
                    .shape()
                    .iter()
                    .enumerate()
                    .map(|(i, &dim_size)| {
                        if i == axis {
                            (offset..offset + len).collect()
                        } else {
                            (0..dim_size).collect()
                        }
                    })
                    .collect();
                offset += len;
                let mut out_shape = value.shape().to_vec();
                out_shape[axis] = len;
                folded(value.select_axes(&out_shape, &positions))
            })
            .collect();
        Ok(outputs)
    }
}
