use rten_tensor::SliceRange;

use crate::axes::{resolve_axis, resolve_unique_axes};
use crate::dim::{fixed_shape, Dim};
use crate::error::OpError;
use crate::ops::{
    can_fold, check_inputs, folded, merge_ints, optional, required, InferCtx, InferOp, Param,
};
use crate::value::ValueInfo;

/// Return the positions along a dimension of size `size` that are selected
/// by `range`.
fn slice_positions(range: SliceRange, size: usize) -> Vec<usize> {
    let count = range.steps(size);
    let clamped = range.clamp(size);
    let start = if clamped.start < 0 {
        clamped.start + size as isize
    } else {
        clamped.start
    };
    (0..count as isize)
        .map(|i| (start + i * range.step()) as usize)
        .collect()
}

/// Return true if a slice of a dimension keeps every element in order.
fn is_noop_slice(start: i64, end: i64, step: i64) -> bool {
    start == 0 && step == 1 && end >= i32::MAX as i64
}

/// Slice operator.
///
/// Opset 1 passes `starts`, `ends` and `axes` as attributes. Later opsets
/// pass them, plus `steps`, as inputs.
///
/// See <https://onnx.ai/onnx/operators/onnx__Slice.html>.
#[derive(Debug, Default)]
pub struct Slice {
    pub starts: Option<Vec<i64>>,
    pub ends: Option<Vec<i64>>,
    pub axes: Option<Vec<i64>>,
}

impl InferOp for Slice {
    fn op_type(&self) -> &str {
        "Slice"
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 1, 5)?;
        let data = required(inputs, 0)?;
        let ndim = data.ndim();

        let starts = merge_ints("starts", self.starts.as_deref(), inputs, 1)?;
        let ends = merge_ints("ends", self.ends.as_deref(), inputs, 2)?;
        let axes = merge_ints("axes", self.axes.as_deref(), inputs, 3)?;
        let steps = merge_ints("steps", None, inputs, 4)?;

        let (starts, ends) = match (starts, ends) {
            (Param::Absent, _) => return Err(OpError::MissingInput(1)),
            (_, Param::Absent) => return Err(OpError::MissingInput(2)),
            (Param::Known(starts), Param::Known(ends)) => (starts, ends),
            _ => {
                // The sliced axes become dynamic.
                let mut shape = data.shape.clone();
                let sliced: Vec<usize> = match &axes {
                    Param::Known(axes) => resolve_unique_axes("axes", ndim, axes.iter())?.to_vec(),
                    _ => match optional(inputs, 1).map(|s| &s.shape[..]) {
                        Some([Dim::Fixed(len)]) if axes == Param::Absent => {
                            if *len > ndim {
                                return Err(OpError::attr(
                                    "starts",
                                    format!("has {} values but input has rank {}", len, ndim),
                                ));
                            }
                            (0..*len).collect()
                        }
                        _ => (0..ndim).collect(),
                    },
                };
                for axis in sliced {
                    shape[axis] = ctx.sym_gen.gen_dim();
                }
                return Ok([ValueInfo::new(data.dtype, shape)].into());
            }
        };

        if starts.len() != ends.len() {
            return Err(OpError::attr(
                "ends",
                format!("has {} values but \"starts\" has {}", ends.len(), starts.len()),
            ));
        }
        let axes: Vec<i64> = match axes {
            Param::Known(axes) => axes,
            Param::Absent => (0..starts.len() as i64).collect(),
            Param::Dynamic => {
                let shape = ctx.sym_gen.gen_shape(ndim);
                return Ok([ValueInfo::new(data.dtype, shape)].into());
            }
        };
        let steps = match steps {
            Param::Known(steps) => steps,
            Param::Absent => vec![1; starts.len()],
            Param::Dynamic => {
                let shape = ctx.sym_gen.gen_shape(ndim);
                return Ok([ValueInfo::new(data.dtype, shape)].into());
            }
        };
        if axes.len() != starts.len() || steps.len() != starts.len() {
            return Err(OpError::attr(
                "axes",
                "\"starts\", \"ends\", \"axes\" and \"steps\" must have the same length",
            ));
        }
        if steps.contains(&0) {
            return Err(OpError::attr("steps", "step size cannot be 0"));
        }

        resolve_unique_axes("axes", ndim, axes.iter())?;
        let mut shape = data.shape.clone();
        let mut ranges: Vec<Option<SliceRange>> = vec![None; ndim];

        for (i, &axis) in axes.iter().enumerate() {
            let axis = resolve_axis("axes", ndim, axis)?;
            let (start, end, step) = (starts[i], ends[i], steps[i]);
            match &data.shape[axis] {
                Dim::Fixed(size) => {
                    let range = SliceRange::new(start as isize, Some(end as isize), step as isize);
                    shape[axis] = Dim::Fixed(range.steps(*size));
                    ranges[axis] = Some(range);
                }
                Dim::Symbol(_) if is_noop_slice(start, end, step) => {}
                Dim::Symbol(_) => shape[axis] = ctx.sym_gen.gen_dim(),
            }
        }

        if let (Some(value), Some(sizes)) = (&data.constant, fixed_shape(&shape)) {
            if can_fold(&sizes) {
                let positions: Vec<Vec<usize>> = value
                    .shape()
                    .iter()
                    .zip(&ranges)
                    .map(|(&size, range)| match range {
                        Some(range) => slice_positions(*range, size),
                        None => (0..size).collect(),
                    })
                    .collect();
                return Ok([folded(value.select_axes(&sizes, &positions))].into());
            }
        }
        Ok([ValueInfo::new(data.dtype, shape)].into())
    }
}
