use crate::axes::resolve_unique_axes;
use crate::dim::{fixed_shape, Dim};
use crate::error::OpError;
use crate::ops::{
    can_fold, check_inputs, folded, merge_float, merge_ints, optional, required, InferCtx,
    InferOp, Param,
};
use crate::value::{Constant, ValueInfo};

/// How the padded region is filled.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum PadMode {
    /// Fill with a constant value.
    #[default]
    Constant,

    /// Mirror the input, without repeating the edge element.
    Reflect,

    /// Repeat the edge element.
    Edge,
}

impl PadMode {
    pub fn parse(mode: &str) -> Option<PadMode> {
        match mode {
            "constant" => Some(PadMode::Constant),
            "reflect" => Some(PadMode::Reflect),
            "edge" => Some(PadMode::Edge),
            _ => None,
        }
    }

    /// Map position `pos` along a padded axis, relative to the start of the
    /// source axis of length `size`, to a source position. Returns `None`
    /// where the constant fill is used.
    fn source_index(self, pos: i64, size: usize) -> Option<usize> {
        let size = size as i64;
        if (0..size).contains(&pos) {
            return Some(pos as usize);
        }
        if size == 0 {
            return None;
        }
        match self {
            PadMode::Constant => None,
            PadMode::Edge => Some(pos.clamp(0, size - 1) as usize),
            PadMode::Reflect => {
                let period = (2 * (size - 1)).max(1);
                let i = pos.rem_euclid(period);
                let i = if i >= size { period - i } else { i };
                Some(i as usize)
            }
        }
    }
}

/// Fill value for the constant mode, in both numeric domains.
#[derive(Copy, Clone, Debug)]
struct Fill {
    float: f64,
    int: i64,
}

/// Pad operator.
///
/// Opsets before 11 give `pads` and `value` as attributes. Later opsets use
/// inputs, and opset 18 adds an optional `axes` input.
///
/// See <https://onnx.ai/onnx/operators/onnx__Pad.html>.
#[derive(Debug, Default)]
pub struct Pad {
    pub mode: PadMode,
    pub pads: Option<Vec<i64>>,
    pub value: Option<f32>,
}

impl Pad {
    /// Compute the padded size of a fixed dimension.
    fn padded_size(&self, size: usize, begin: i64, end: i64) -> Result<usize, OpError> {
        // Padding wider than the dim repeats the reflection, so any dim with
        // an interior can be reflected.
        if self.mode == PadMode::Reflect && size < 2 && (begin > 0 || end > 0) {
            return Err(OpError::shape(format!(
                "cannot reflect-pad a dim of size {}",
                size
            )));
        }
        if self.mode == PadMode::Edge && size == 0 && (begin > 0 || end > 0) {
            return Err(OpError::shape("cannot edge-pad an empty dim"));
        }
        let padded = size as i64 + begin + end;
        usize::try_from(padded).map_err(|_| {
            OpError::shape(format!(
                "pads ({}, {}) crop more than dim size {}",
                begin, end, size
            ))
        })
    }

    /// Evaluate padding a constant. `begins` has one entry per axis.
    fn pad_constant(
        &self,
        value: &Constant,
        begins: &[i64],
        out_shape: &[usize],
        fill: Fill,
    ) -> Constant {
        let src_shape = value.shape();
        let mut flat = vec![Some(0usize)];
        for (axis, (&size, &out_size)) in src_shape.iter().zip(out_shape).enumerate() {
            let stride: usize = src_shape[axis + 1..].iter().product();
            let positions: Vec<Option<usize>> = (0..out_size as i64)
                .map(|pos| self.mode.source_index(pos - begins[axis], size))
                .collect();
            flat = flat
                .iter()
                .flat_map(|&base| {
                    positions
                        .iter()
                        .map(move |&pos| base.zip(pos).map(|(base, pos)| base + pos * stride))
                })
                .collect();
        }

        if value.dtype().is_float() {
            let src = value.to_f64s();
            let values: Vec<f64> = flat
                .iter()
                .map(|i| i.map_or(fill.float, |i| src[i]))
                .collect();
            Constant::from_floats(value.dtype(), out_shape, values)
        } else {
            let src = value.to_i64s();
            let values: Vec<i64> = flat
                .iter()
                .map(|i| i.map_or(fill.int, |i| src[i]))
                .collect();
            Constant::from_ints(value.dtype(), out_shape, values)
        }
    }
}

impl InferOp for Pad {
    fn op_type(&self) -> &str {
        "Pad"
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 1, 4)?;
        let data = required(inputs, 0)?;
        let ndim = data.ndim();

        if let Some(value) = optional(inputs, 2) {
            if value.dtype != data.dtype {
                return Err(OpError::dtype(format!(
                    "\"constant_value\" has type {} but input has type {}",
                    value.dtype, data.dtype
                )));
            }
        }
        let fill = match merge_float("value", self.value, inputs, 2)? {
            Param::Known(float) => {
                let int = optional(inputs, 2)
                    .and_then(|v| v.constant.as_ref())
                    .and_then(|c| c.int_item())
                    .unwrap_or(float as i64);
                Some(Fill { float, int })
            }
            Param::Absent => Some(Fill { float: 0., int: 0 }),
            Param::Dynamic => None,
        };

        let pads = match merge_ints("pads", self.pads.as_deref(), inputs, 1)? {
            Param::Known(pads) => pads,
            Param::Absent => return Err(OpError::attr("pads", "is required")),
            Param::Dynamic => {
                return Ok([ValueInfo::new(data.dtype, ctx.sym_gen.gen_shape(ndim))].into())
            }
        };

        let axes: Vec<usize> = match merge_ints("axes", None, inputs, 3)? {
            Param::Known(axes) => resolve_unique_axes("axes", ndim, axes.iter())?.to_vec(),
            Param::Absent => (0..ndim).collect(),
            Param::Dynamic => {
                return Ok([ValueInfo::new(data.dtype, ctx.sym_gen.gen_shape(ndim))].into())
            }
        };

        if pads.len() != 2 * axes.len() {
            return Err(OpError::attr(
                "pads",
                format!(
                    "has {} values but expected {} for {} axes",
                    pads.len(),
                    2 * axes.len(),
                    axes.len()
                ),
            ));
        }

        let (begins, ends) = pads.split_at(axes.len());
        let mut shape = data.shape.clone();
        for (i, &axis) in axes.iter().enumerate() {
            let (begin, end) = (begins[i], ends[i]);
            shape[axis] = match &data.shape[axis] {
                Dim::Fixed(size) => Dim::Fixed(self.padded_size(*size, begin, end)?),
                dim @ Dim::Symbol(_) if begin == 0 && end == 0 => dim.clone(),
                Dim::Symbol(_) => ctx.sym_gen.gen_dim(),
            };
        }

        let sizes = fixed_shape(&shape);
        if let (Some(value), Some(sizes), Some(fill)) = (&data.constant, sizes, fill) {
            if can_fold(&sizes) {
                let mut axis_begins = vec![0; ndim];
                for (&axis, &begin) in axes.iter().zip(begins) {
                    axis_begins[axis] = begin;
                }
                let padded = self.pad_constant(value, &axis_begins, &sizes, fill);
                return Ok([folded(padded)].into());
            }
        }
        Ok([ValueInfo::new(data.dtype, shape)].into())
    }
}

#[cfg(test)]
mod tests {
    use onnx_sema_testing::TestCases;

    use super::{Pad, PadMode};
    use crate::dim::Dim;
    use crate::dtype::DataType;
    use crate::error::OpError;
    use crate::ops::test_util::{float, infer, infer_shape, infer_with};
    use crate::value::{Constant, ValueInfo};

    #[test]
    fn test_pad() {
        #[derive(Clone, Debug)]
        struct Case {
            input: Vec<Dim>,
            mode: PadMode,
            pads: Vec<i64>,
            expected: Result<Vec<Dim>, ()>,
        }

        let cases = [
            Case {
                input: dims![2, 2],
                mode: PadMode::Constant,
                pads: vec![1, 1, 1, 1],
                expected: Ok(dims![4, 4]),
            },
            Case {
                input: dims![2, 2],
                mode: PadMode::Reflect,
                pads: vec![0, 2, 0, 1],
                expected: Ok(dims![2, 5]),
            },
            Case {
                input: dims![1, 4],
                mode: PadMode::Reflect,
                pads: vec![1, 0, 0, 0],
                expected: Err(()),
            },
            Case {
                input: dims![2, 3],
                mode: PadMode::Reflect,
                pads: vec![0, 2, 0, 0],
                expected: Ok(dims![2, 5]),
            },
            Case {
                input: dims![4, 5],
                mode: PadMode::Constant,
                pads: vec![-1, 0, -2, 1],
                expected: Ok(dims![1, 6]),
            },
            Case {
                input: dims!["n", 3],
                mode: PadMode::Edge,
                pads: vec![0, 1, 0, 1],
                expected: Ok(dims!["n", 5]),
            },
            Case {
                input: dims![2, 2],
                mode: PadMode::Constant,
                pads: vec![-2, 0, -1, 0],
                expected: Err(()),
            },
            Case {
                input: dims![2, 2],
                mode: PadMode::Constant,
                pads: vec![1, 1],
                expected: Err(()),
            },
        ];

        cases.test_each_clone(|case| {
            let op = Pad {
                mode: case.mode,
                pads: Some(case.pads),
                value: None,
            };
            let shape = infer_shape(&op, &[float(case.input)]).map_err(|_| ());
            assert_eq!(shape, case.expected);
        })
    }

    #[test]
    fn test_pad_inputs() {
        let data = float(dims![2, 2]);
        let pads = ValueInfo::from_constant(Constant::from_ints(
            DataType::Int32,
            &[4],
            vec![1, 1, 2, 2],
        ));
        let value = ValueInfo::from_constant(Constant::float_scalar(1.));
        let outputs = infer(&Pad::default(), &[data.clone(), pads.clone(), value]).unwrap();
        assert_eq!(outputs[0].shape, dims![5, 5]);

        // Pads for selected axes.
        let pads = ValueInfo::from_constant(Constant::int64_vec(vec![1, 3]));
        let axes = ValueInfo::from_constant(Constant::int64_vec(vec![-1]));
        let outputs = infer_with(
            &Pad::default(),
            &[Some(&data), Some(&pads), None, Some(&axes)],
            1,
        )
        .unwrap();
        assert_eq!(outputs[0].shape, dims![2, 6]);

        let int_value = ValueInfo::from_constant(Constant::int64_scalar(1));
        let pads = ValueInfo::from_constant(Constant::int64_vec(vec![0, 0, 0, 0]));
        assert!(matches!(
            infer(&Pad::default(), &[data.clone(), pads, int_value]),
            Err(OpError::TypeMismatch(_))
        ));

        let dynamic_pads = ValueInfo::new(DataType::Int64, dims![4]);
        let outputs = infer(&Pad::default(), &[data, dynamic_pads]).unwrap();
        assert_eq!(outputs[0].ndim(), 2);
    }

    #[test]
    fn test_pad_fold() {
        #[derive(Debug)]
        struct Case {
            mode: PadMode,
            data: Constant,
            pads: Vec<i64>,
            value: Option<f32>,
            expected: Vec<f64>,
        }

        let row = || Constant::from_floats(DataType::Float, &[3], vec![1., 2., 3.]);
        let cases = [
            Case {
                mode: PadMode::Reflect,
                data: row(),
                pads: vec![2, 2],
                value: None,
                expected: vec![3., 2., 1., 2., 3., 2., 1.],
            },
            Case {
                mode: PadMode::Edge,
                data: row(),
                pads: vec![2, 1],
                value: None,
                expected: vec![1., 1., 1., 2., 3., 3.],
            },
            Case {
                mode: PadMode::Constant,
                data: row(),
                pads: vec![1, 2],
                value: Some(-1.),
                expected: vec![-1., 1., 2., 3., -1., -1.],
            },
            // Negative pads crop.
            Case {
                mode: PadMode::Constant,
                data: row(),
                pads: vec![-1, 1],
                value: None,
                expected: vec![2., 3., 0.],
            },
            Case {
                mode: PadMode::Reflect,
                data: Constant::from_floats(DataType::Float, &[2, 2], vec![1., 2., 3., 4.]),
                pads: vec![0, 1, 0, 1],
                value: None,
                expected: vec![2., 1., 2., 1., 4., 3., 4., 3.],
            },
        ];

        cases.test_each(|case| {
            let op = Pad {
                mode: case.mode,
                pads: Some(case.pads.clone()),
                value: case.value,
            };
            let data = ValueInfo::from_constant(case.data.clone());
            let outputs = infer(&op, &[data]).unwrap();
            let value = outputs[0].constant.as_ref().unwrap();
            assert_eq!(value.to_f64s(), case.expected);
        })
    }

    #[test]
    fn test_pad_fold_inputs() {
        let data = ValueInfo::from_constant(Constant::int64_vec(vec![5, 6]));
        let pads = ValueInfo::from_constant(Constant::int64_vec(vec![1, 1]));
        let value = ValueInfo::from_constant(Constant::int64_scalar(7));
        let outputs = infer(&Pad::default(), &[data.clone(), pads.clone(), value]).unwrap();
        let value = outputs[0].constant.as_ref().unwrap();
        assert_eq!(value.dtype(), DataType::Int64);
        assert_eq!(value.to_i64s(), [7, 5, 6, 7]);

        // Unknown fill value.
        let value = ValueInfo::new(DataType::Int64, dims![]);
        let outputs = infer(&Pad::default(), &[data, pads, value]).unwrap();
        assert_eq!(outputs[0].shape, dims![4]);
        assert!(outputs[0].constant.is_none());
    }

    #[test]
    fn test_pad_mode_parse() {
        assert_eq!(PadMode::parse("reflect"), Some(PadMode::Reflect));
        assert_eq!(PadMode::parse("wrap"), None);
    }
}
