use crate::axes::{resolve_axis, resolve_unique_axes};
use crate::broadcast::broadcast_shapes;
use crate::dim::{fixed_shape, from_fixed, Dim, ShapeDisplay, SymbolGen};
use crate::dtype::DataType;
use crate::error::OpError;
use crate::ops::{
    can_fold, check_dtype, check_inputs, check_rank, folded, merge_ints, required, InferCtx,
    InferOp, Param,
};
use crate::value::{Constant, ValueInfo};

/// Return a single dim equal to the product of `dims`.
fn dim_product(dims: &[Dim], sym_gen: &mut SymbolGen) -> Dim {
    if let [dim] = dims {
        return dim.clone();
    }
    match fixed_shape(dims) {
        Some(sizes) => Dim::Fixed(sizes.iter().product()),
        None => sym_gen.gen_dim(),
    }
}

/// Return `data` with a new shape, reshaping its value if known.
fn with_shape(data: &ValueInfo, shape: Vec<Dim>) -> ValueInfo {
    if let (Some(value), Some(sizes)) = (&data.constant, fixed_shape(&shape)) {
        return folded(value.reshaped(&sizes));
    }
    ValueInfo::new(data.dtype, shape)
}

/// Split a shape into the product of its fixed dims and a list of its
/// symbols.
fn split_dims<'a>(dims: impl Iterator<Item = &'a Dim>) -> (usize, Vec<&'a str>) {
    let mut product = 1;
    let mut symbols = Vec::new();
    for dim in dims {
        match dim {
            Dim::Fixed(size) => product *= size,
            Dim::Symbol(name) => symbols.push(name.as_str()),
        }
    }
    (product, symbols)
}

/// Resolve a Reshape target shape against the input shape.
fn resolve_reshape(
    input: &[Dim],
    target: &[i64],
    allow_zero: bool,
    sym_gen: &mut SymbolGen,
) -> Result<Vec<Dim>, OpError> {
    let mut output: Vec<Option<Dim>> = Vec::with_capacity(target.len());
    let mut infer_index = None;

    for (i, &size) in target.iter().enumerate() {
        let dim = match size {
            -1 => {
                if infer_index.is_some() {
                    return Err(OpError::attr("shape", "contains more than one -1"));
                }
                infer_index = Some(i);
                None
            }
            0 if !allow_zero => Some(input.get(i).cloned().ok_or_else(|| {
                OpError::attr(
                    "shape",
                    format!("0 at index {} is out of range for input of rank {}", i, input.len()),
                )
            })?),
            size if size >= 0 => Some(Dim::Fixed(size as usize)),
            size => return Err(OpError::attr("shape", format!("invalid size {}", size))),
        };
        output.push(dim);
    }

    if allow_zero && infer_index.is_some() && target.contains(&0) {
        return Err(OpError::attr(
            "shape",
            "cannot contain both 0 and -1 when \"allowzero\" is set",
        ));
    }

    let Some(infer_index) = infer_index else {
        let output: Vec<Dim> = output.into_iter().flatten().collect();
        if let (Some(in_shape), Some(out_shape)) = (fixed_shape(input), fixed_shape(&output)) {
            let in_len: usize = in_shape.iter().product();
            let out_len: usize = out_shape.iter().product();
            if in_len != out_len {
                return Err(OpError::shape(format!(
                    "cannot reshape {} elements to shape {}",
                    in_len,
                    ShapeDisplay(&output)
                )));
            }
        }
        return Ok(output);
    };

    // Cancel symbols that appear on both sides, then infer the remaining
    // size from the fixed dims.
    let (in_product, mut in_symbols) = split_dims(input.iter());
    let (out_product, out_symbols) = split_dims(output.iter().flatten());
    let mut unmatched_out = Vec::new();
    for sym in out_symbols {
        match in_symbols.iter().position(|s| *s == sym) {
            Some(pos) => {
                in_symbols.remove(pos);
            }
            None => unmatched_out.push(sym),
        }
    }

    let inferred = match (in_symbols.as_slice(), unmatched_out.is_empty()) {
        ([], true) => {
            if out_product == 0 || in_product % out_product != 0 {
                return Err(OpError::shape(format!(
                    "cannot reshape input of shape {} to {:?}",
                    ShapeDisplay(input),
                    target
                )));
            }
            Dim::Fixed(in_product / out_product)
        }
        ([sym], true) if in_product == out_product => Dim::Symbol(sym.to_string()),
        _ => sym_gen.gen_dim(),
    };
    output[infer_index] = Some(inferred);
    Ok(output.into_iter().flatten().collect())
}

/// Reshape operator.
///
/// See <https://onnx.ai/onnx/operators/onnx__Reshape.html>.
#[derive(Debug, Default)]
pub struct Reshape {
    /// Target shape from the opset 1 `shape` attribute.
    pub shape: Option<Vec<i64>>,
    pub allow_zero: bool,
}

impl InferOp for Reshape {
    fn op_type(&self) -> &str {
        "Reshape"
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 1, 2)?;
        let data = required(inputs, 0)?;

        let shape = match merge_ints("shape", self.shape.as_deref(), inputs, 1)? {
            Param::Known(target) => {
                resolve_reshape(&data.shape, &target, self.allow_zero, ctx.sym_gen)?
            }
            Param::Dynamic => {
                let shape_input = required(inputs, 1)?;
                match shape_input.shape.as_slice() {
                    [Dim::Fixed(len)] => ctx.sym_gen.gen_shape(*len),
                    _ => {
                        return Err(OpError::shape(
                            "output rank is unknown because the shape input has a dynamic length",
                        ))
                    }
                }
            }
            Param::Absent => return Err(OpError::MissingInput(1)),
        };

        Ok([with_shape(data, shape)].into())
    }
}

/// Flatten operator.
///
/// See <https://onnx.ai/onnx/operators/onnx__Flatten.html>.
#[derive(Debug)]
pub struct Flatten {
    pub axis: i64,
}

impl InferOp for Flatten {
    fn op_type(&self) -> &str {
        "Flatten"
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 1, 1)?;
        let data = required(inputs, 0)?;

        // nb. `axis` is a count of outer dims, so it may equal the rank.
        let ndim = data.ndim();
        let n_outer = if self.axis == ndim as i64 {
            ndim
        } else {
            resolve_axis("axis", ndim, self.axis)?
        };

        let (outer, inner) = data.shape.split_at(n_outer);
        let shape = vec![
            dim_product(outer, ctx.sym_gen),
            dim_product(inner, ctx.sym_gen),
        ];
        Ok([with_shape(data, shape)].into())
    }
}

/// Squeeze operator.
///
/// See <https://onnx.ai/onnx/operators/onnx__Squeeze.html>.
#[derive(Debug, Default)]
pub struct Squeeze {
    pub axes: Option<Vec<i64>>,
}

impl InferOp for Squeeze {
    fn op_type(&self) -> &str {
        "Squeeze"
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        _ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 1, 2)?;
        let data = required(inputs, 0)?;

        let shape: Vec<Dim> = match merge_ints("axes", self.axes.as_deref(), inputs, 1)? {
            Param::Known(axes) => {
                let axes = resolve_unique_axes("axes", data.ndim(), axes.iter())?;
                for &axis in &axes {
                    if let Dim::Fixed(size) = data.shape[axis] {
                        if size != 1 {
                            return Err(OpError::shape(format!(
                                "cannot squeeze axis {} of size {}",
                                axis, size
                            )));
                        }
                    }
                }
                data.shape
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| !axes.contains(i))
                    .map(|(_, dim)| dim.clone())
                    .collect()
            }
            Param::Absent => data
                .shape
                .iter()
                .filter(|dim| **dim != Dim::Fixed(1))
                .cloned()
                .collect(),
            Param::Dynamic => {
                return Err(OpError::attr("axes", "must be constant"));
            }
        };

        Ok([with_shape(data, shape)].into())
    }
}

/// Unsqueeze operator.
///
/// See <https://onnx.ai/onnx/operators/onnx__Unsqueeze.html>.
#[derive(Debug, Default)]
pub struct Unsqueeze {
    pub axes: Option<Vec<i64>>,
}

impl InferOp for Unsqueeze {
    fn op_type(&self) -> &str {
        "Unsqueeze"
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        _ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 1, 2)?;
        let data = required(inputs, 0)?;

        let axes = match merge_ints("axes", self.axes.as_deref(), inputs, 1)? {
            Param::Known(axes) => axes,
            Param::Dynamic => return Err(OpError::attr("axes", "must be constant")),
            Param::Absent => return Err(OpError::attr("axes", "is required")),
        };

        // Axes refer to positions in the output.
        let out_ndim = data.ndim() + axes.len();
        let axes = resolve_unique_axes("axes", out_ndim, axes.iter())?;
        let mut input_dims = data.shape.iter();
        let shape = (0..out_ndim)
            .map(|i| {
                if axes.contains(&i) {
                    Dim::Fixed(1)
                } else {
                    input_dims.next().cloned().unwrap_or(Dim::Fixed(1))
                }
            })
            .collect();

        Ok([with_shape(data, shape)].into())
    }
}

/// Transpose operator.
///
/// See <https://onnx.ai/onnx/operators/onnx__Transpose.html>.
#[derive(Debug, Default)]
pub struct Transpose {
    /// Order of input axes in the output. Defaults to reversing the axes.
    pub perm: Option<Vec<i64>>,
}

impl InferOp for Transpose {
    fn op_type(&self) -> &str {
        "Transpose"
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        _ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 1, 1)?;
        let data = required(inputs, 0)?;
        let ndim = data.ndim();

        let perm: Vec<usize> = match &self.perm {
            Some(perm) => {
                if perm.len() != ndim {
                    return Err(OpError::attr(
                        "perm",
                        format!("has {} entries but input has rank {}", perm.len(), ndim),
                    ));
                }
                resolve_unique_axes("perm", ndim, perm.iter())?;
                perm.iter().map(|&p| resolve_axis("perm", ndim, p)).collect::<Result<_, _>>()?
            }
            None => (0..ndim).rev().collect(),
        };

        let shape: Vec<Dim> = perm.iter().map(|&p| data.shape[p].clone()).collect();
        let output = match &data.constant {
            Some(value) => folded(value.permuted(&perm)),
            None => ValueInfo::new(data.dtype, shape),
        };
        Ok([output].into())
    }
}

/// Check that the second input of Expand or Tile is an integer vector.
///
/// Tile only takes `int64` repeats. Expand also accepts narrower integer
/// types, which some exporters emit for the target shape.
fn check_shape_input(op_type: &str, name: &str, input: &ValueInfo) -> Result<(), OpError> {
    if op_type == "Tile" {
        check_dtype(op_type, input, |dtype| dtype == DataType::Int64)?;
    } else {
        check_dtype(op_type, input, DataType::is_integer)?;
    }
    check_rank(name, input, 1)
}

/// Evaluate broadcasting `value` to `shape`.
fn expand_constant(value: &Constant, shape: &[usize]) -> Constant {
    let pad = shape.len() - value.ndim();
    let mut padded = vec![1; pad];
    padded.extend_from_slice(value.shape());
    let value = value.reshaped(&padded);

    let positions: Vec<Vec<usize>> = padded
        .iter()
        .zip(shape)
        .map(|(&size, &out)| if size == 1 { vec![0; out] } else { (0..out).collect() })
        .collect();
    value.select_axes(shape, &positions)
}

/// Expand operator.
///
/// See <https://onnx.ai/onnx/operators/onnx__Expand.html>.
#[derive(Debug)]
pub struct Expand;

impl InferOp for Expand {
    fn op_type(&self) -> &str {
        "Expand"
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 2, 2)?;
        let data = required(inputs, 0)?;
        let shape = required(inputs, 1)?;
        check_shape_input("Expand", "shape", shape)?;

        if let Some(sizes) = &shape.constant {
            let target = sizes
                .to_i64s()
                .into_iter()
                .map(|size| {
                    if size < 0 {
                        Err(OpError::attr("shape", format!("invalid size {}", size)))
                    } else {
                        Ok(Dim::Fixed(size as usize))
                    }
                })
                .collect::<Result<Vec<_>, _>>()?;
            let out_shape = broadcast_shapes(&data.shape, &target, ctx.sym_gen)?;

            if let (Some(value), Some(sizes)) = (&data.constant, fixed_shape(&out_shape)) {
                if can_fold(&sizes) {
                    return Ok([folded(expand_constant(value, &sizes))].into());
                }
            }
            return Ok([ValueInfo::new(data.dtype, out_shape)].into());
        }

        // If the length of the shape is known but not its values, the
        // output rank is known. Dims of size > 1 in the input keep their size.
        let Dim::Fixed(len) = shape.shape[0] else {
            return Err(OpError::shape(
                "output rank is unknown because the shape input has a dynamic length",
            ));
        };
        let out_ndim = len.max(data.ndim());
        let pad = out_ndim - data.ndim();
        let out_shape = (0..out_ndim)
            .map(|i| match i.checked_sub(pad).map(|i| &data.shape[i]) {
                Some(Dim::Fixed(size)) if *size > 1 => Dim::Fixed(*size),
                _ => ctx.sym_gen.gen_dim(),
            })
            .collect();
        Ok([ValueInfo::new(data.dtype, out_shape)].into())
    }
}

/// Tile operator.
///
/// See <https://onnx.ai/onnx/operators/onnx__Tile.html>.
#[derive(Debug)]
pub struct Tile;

impl InferOp for Tile {
    fn op_type(&self) -> &str {
        "Tile"
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 2, 2)?;
        let data = required(inputs, 0)?;
        let repeats = required(inputs, 1)?;
        check_shape_input("Tile", "repeats", repeats)?;
        if let Dim::Fixed(len) = repeats.shape[0] {
            if len != data.ndim() {
                return Err(OpError::shape(format!(
                    "\"repeats\" has length {} but input has rank {}",
                    len,
                    data.ndim()
                )));
            }
        }

        let Some(repeats) = &repeats.constant else {
            let shape = ctx.sym_gen.gen_shape(data.ndim());
            return Ok([ValueInfo::new(data.dtype, shape)].into());
        };
        let repeats = repeats.to_i64s();
        if let Some(r) = repeats.iter().find(|&&r| r < 0) {
            return Err(OpError::attr("repeats", format!("value {} is negative", r)));
        }

        let shape: Vec<Dim> = data
            .shape
            .iter()
            .zip(&repeats)
            .map(|(dim, &r)| match dim {
                Dim::Fixed(size) => Dim::Fixed(size * r as usize),
                Dim::Symbol(_) if r == 1 => dim.clone(),
                Dim::Symbol(_) => ctx.sym_gen.gen_dim(),
            })
            .collect();

        if let (Some(value), Some(sizes)) = (&data.constant, fixed_shape(&shape)) {
            if can_fold(&sizes) {
                let positions: Vec<Vec<usize>> = value
                    .shape()
                    .iter()
                    .zip(&sizes)
                    .map(|(&size, &out)| (0..out).map(|i| i % size).collect())
                    .collect();
                return Ok([folded(value.select_axes(&sizes, &positions))].into());
            }
        }
        Ok([ValueInfo::new(data.dtype, shape)].into())
    }
}

/// Shape operator.
///
/// See <https://onnx.ai/onnx/operators/onnx__Shape.html>.
#[derive(Debug, Default)]
pub struct Shape {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl InferOp for Shape {
    fn op_type(&self) -> &str {
        "Shape"
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        _ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 1, 1)?;
        let data = required(inputs, 0)?;

        let ndim = data.ndim() as i64;
        let clamp = |index: i64| {
            let index = if index < 0 { index + ndim } else { index };
            index.clamp(0, ndim) as usize
        };
        let start = clamp(self.start.unwrap_or(0));
        let end = clamp(self.end.unwrap_or(ndim)).max(start);
        let dims = &data.shape[start..end];

        let output = match fixed_shape(dims) {
            Some(sizes) => {
                let sizes = sizes.iter().map(|&s| s as i64).collect();
                ValueInfo::from_constant(Constant::int64_vec(sizes))
            }
            None => ValueInfo::new(DataType::Int64, from_fixed(&[dims.len()])),
        };
        Ok([output].into())
    }
}

#[cfg(test)]
mod tests {
    use onnx_sema_testing::TestCases;

    use super::{Expand, Flatten, Reshape, Shape, Squeeze, Tile, Transpose, Unsqueeze};
    use crate::dim::Dim;
    use crate::dtype::DataType;
    use crate::error::OpError;
    use crate::ops::test_util::{float, infer, infer_shape, infer_with};
    use crate::value::{Constant, ValueInfo};

    fn int64_vec(values: &[i64]) -> ValueInfo {
        ValueInfo::from_constant(Constant::int64_vec(values.to_vec()))
    }

    #[test]
    fn test_reshape() {
        #[derive(Clone, Debug)]
        struct Case {
            input: Vec<Dim>,
            shape: Vec<i64>,
            allow_zero: bool,
            expected: Result<Vec<Dim>, ()>,
        }

        let cases = [
            Case {
                input: dims![2, 3, 4],
                shape: vec![4, 3, 2],
                allow_zero: false,
                expected: Ok(dims![4, 3, 2]),
            },
            Case {
                input: dims![2, 3, 4],
                shape: vec![0, -1],
                allow_zero: false,
                expected: Ok(dims![2, 12]),
            },
            Case {
                input: dims!["batch", 3, 4],
                shape: vec![0, -1],
                allow_zero: false,
                expected: Ok(dims!["batch", 12]),
            },
            Case {
                input: dims!["batch", 12],
                shape: vec![-1, 3, 4],
                allow_zero: false,
                expected: Ok(dims!["batch", 3, 4]),
            },
            Case {
                input: dims![0, 3],
                shape: vec![3, 0],
                allow_zero: true,
                expected: Ok(dims![3, 0]),
            },
            Case {
                input: dims![2, 3, 4],
                shape: vec![-1, -1],
                allow_zero: false,
                expected: Err(()),
            },
            Case {
                input: dims![2, 3, 4],
                shape: vec![5, -1],
                allow_zero: false,
                expected: Err(()),
            },
            Case {
                input: dims![2, 3, 4],
                shape: vec![5, 5],
                allow_zero: false,
                expected: Err(()),
            },
        ];

        cases.test_each_clone(|case| {
            let op = Reshape {
                shape: None,
                allow_zero: case.allow_zero,
            };
            let data = float(case.input);
            let shape = int64_vec(&case.shape);
            let result = infer_with(&op, &[Some(&data), Some(&shape)], 1)
                .map(|outputs| outputs[0].shape.clone())
                .map_err(|_| ());
            assert_eq!(result, case.expected);
        })
    }

    #[test]
    fn test_reshape_attr_and_fold() {
        let op = Reshape {
            shape: Some(vec![3, 2]),
            allow_zero: false,
        };
        let data = ValueInfo::from_constant(Constant::int64_vec((0..6).collect()));
        let outputs = infer(&op, &[data]).unwrap();
        let value = outputs[0].constant.as_ref().unwrap();
        assert_eq!(value.shape(), [3, 2]);
        assert_eq!(value.to_i64s(), [0, 1, 2, 3, 4, 5]);

        // Shape input with a known length but unknown values.
        let op = Reshape::default();
        let data = float(dims![2, 3]);
        let shape = ValueInfo::new(DataType::Int64, dims![3]);
        let outputs = infer_with(&op, &[Some(&data), Some(&shape)], 1).unwrap();
        assert_eq!(outputs[0].ndim(), 3);
    }

    #[test]
    fn test_reshape_round_trip() {
        #[derive(Debug)]
        struct Case {
            shape: Vec<i64>,
            expected: Vec<usize>,
        }

        let cases = [
            Case {
                shape: vec![24],
                expected: vec![24],
            },
            Case {
                shape: vec![4, -1],
                expected: vec![4, 6],
            },
            Case {
                shape: vec![0, 0, -1],
                expected: vec![2, 3, 4],
            },
            Case {
                shape: vec![0, 12],
                expected: vec![2, 12],
            },
            Case {
                shape: vec![-1, 1, 2],
                expected: vec![12, 1, 2],
            },
            Case {
                shape: vec![1, 2, 1, 3, 4],
                expected: vec![1, 2, 1, 3, 4],
            },
        ];

        let values = (0..24).map(f64::from).collect();
        let data = Constant::from_floats(DataType::Float, &[2, 3, 4], values);
        let op = Reshape::default();

        cases.test_each(|case| {
            let input = ValueInfo::from_constant(data.clone());
            let shape = int64_vec(&case.shape);
            let reshaped = infer_with(&op, &[Some(&input), Some(&shape)], 1).unwrap();
            let value = reshaped[0].constant.as_ref().unwrap();
            assert_eq!(value.shape(), case.expected);
            assert_eq!(value.to_f64s(), data.to_f64s());

            let back = int64_vec(&[2, 3, 4]);
            let restored = infer_with(&op, &[Some(&reshaped[0]), Some(&back)], 1).unwrap();
            assert_eq!(restored[0].constant.as_ref(), Some(&data));
        })
    }

    #[test]
    fn test_flatten() {
        #[derive(Clone, Debug)]
        struct Case {
            input: Vec<Dim>,
            axis: i64,
            expected: Vec<Dim>,
        }

        let cases = [
            Case {
                input: dims![2, 3, 4, 5],
                axis: 2,
                expected: dims![6, 20],
            },
            Case {
                input: dims![2, 3, 4, 5],
                axis: -3,
                expected: dims![2, 60],
            },
            Case {
                input: dims![2, 3],
                axis: 0,
                expected: dims![1, 6],
            },
            Case {
                input: dims![2, 3],
                axis: 2,
                expected: dims![6, 1],
            },
            Case {
                input: dims!["batch", 3, 4],
                axis: 1,
                expected: dims!["batch", 12],
            },
        ];

        cases.test_each_clone(|case| {
            let op = Flatten { axis: case.axis };
            assert_eq!(infer_shape(&op, &[float(case.input)]), Ok(case.expected));
        });

        let op = Flatten { axis: 3 };
        assert!(infer(&op, &[float(dims![2, 3])]).is_err());
    }

    #[test]
    fn test_squeeze_unsqueeze() {
        let op = Squeeze {
            axes: Some(vec![0, -1]),
        };
        assert_eq!(
            infer_shape(&op, &[float(dims![1, 3, 1, 1])]),
            Ok(dims![3, 1])
        );

        let op = Squeeze::default();
        assert_eq!(
            infer_shape(&op, &[float(dims![1, 3, 1, 2])]),
            Ok(dims![3, 2])
        );

        let op = Squeeze {
            axes: Some(vec![1]),
        };
        assert!(matches!(
            infer(&op, &[float(dims![1, 3])]),
            Err(OpError::ShapeMismatch(_))
        ));

        let op = Unsqueeze {
            axes: Some(vec![0, 4]),
        };
        assert_eq!(
            infer_shape(&op, &[float(dims![3, 1, 2])]),
            Ok(dims![1, 3, 1, 2, 1])
        );

        // Unsqueeze with axes from an input.
        let op = Unsqueeze::default();
        let data = float(dims![3, 2]);
        let axes = int64_vec(&[-1, 0, 2]);
        let outputs = infer_with(&op, &[Some(&data), Some(&axes)], 1).unwrap();
        assert_eq!(outputs[0].shape, dims![1, 3, 1, 2, 1]);
    }

    #[test]
    fn test_transpose() {
        let op = Transpose {
            perm: Some(vec![0, 2, 1]),
        };
        assert_eq!(
            infer_shape(&op, &[float(dims![2, 3, 4])]),
            Ok(dims![2, 4, 3])
        );

        let op = Transpose::default();
        assert_eq!(
            infer_shape(&op, &[float(dims!["batch", 3, 4])]),
            Ok(dims![4, 3, "batch"])
        );

        let op = Transpose {
            perm: Some(vec![0, 0, 1]),
        };
        assert!(matches!(
            infer(&op, &[float(dims![2, 3, 4])]),
            Err(OpError::InvalidAttribute { .. })
        ));

        let op = Transpose {
            perm: Some(vec![1, 0]),
        };
        let data = Constant::int64_vec((0..6).collect()).reshaped(&[2, 3]);
        let data = ValueInfo::from_constant(data);
        let outputs = infer(&op, &[data]).unwrap();
        let value = outputs[0].constant.as_ref().unwrap();
        assert_eq!(value.to_i64s(), [0, 3, 1, 4, 2, 5]);
    }

    #[test]
    fn test_expand() {
        let data = float(dims![3, 1]);
        let shape = int64_vec(&[2, 1, 6]);
        let outputs = infer_with(&Expand, &[Some(&data), Some(&shape)], 1).unwrap();
        assert_eq!(outputs[0].shape, dims![2, 3, 6]);

        let data = ValueInfo::from_constant(Constant::int64_vec(vec![1, 2]));
        let shape = int64_vec(&[2, 2]);
        let outputs = infer_with(&Expand, &[Some(&data), Some(&shape)], 1).unwrap();
        let value = outputs[0].constant.as_ref().unwrap();
        assert_eq!(value.to_i64s(), [1, 2, 1, 2]);

        let data = float(dims![3, 4]);
        let shape = int64_vec(&[2, 4]);
        let result = infer_with(&Expand, &[Some(&data), Some(&shape)], 1);
        assert!(matches!(result, Err(OpError::ShapeMismatch(_))));

        // int32 target shape.
        let data = float(dims![3, 1, 1]);
        let shape = ValueInfo::from_constant(Constant::from_ints(
            DataType::Int32,
            &[4],
            vec![2, 3, 4, 5],
        ));
        let outputs = infer_with(&Expand, &[Some(&data), Some(&shape)], 1).unwrap();
        assert_eq!(outputs[0].shape, dims![2, 3, 4, 5]);

        let shape = Constant::from_floats(DataType::Float, &[2], vec![2., 1.]);
        let shape = ValueInfo::from_constant(shape);
        let result = infer_with(&Expand, &[Some(&data), Some(&shape)], 1);
        assert!(matches!(result, Err(OpError::TypeMismatch(_))));

        // Shape with unknown values.
        let data = float(dims![3, 1]);
        let shape = ValueInfo::new(DataType::Int64, dims![3]);
        let outputs = infer_with(&Expand, &[Some(&data), Some(&shape)], 1).unwrap();
        assert_eq!(outputs[0].ndim(), 3);
        assert_eq!(outputs[0].shape[1], Dim::Fixed(3));
    }

    #[test]
    fn test_tile() {
        let data = float(dims![2, 2]);
        let repeats = int64_vec(&[1, 2]);
        let outputs = infer_with(&Tile, &[Some(&data), Some(&repeats)], 1).unwrap();
        assert_eq!(outputs[0].shape, dims![2, 4]);

        let repeats = int64_vec(&[3, 2]);
        let outputs = infer_with(&Tile, &[Some(&data), Some(&repeats)], 1).unwrap();
        assert_eq!(outputs[0].shape, dims![6, 4]);

        let repeats = int64_vec(&[3]);
        let result = infer_with(&Tile, &[Some(&data), Some(&repeats)], 1);
        assert!(matches!(result, Err(OpError::ShapeMismatch(_))));

        let data = ValueInfo::from_constant(Constant::int64_vec(vec![1, 2]));
        let repeats = int64_vec(&[2]);
        let outputs = infer_with(&Tile, &[Some(&data), Some(&repeats)], 1).unwrap();
        let value = outputs[0].constant.as_ref().unwrap();
        assert_eq!(value.to_i64s(), [1, 2, 1, 2]);
    }

    #[test]
    fn test_shape() {
        let outputs = infer(&Shape::default(), &[float(dims![1, 3, 4])]).unwrap();
        let value = outputs[0].constant.as_ref().unwrap();
        assert_eq!(value.to_i64s(), [1, 3, 4]);

        let outputs = infer(&Shape::default(), &[float(dims!["batch", 3])]).unwrap();
        assert_eq!(outputs[0].dtype, DataType::Int64);
        assert_eq!(outputs[0].shape, dims![2]);
        assert!(outputs[0].constant.is_none());

        let op = Shape {
            start: Some(1),
            end: None,
        };
        let outputs = infer(&op, &[float(dims!["batch", 3, 4])]).unwrap();
        let value = outputs[0].constant.as_ref().unwrap();
        assert_eq!(value.to_i64s(), [3, 4]);
    }
}
