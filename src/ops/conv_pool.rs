use crate::dim::{fixed_shape, Dim, ShapeDisplay};
use crate::dtype::DataType;
use crate::error::OpError;
use crate::geometry::{transpose_output_dims, Window, WindowAttrs};
use crate::ops::{
    check_dims_match, check_dtype, check_inputs, check_rank, common_dtype, optional, required,
    InferCtx, InferOp,
};
use crate::value::ValueInfo;

/// Check that `input` has a batch dim, a channel dim and at least one
/// spatial dim.
fn check_spatial_input(name: &str, input: &ValueInfo) -> Result<(), OpError> {
    if input.ndim() < 3 {
        return Err(OpError::shape(format!(
            "\"{}\" must have at least 3 dims but has shape {}",
            name,
            ShapeDisplay(&input.shape)
        )));
    }
    Ok(())
}

/// Convert a `kernel_shape` attribute to sizes, checking it has one entry per
/// spatial dim.
fn kernel_sizes(kernel_shape: &[i64], spatial_dims: usize) -> Result<Vec<usize>, OpError> {
    if kernel_shape.len() != spatial_dims {
        return Err(OpError::attr(
            "kernel_shape",
            format!(
                "has {} values but input has {} spatial dims",
                kernel_shape.len(),
                spatial_dims
            ),
        ));
    }
    kernel_shape
        .iter()
        .map(|&k| {
            if k > 0 {
                Ok(k as usize)
            } else {
                Err(OpError::attr("kernel_shape", format!("size {} must be positive", k)))
            }
        })
        .collect()
}

/// Resolve the kernel size of a convolution from its weights and optional
/// `kernel_shape` attribute.
///
/// Returns `None` if the kernel size is not known.
fn conv_kernel(
    kernel_shape: Option<&[i64]>,
    weight: &ValueInfo,
) -> Result<Option<Vec<usize>>, OpError> {
    let weight_spatial = &weight.shape[2..];
    let Some(kernel_shape) = kernel_shape else {
        return Ok(fixed_shape(weight_spatial));
    };
    let kernel = kernel_sizes(kernel_shape, weight_spatial.len())?;
    for (k, dim) in kernel.iter().zip(weight_spatial) {
        if let Dim::Fixed(size) = dim {
            if size != k {
                return Err(OpError::attr(
                    "kernel_shape",
                    format!(
                        "{:?} does not match weight shape {}",
                        kernel_shape,
                        ShapeDisplay(&weight.shape)
                    ),
                ));
            }
        }
    }
    Ok(Some(kernel))
}

/// Check the optional bias input of a convolution.
fn check_bias(bias: Option<&ValueInfo>, out_channels: &Dim) -> Result<(), OpError> {
    let Some(bias) = bias else {
        return Ok(());
    };
    check_rank("bias", bias, 1)?;
    check_dims_match("bias size and output channel", &bias.shape[0], out_channels)
}

fn check_group(group: i64) -> Result<usize, OpError> {
    if group < 1 {
        return Err(OpError::attr("group", format!("value {} must be positive", group)));
    }
    Ok(group as usize)
}

/// Compute spatial output dims, or generate them if the kernel is unknown.
fn forward_spatial_dims(
    attrs: &WindowAttrs,
    kernel: Option<Vec<usize>>,
    input: &[Dim],
    ctx: &mut InferCtx,
) -> Result<Vec<Dim>, OpError> {
    match kernel {
        Some(kernel) => attrs.resolve(&kernel)?.output_dims(input, ctx.sym_gen),
        None => Ok(ctx.sym_gen.gen_shape(input.len())),
    }
}

/// Conv and ConvInteger operators.
///
/// See <https://onnx.ai/onnx/operators/onnx__Conv.html>.
#[derive(Debug, Default)]
pub struct Conv {
    pub window: WindowAttrs,
    pub group: i64,
    pub kernel_shape: Option<Vec<i64>>,

    /// Take 8-bit integer inputs and produce an `int32` output, as
    /// ConvInteger. Inputs 2 and 3 are zero points instead of a bias.
    pub integer: bool,
}

impl InferOp for Conv {
    fn op_type(&self) -> &str {
        if self.integer {
            "ConvInteger"
        } else {
            "Conv"
        }
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        let max_inputs = if self.integer { 4 } else { 3 };
        check_inputs(inputs, 2, max_inputs)?;
        let x = required(inputs, 0)?;
        let w = required(inputs, 1)?;
        check_spatial_input("X", x)?;
        check_rank("W", w, x.ndim())?;

        let dtype = if self.integer {
            let is_int8 = |dtype: DataType| matches!(dtype, DataType::Int8 | DataType::UInt8);
            check_dtype(self.op_type(), x, is_int8)?;
            check_dtype(self.op_type(), w, is_int8)?;
            DataType::Int32
        } else {
            check_dtype(self.op_type(), x, DataType::is_float)?;
            common_dtype(self.op_type(), &[x.dtype, w.dtype], ctx.implicit_promotion)?
        };

        let group = check_group(self.group)?;
        let out_channels = w.shape[0].clone();
        if let Dim::Fixed(m) = out_channels {
            if m % group != 0 {
                return Err(OpError::shape(format!(
                    "output channels {} are not divisible by group {}",
                    m, group
                )));
            }
        }
        if let (Dim::Fixed(c), Dim::Fixed(wc)) = (&x.shape[1], &w.shape[1]) {
            if *c != wc * group {
                return Err(OpError::shape(format!(
                    "input has {} channels but weights expect {} x {} groups",
                    c, wc, group
                )));
            }
        }
        if !self.integer {
            check_bias(optional(inputs, 2), &out_channels)?;
        }

        let kernel = conv_kernel(self.kernel_shape.as_deref(), w)?;
        let spatial = forward_spatial_dims(&self.window, kernel, &x.shape[2..], ctx)?;

        let mut shape = vec![x.shape[0].clone(), out_channels];
        shape.extend(spatial);
        Ok([ValueInfo::new(dtype, shape)].into())
    }
}

/// ConvTranspose operator.
///
/// See <https://onnx.ai/onnx/operators/onnx__ConvTranspose.html>.
#[derive(Debug, Default)]
pub struct ConvTranspose {
    pub window: WindowAttrs,
    pub group: i64,
    pub kernel_shape: Option<Vec<i64>>,
    pub output_padding: Option<Vec<i64>>,
    pub output_shape: Option<Vec<i64>>,
}

impl ConvTranspose {
    fn spatial_dims(
        &self,
        window: &Window,
        input: &[Dim],
        ctx: &mut InferCtx,
    ) -> Result<Vec<Dim>, OpError> {
        transpose_output_dims(
            window,
            input,
            self.output_padding.as_deref(),
            self.output_shape.as_deref(),
            ctx.sym_gen,
        )
    }
}

impl InferOp for ConvTranspose {
    fn op_type(&self) -> &str {
        "ConvTranspose"
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 2, 3)?;
        let x = required(inputs, 0)?;
        let w = required(inputs, 1)?;
        check_spatial_input("X", x)?;
        check_rank("W", w, x.ndim())?;
        check_dtype("ConvTranspose", x, DataType::is_float)?;
        let dtype = common_dtype("ConvTranspose", &[x.dtype, w.dtype], ctx.implicit_promotion)?;

        let group = check_group(self.group)?;
        check_dims_match("input channel and weight", &x.shape[1], &w.shape[0])?;
        let out_channels = match &w.shape[1] {
            Dim::Fixed(size) => Dim::Fixed(size * group),
            Dim::Symbol(_) if group == 1 => w.shape[1].clone(),
            Dim::Symbol(_) => ctx.sym_gen.gen_dim(),
        };
        check_bias(optional(inputs, 2), &out_channels)?;

        let spatial = match conv_kernel(self.kernel_shape.as_deref(), w)? {
            Some(kernel) => {
                let window = self.window.resolve(&kernel)?;
                self.spatial_dims(&window, &x.shape[2..], ctx)?
            }
            None => ctx.sym_gen.gen_shape(x.ndim() - 2),
        };

        let mut shape = vec![x.shape[0].clone(), out_channels];
        shape.extend(spatial);
        Ok([ValueInfo::new(dtype, shape)].into())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PoolKind {
    Average,
    Max,
}

/// AveragePool and MaxPool operators.
///
/// MaxPool may declare a second output holding the `int64` indices of the
/// selected elements.
///
/// See <https://onnx.ai/onnx/operators/onnx__AveragePool.html> and
/// <https://onnx.ai/onnx/operators/onnx__MaxPool.html>.
#[derive(Debug)]
pub struct Pool {
    pub kind: PoolKind,
    pub window: WindowAttrs,
    pub kernel_shape: Vec<i64>,

    /// Include padding cells in the divisor of AveragePool. This does not
    /// affect the output shape.
    pub count_include_pad: bool,
}

impl InferOp for Pool {
    fn op_type(&self) -> &str {
        match self.kind {
            PoolKind::Average => "AveragePool",
            PoolKind::Max => "MaxPool",
        }
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 1, 1)?;
        let x = required(inputs, 0)?;
        check_spatial_input("X", x)?;
        match self.kind {
            PoolKind::Average => check_dtype(self.op_type(), x, DataType::is_float)?,
            PoolKind::Max => check_dtype(self.op_type(), x, DataType::is_numeric)?,
        }

        let kernel = kernel_sizes(&self.kernel_shape, x.ndim() - 2)?;
        let spatial = forward_spatial_dims(&self.window, Some(kernel), &x.shape[2..], ctx)?;

        let mut shape = x.shape[..2].to_vec();
        shape.extend(spatial);

        let mut outputs = vec![ValueInfo::new(x.dtype, shape.clone())];
        if self.kind == PoolKind::Max && ctx.num_outputs > 1 {
            outputs.push(ValueInfo::new(DataType::Int64, shape));
        }
        Ok(outputs)
    }
}

/// GlobalAveragePool and GlobalMaxPool operators.
///
/// These reduce each spatial dim to size 1.
#[derive(Debug)]
pub struct GlobalPool {
    pub kind: PoolKind,
}

impl InferOp for GlobalPool {
    fn op_type(&self) -> &str {
        match self.kind {
            PoolKind::Average => "GlobalAveragePool",
            PoolKind::Max => "GlobalMaxPool",
        }
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        _ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 1, 1)?;
        let x = required(inputs, 0)?;
        check_spatial_input("X", x)?;
        check_dtype(self.op_type(), x, DataType::is_float)?;

        let mut shape = x.shape[..2].to_vec();
        shape.resize(x.ndim(), Dim::Fixed(1));
        Ok([ValueInfo::new(x.dtype, shape)].into())
    }
}
