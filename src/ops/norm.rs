use crate::dim::{Dim, ShapeDisplay};
use crate::dtype::DataType;
use crate::error::OpError;
use crate::ops::{
    check_dims_match, check_dtype, check_inputs, check_rank, required, InferCtx, InferOp,
};
use crate::value::ValueInfo;

fn check_min_rank(name: &str, input: &ValueInfo, min: usize) -> Result<(), OpError> {
    if input.ndim() < min {
        return Err(OpError::shape(format!(
            "\"{}\" must have at least {} dims but has shape {}",
            name,
            min,
            ShapeDisplay(&input.shape)
        )));
    }
    Ok(())
}

/// Check that a per-channel parameter is a vector of length `channels`.
fn check_channel_param(name: &str, param: &ValueInfo, channels: &Dim) -> Result<(), OpError> {
    check_rank(name, param, 1)?;
    check_dims_match(&format!("\"{}\" length and channel count", name), &param.shape[0], channels)
}

/// BatchNormalization operator.
///
/// When more than one output is requested (training mode in older opsets)
/// the extra outputs are per-channel statistics.
///
/// See <https://onnx.ai/onnx/operators/onnx__BatchNormalization.html>.
#[derive(Debug)]
pub struct BatchNormalization {
    pub epsilon: f32,
}

impl InferOp for BatchNormalization {
    fn op_type(&self) -> &str {
        "BatchNormalization"
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 5, 5)?;
        let x = required(inputs, 0)?;
        check_min_rank("X", x, 2)?;
        check_dtype("BatchNormalization", x, DataType::is_float)?;

        let channels = x.shape[1].clone();
        for (i, name) in ["scale", "B", "input_mean", "input_var"].into_iter().enumerate() {
            let param = required(inputs, i + 1)?;
            check_dtype("BatchNormalization", param, DataType::is_float)?;
            check_channel_param(name, param, &channels)?;
        }

        let mut outputs = vec![ValueInfo::new(x.dtype, x.shape.clone())];
        for _ in 1..ctx.num_outputs.min(5) {
            outputs.push(ValueInfo::new(x.dtype, vec![channels.clone()]));
        }
        Ok(outputs)
    }
}

/// InstanceNormalization operator.
///
/// See <https://onnx.ai/onnx/operators/onnx__InstanceNormalization.html>.
#[derive(Debug)]
pub struct InstanceNormalization {
    pub epsilon: f32,
}

impl InferOp for InstanceNormalization {
    fn op_type(&self) -> &str {
        "InstanceNormalization"
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        _ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 3, 3)?;
        let x = required(inputs, 0)?;
        check_min_rank("input", x, 3)?;
        check_dtype("InstanceNormalization", x, DataType::is_float)?;

        let channels = &x.shape[1];
        check_channel_param("scale", required(inputs, 1)?, channels)?;
        check_channel_param("B", required(inputs, 2)?, channels)?;

        Ok([ValueInfo::new(x.dtype, x.shape.clone())].into())
    }
}

/// LRN (Local Response Normalization) operator.
///
/// See <https://onnx.ai/onnx/operators/onnx__LRN.html>.
#[derive(Debug)]
pub struct Lrn {
    pub size: i64,
    pub alpha: f32,
    pub beta: f32,
    pub bias: f32,
}

impl InferOp for Lrn {
    fn op_type(&self) -> &str {
        "LRN"
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        _ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 1, 1)?;
        let x = required(inputs, 0)?;
        if self.size < 1 {
            return Err(OpError::attr("size", format!("value {} must be positive", self.size)));
        }
        check_min_rank("X", x, 3)?;
        check_dtype("LRN", x, DataType::is_float)?;
        Ok([ValueInfo::new(x.dtype, x.shape.clone())].into())
    }
}

/// ImageScaler operator.
///
/// Computes `scale * x + bias[c]` for an NCHW image. This was removed from
/// the standard operator set in opset 10.
#[derive(Debug)]
pub struct ImageScaler {
    pub bias: Vec<f32>,
    pub scale: f32,
}

impl InferOp for ImageScaler {
    fn op_type(&self) -> &str {
        "ImageScaler"
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        _ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 1, 1)?;
        let x = required(inputs, 0)?;
        check_rank("input", x, 4)?;
        check_dtype("ImageScaler", x, DataType::is_float)?;

        if let Dim::Fixed(channels) = x.shape[1] {
            if self.bias.len() != channels {
                return Err(OpError::attr(
                    "bias",
                    format!(
                        "has {} values but input has {} channels",
                        self.bias.len(),
                        channels
                    ),
                ));
            }
        }
        Ok([ValueInfo::new(x.dtype, x.shape.clone())].into())
    }
}
