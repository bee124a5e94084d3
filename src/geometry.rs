//! Output size and padding calculations for windowed operators
//! (convolution, transposed convolution and pooling).

use crate::dim::{Dim, SymbolGen};
use crate::error::OpError;

/// Automatic padding mode, from the `auto_pad` attribute.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum AutoPad {
    /// Padding is given by the `pads` attribute.
    #[default]
    NotSet,

    /// Pad so that `output = ceil(input / stride)`, placing any odd unit of
    /// padding at the end.
    SameUpper,

    /// As `SameUpper`, but any odd unit of padding goes at the start.
    SameLower,

    /// No padding.
    Valid,
}

impl AutoPad {
    /// Parse an `auto_pad` attribute value.
    ///
    /// "SAME" is accepted as an alias for "SAME_UPPER".
    pub fn parse(value: &str) -> Option<AutoPad> {
        let mode = match value {
            "" | "NOTSET" => AutoPad::NotSet,
            "SAME_UPPER" | "SAME" => AutoPad::SameUpper,
            "SAME_LOWER" => AutoPad::SameLower,
            "VALID" => AutoPad::Valid,
            _ => return None,
        };
        Some(mode)
    }

    pub fn is_same(self) -> bool {
        matches!(self, AutoPad::SameUpper | AutoPad::SameLower)
    }
}

/// Window settings shared by convolution and pooling operators.
///
/// Values are kept as they appear in the attributes and are checked against
/// the number of spatial dimensions when the input is known.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WindowAttrs {
    pub auto_pad: AutoPad,

    /// Explicit padding as `[begin_0, begin_1, ..., end_0, end_1, ...]`.
    pub pads: Option<Vec<i64>>,
    pub strides: Option<Vec<i64>>,
    pub dilations: Option<Vec<i64>>,

    /// Use `ceil` rather than `floor` when computing pooling output sizes.
    pub ceil_mode: bool,
}

/// [`WindowAttrs`] resolved for a given number of spatial dimensions.
#[derive(Clone, Debug, PartialEq)]
pub struct Window {
    pub auto_pad: AutoPad,
    pub kernel: Vec<usize>,
    pub strides: Vec<usize>,
    pub dilations: Vec<usize>,
    pub pads_begin: Vec<usize>,
    pub pads_end: Vec<usize>,
    pub ceil_mode: bool,
}

fn positive_ints(name: &str, values: &[i64], expected_len: usize) -> Result<Vec<usize>, OpError> {
    if values.len() != expected_len {
        return Err(OpError::attr(
            name,
            format!(
                "has {} values but input has {} spatial dims",
                values.len(),
                expected_len
            ),
        ));
    }
    values
        .iter()
        .map(|&x| {
            if x > 0 {
                Ok(x as usize)
            } else {
                Err(OpError::attr(name, format!("value {} must be positive", x)))
            }
        })
        .collect()
}

impl WindowAttrs {
    /// Resolve window settings for a kernel with spatial size `kernel`.
    pub fn resolve(&self, kernel: &[usize]) -> Result<Window, OpError> {
        let n = kernel.len();
        if let Some(k) = kernel.iter().position(|&k| k == 0) {
            return Err(OpError::attr(
                "kernel_shape",
                format!("kernel size is 0 in spatial dim {}", k),
            ));
        }

        let strides = match &self.strides {
            Some(strides) => positive_ints("strides", strides, n)?,
            None => vec![1; n],
        };
        let dilations = match &self.dilations {
            Some(dilations) => positive_ints("dilations", dilations, n)?,
            None => vec![1; n],
        };

        let (pads_begin, pads_end) = match &self.pads {
            Some(_) if self.auto_pad.is_same() => {
                return Err(OpError::attr(
                    "auto_pad",
                    "cannot be combined with explicit \"pads\"",
                ));
            }
            Some(_) if self.auto_pad == AutoPad::Valid => (vec![0; n], vec![0; n]),
            Some(pads) => {
                if pads.len() != 2 * n {
                    return Err(OpError::attr(
                        "pads",
                        format!(
                            "has {} values but expected {} for {} spatial dims",
                            pads.len(),
                            2 * n,
                            n
                        ),
                    ));
                }
                if let Some(pad) = pads.iter().find(|&&p| p < 0) {
                    return Err(OpError::attr("pads", format!("value {} is negative", pad)));
                }
                let pads: Vec<usize> = pads.iter().map(|&p| p as usize).collect();
                (pads[..n].to_vec(), pads[n..].to_vec())
            }
            None => (vec![0; n], vec![0; n]),
        };

        Ok(Window {
            auto_pad: self.auto_pad,
            kernel: kernel.to_vec(),
            strides,
            dilations,
            pads_begin,
            pads_end,
            ceil_mode: self.ceil_mode,
        })
    }
}

/// Compute the output size of a forward convolution or pooling window along
/// one dimension.
///
/// Returns an error if the dilated kernel does not fit in the padded input.
pub fn forward_output_size(
    input: usize,
    kernel: usize,
    stride: usize,
    dilation: usize,
    pad_begin: usize,
    pad_end: usize,
    ceil_mode: bool,
) -> Result<usize, OpError> {
    let padded = (input + pad_begin + pad_end) as i64;
    let extent = padded - (dilation * (kernel - 1)) as i64 - 1;
    if extent < 0 {
        return Err(OpError::shape(format!(
            "dilated kernel size {} exceeds padded input size {}",
            dilation * (kernel - 1) + 1,
            padded
        )));
    }
    let extent = extent as usize;
    let steps = if ceil_mode {
        extent.div_ceil(stride)
    } else {
        extent / stride
    };
    Ok(steps + 1)
}

/// Compute the `(begin, end)` padding for `SAME_UPPER` or `SAME_LOWER` mode
/// such that the output size is `ceil(input / stride)`.
pub fn same_padding(
    input: usize,
    kernel: usize,
    stride: usize,
    dilation: usize,
    mode: AutoPad,
) -> (usize, usize) {
    let output = input.div_ceil(stride);
    let needed = (output.saturating_sub(1) * stride + dilation * (kernel - 1) + 1) as i64;
    let total = (needed - input as i64).max(0) as usize;
    let small = total / 2;
    let large = total - small;
    if mode == AutoPad::SameLower {
        (large, small)
    } else {
        (small, large)
    }
}

impl Window {
    /// Return the padding applied to spatial dim `i` of an input of size
    /// `input`.
    pub fn padding(&self, i: usize, input: usize) -> (usize, usize) {
        match self.auto_pad {
            AutoPad::SameUpper | AutoPad::SameLower => same_padding(
                input,
                self.kernel[i],
                self.strides[i],
                self.dilations[i],
                self.auto_pad,
            ),
            AutoPad::Valid => (0, 0),
            AutoPad::NotSet => (self.pads_begin[i], self.pads_end[i]),
        }
    }

    /// Compute the spatial output dims of a forward convolution or pool.
    pub fn output_dims(&self, input: &[Dim], sym_gen: &mut SymbolGen) -> Result<Vec<Dim>, OpError> {
        input
            .iter()
            .enumerate()
            .map(|(i, dim)| match dim {
                Dim::Fixed(size) => {
                    if self.auto_pad.is_same() {
                        return Ok(Dim::Fixed(size.div_ceil(self.strides[i])));
                    }
                    let (pad_begin, pad_end) = self.padding(i, *size);
                    forward_output_size(
                        *size,
                        self.kernel[i],
                        self.strides[i],
                        self.dilations[i],
                        pad_begin,
                        pad_end,
                        self.ceil_mode,
                    )
                    .map(Dim::Fixed)
                }
                Dim::Symbol(_) if self.auto_pad.is_same() && self.strides[i] == 1 => Ok(dim.clone()),
                Dim::Symbol(_) => Ok(sym_gen.gen_dim()),
            })
            .collect()
    }
}

/// Compute the output size of a transposed convolution along one dimension.
pub fn transpose_output_size(
    input: usize,
    kernel: usize,
    stride: usize,
    dilation: usize,
    pad_begin: usize,
    pad_end: usize,
    output_padding: usize,
) -> Result<usize, OpError> {
    let full = stride * input.saturating_sub(1) + output_padding + dilation * (kernel - 1) + 1;
    full.checked_sub(pad_begin + pad_end).ok_or_else(|| {
        OpError::shape(format!(
            "padding {} exceeds transposed convolution output size {}",
            pad_begin + pad_end,
            full
        ))
    })
}

/// Padding for a transposed convolution which produces a requested output
/// size.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TransposePadding {
    pub begin: usize,
    pub end: usize,

    /// Extra output padding needed when the requested size exceeds the full
    /// unpadded output.
    pub extra_output_padding: usize,
}

/// Compute the padding of a transposed convolution that produces an output
/// of size `output`.
///
/// The total padding is split in half with the odd unit at the end, or at
/// the start if `mode` is `SAME_UPPER`. If the requested output is larger
/// than the full output, there is no padding and the difference becomes
/// extra output padding.
pub fn transpose_padding_for_output(
    input: usize,
    kernel: usize,
    stride: usize,
    dilation: usize,
    output_padding: usize,
    output: usize,
    mode: AutoPad,
) -> TransposePadding {
    let full = (stride * input.saturating_sub(1) + output_padding + dilation * (kernel - 1) + 1) as i64;
    let total = full - output as i64;
    if total < 0 {
        return TransposePadding {
            begin: 0,
            end: 0,
            extra_output_padding: (-total) as usize,
        };
    }
    let total = total as usize;
    let small = total / 2;
    let large = total - small;
    let (begin, end) = if mode == AutoPad::SameUpper {
        (large, small)
    } else {
        (small, large)
    };
    TransposePadding {
        begin,
        end,
        extra_output_padding: 0,
    }
}

/// Compute the spatial output dims of a transposed convolution.
///
/// `output_shape`, if given, lists either the spatial output dims or the
/// full output shape and takes priority over padding settings.
pub fn transpose_output_dims(
    window: &Window,
    input: &[Dim],
    output_padding: Option<&[i64]>,
    output_shape: Option<&[i64]>,
    sym_gen: &mut SymbolGen,
) -> Result<Vec<Dim>, OpError> {
    let n = input.len();
    let output_padding = match output_padding {
        Some(op) => {
            if op.len() != n {
                return Err(OpError::attr(
                    "output_padding",
                    format!("has {} values but expected {}", op.len(), n),
                ));
            }
            let mut resolved = Vec::with_capacity(n);
            for (i, &pad) in op.iter().enumerate() {
                if pad < 0 || pad as usize >= window.strides[i].max(window.dilations[i]) {
                    return Err(OpError::attr(
                        "output_padding",
                        format!("value {} must be less than stride or dilation", pad),
                    ));
                }
                resolved.push(pad as usize);
            }
            resolved
        }
        None => vec![0; n],
    };

    if let Some(shape) = output_shape {
        let spatial = if shape.len() == n + 2 {
            &shape[2..]
        } else if shape.len() == n {
            shape
        } else {
            return Err(OpError::attr(
                "output_shape",
                format!("has {} values but expected {}", shape.len(), n),
            ));
        };
        return spatial
            .iter()
            .map(|&size| {
                if size < 0 {
                    Err(OpError::attr(
                        "output_shape",
                        format!("size {} is negative", size),
                    ))
                } else {
                    Ok(Dim::Fixed(size as usize))
                }
            })
            .collect();
    }

    input
        .iter()
        .enumerate()
        .map(|(i, dim)| {
            let Dim::Fixed(size) = dim else {
                return Ok(sym_gen.gen_dim());
            };
            if window.auto_pad.is_same() {
                return Ok(Dim::Fixed(size * window.strides[i]));
            }
            let (pad_begin, pad_end) = match window.auto_pad {
                AutoPad::Valid => (0, 0),
                _ => (window.pads_begin[i], window.pads_end[i]),
            };
            transpose_output_size(
                *size,
                window.kernel[i],
                window.strides[i],
                window.dilations[i],
                pad_begin,
                pad_end,
                output_padding[i],
            )
            .map(Dim::Fixed)
        })
        .collect()
}
