//! Broadcasting of shapes and of constant values.
//!
//! Two forms of broadcasting are supported:
//!
//! - [Multidirectional broadcasting](https://onnx.ai/onnx/repo-docs/Broadcasting.html),
//!   used by current opsets, where shapes are right-aligned and dimensions of
//!   size 1 are stretched to match the other operand.
//! - Legacy broadcasting, used by opset 1-6 arithmetic operators with
//!   `broadcast=1`, where the second operand is aligned into the first
//!   starting at an explicit `axis`.

use rten_tensor::prelude::*;
use rten_tensor::Tensor;

use crate::dim::{Dim, ShapeDisplay, SymbolGen};
use crate::error::OpError;

/// Broadcast two shapes together.
///
/// Where a symbolic dimension is broadcast against a fixed dimension other
/// than 1, the fixed size is used. Two different symbols produce a new
/// symbol, since the result is whichever of them is not 1.
pub fn broadcast_shapes(
    a: &[Dim],
    b: &[Dim],
    sym_gen: &mut SymbolGen,
) -> Result<Vec<Dim>, OpError> {
    let a_pad = b.len().saturating_sub(a.len());
    let b_pad = a.len().saturating_sub(b.len());
    let mut out_shape = Vec::with_capacity(a_pad + a.len());

    let one = Dim::Fixed(1);
    let a_iter = std::iter::repeat_n(&one, a_pad).chain(a);
    let b_iter = std::iter::repeat_n(&one, b_pad).chain(b);

    for (a_dim, b_dim) in a_iter.zip(b_iter) {
        let dim = match (a_dim, b_dim) {
            (x, y) if x == y => x.clone(),
            (Dim::Fixed(1), y) => y.clone(),
            (x, Dim::Fixed(1)) => x.clone(),
            (Dim::Fixed(_), Dim::Fixed(_)) => {
                return Err(OpError::shape(format!(
                    "cannot broadcast {} with {}",
                    ShapeDisplay(a),
                    ShapeDisplay(b)
                )));
            }
            (Dim::Symbol(_), Dim::Fixed(size)) | (Dim::Fixed(size), Dim::Symbol(_)) => {
                Dim::Fixed(*size)
            }
            (Dim::Symbol(_), Dim::Symbol(_)) => sym_gen.gen_dim(),
        };
        out_shape.push(dim);
    }

    Ok(out_shape)
}

/// Broadcast any number of shapes together.
pub fn broadcast_many<'a>(
    shapes: impl IntoIterator<Item = &'a [Dim]>,
    sym_gen: &mut SymbolGen,
) -> Result<Vec<Dim>, OpError> {
    let mut shapes = shapes.into_iter();
    let Some(first) = shapes.next() else {
        return Ok(Vec::new());
    };
    shapes.try_fold(first.to_vec(), |acc, shape| {
        broadcast_shapes(&acc, shape, sym_gen)
    })
}

/// Check that `from` can be broadcast to `to` without changing `to`.
///
/// This is the "unidirectional" broadcasting used by inputs such as the
/// slope of PRelu or the bias of Gemm.
pub fn check_unidirectional(from: &[Dim], to: &[Dim]) -> Result<(), OpError> {
    let error = || {
        OpError::shape(format!(
            "cannot broadcast {} to {}",
            ShapeDisplay(from),
            ShapeDisplay(to)
        ))
    };
    if from.len() > to.len() {
        return Err(error());
    }
    for (f, t) in from.iter().rev().zip(to.iter().rev()) {
        match (f, t) {
            (Dim::Fixed(1), _) => {}
            (f, t) if f == t => {}
            (Dim::Fixed(_), Dim::Fixed(_)) => return Err(error()),
            // Mismatches involving symbols can only be detected at runtime.
            _ => {}
        }
    }
    Ok(())
}

/// Resolve the alignment axis for legacy broadcasting of a `b_rank` operand
/// into an `a_rank` operand.
///
/// `axis` defaults to `a_rank - b_rank`, which aligns the trailing
/// dimensions. Negative values count back from `a_rank`.
pub fn legacy_broadcast_axis(
    a_rank: usize,
    b_rank: usize,
    axis: Option<i64>,
) -> Result<usize, OpError> {
    if b_rank > a_rank {
        return Err(OpError::shape(format!(
            "legacy broadcast operand has rank {} which exceeds {}",
            b_rank, a_rank
        )));
    }
    let axis = axis.unwrap_or((a_rank - b_rank) as i64);
    let resolved = if axis < 0 { axis + a_rank as i64 } else { axis };
    if resolved < 0 || resolved as usize + b_rank > a_rank {
        return Err(OpError::attr(
            "axis",
            format!(
                "axis {} does not fit a rank {} operand into rank {}",
                axis, b_rank, a_rank
            ),
        ));
    }
    Ok(resolved as usize)
}

/// Broadcast `b` into `a` using legacy explicit-axis broadcasting.
///
/// Each dimension of `b` must equal the aligned dimension of `a` or be 1.
/// The result is `a`'s shape.
pub fn legacy_broadcast(a: &[Dim], b: &[Dim], axis: Option<i64>) -> Result<Vec<Dim>, OpError> {
    let start = legacy_broadcast_axis(a.len(), b.len(), axis)?;
    for (i, b_dim) in b.iter().enumerate() {
        let a_dim = &a[start + i];
        match (a_dim, b_dim) {
            (_, Dim::Fixed(1)) => {}
            (x, y) if x == y => {}
            (Dim::Fixed(_), Dim::Fixed(_)) => {
                return Err(OpError::shape(format!(
                    "cannot broadcast {} into {} at axis {}",
                    ShapeDisplay(b),
                    ShapeDisplay(a),
                    start
                )));
            }
            _ => {}
        }
    }
    Ok(a.to_vec())
}

/// Return the shape `b` is reshaped to so that legacy broadcasting at `axis`
/// becomes ordinary right-aligned broadcasting against a rank `a_rank` tensor.
pub fn legacy_aligned_shape(b_shape: &[usize], a_rank: usize, axis: usize) -> Vec<usize> {
    let trailing = a_rank - axis - b_shape.len();
    b_shape
        .iter()
        .copied()
        .chain(std::iter::repeat_n(1, trailing))
        .collect()
}

/// Broadcast two fixed shapes.
pub fn broadcast_fixed(a: &[usize], b: &[usize]) -> Option<Vec<usize>> {
    let ndim = a.len().max(b.len());
    let a_pad = ndim - a.len();
    let b_pad = ndim - b.len();
    (0..ndim)
        .map(|i| {
            let x = if i < a_pad { 1 } else { a[i - a_pad] };
            let y = if i < b_pad { 1 } else { b[i - b_pad] };
            match (x, y) {
                (x, y) if x == y => Some(x),
                (1, y) => Some(y),
                (x, 1) => Some(x),
                _ => None,
            }
        })
        .collect()
}

/// Apply a binary function elementwise to two broadcast tensors.
///
/// `out_shape` must be the result of broadcasting the shapes of `a` and `b`.
pub fn broadcast_zip<T: Copy, U>(
    a: &Tensor<T>,
    b: &Tensor<T>,
    out_shape: &[usize],
    f: impl Fn(T, T) -> U,
) -> Tensor<U> {
    let a_view = a.broadcast(out_shape);
    let b_view = b.broadcast(out_shape);
    let values: Vec<U> = a_view
        .iter()
        .zip(b_view.iter())
        .map(|(x, y)| f(*x, *y))
        .collect();
    Tensor::from_data(out_shape, values)
}
