//! Normalization of axis attributes.

use smallvec::SmallVec;

use crate::error::OpError;

/// List of resolved axes.
pub type Axes = SmallVec<[usize; 4]>;

/// Resolve an axis given as a signed index into a dimension in `[0, ndim)`.
///
/// `attr` is the name of the attribute or input the axis came from, used in
/// error messages.
pub fn resolve_axis(attr: &str, ndim: usize, axis: i64) -> Result<usize, OpError> {
    let rank = ndim as i64;
    if axis < -rank || axis >= rank {
        return Err(OpError::attr(
            attr,
            format!("axis {} is out of range for rank {}", axis, ndim),
        ));
    }
    let resolved = if axis < 0 { axis + rank } else { axis };
    Ok(resolved as usize)
}

/// Resolve several axes, as for [`resolve_axis`].
///
/// The result is sorted and duplicates are removed.
pub fn resolve_axes<'a>(
    attr: &str,
    ndim: usize,
    axes: impl IntoIterator<Item = &'a i64>,
) -> Result<Axes, OpError> {
    let mut resolved = axes
        .into_iter()
        .map(|&axis| resolve_axis(attr, ndim, axis))
        .collect::<Result<Axes, _>>()?;
    resolved.sort();
    resolved.dedup();
    Ok(resolved)
}

/// Resolve axes, reporting an error if any axis is repeated.
pub fn resolve_unique_axes<'a>(
    attr: &str,
    ndim: usize,
    axes: impl IntoIterator<Item = &'a i64>,
) -> Result<Axes, OpError> {
    let axes: Vec<&i64> = axes.into_iter().collect();
    let resolved = resolve_axes(attr, ndim, axes.iter().copied())?;
    if resolved.len() != axes.len() {
        return Err(OpError::attr(attr, "axes contain duplicates"));
    }
    Ok(resolved)
}
