//! Tensor dimensions which may be fixed or symbolic.

use std::borrow::Cow;
use std::fmt;

/// Size of a tensor dimension.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Dim {
    /// A dimension whose size is known.
    Fixed(usize),

    /// A dynamic dimension, identified by name.
    ///
    /// Two dimensions with the same symbol name are known to have the same
    /// size.
    Symbol(String),
}

impl Dim {
    /// Return the size if this dimension is fixed.
    pub fn fixed(&self) -> Option<usize> {
        match self {
            Dim::Fixed(size) => Some(*size),
            Dim::Symbol(_) => None,
        }
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self, Dim::Fixed(_))
    }
}

impl From<usize> for Dim {
    fn from(size: usize) -> Dim {
        Dim::Fixed(size)
    }
}

impl From<&str> for Dim {
    fn from(name: &str) -> Dim {
        Dim::Symbol(name.to_string())
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Fixed(size) => write!(f, "{}", size),
            Dim::Symbol(name) => write!(f, "{}", name),
        }
    }
}

/// Conversion used by the [`dims`](crate::dims) macro.
#[doc(hidden)]
pub trait IntoDim {
    fn into_dim(self) -> Dim;
}

impl IntoDim for usize {
    fn into_dim(self) -> Dim {
        Dim::Fixed(self)
    }
}

impl IntoDim for i32 {
    fn into_dim(self) -> Dim {
        Dim::Fixed(self.max(0) as usize)
    }
}

impl IntoDim for &str {
    fn into_dim(self) -> Dim {
        Dim::Symbol(self.to_string())
    }
}

impl IntoDim for Dim {
    fn into_dim(self) -> Dim {
        self
    }
}

/// Create a `Vec<Dim>` from a list of sizes and symbol names.
///
/// ```
/// use onnx_sema::{dims, Dim};
///
/// let shape = dims![1, 3, "height", "width"];
/// assert_eq!(shape[0], Dim::Fixed(1));
/// assert_eq!(shape[2], Dim::Symbol("height".into()));
/// ```
#[macro_export]
macro_rules! dims {
    () => {
        Vec::<$crate::Dim>::new()
    };
    ($($dim:expr),+ $(,)?) => {
        vec![$($crate::dim::IntoDim::into_dim($dim)),+]
    };
}

/// Return the sizes of a shape if all dimensions are fixed.
pub fn fixed_shape(shape: &[Dim]) -> Option<Vec<usize>> {
    shape.iter().map(|d| d.fixed()).collect()
}

/// Convert a fixed shape to a `Vec<Dim>`.
pub fn from_fixed(shape: &[usize]) -> Vec<Dim> {
    shape.iter().copied().map(Dim::Fixed).collect()
}

/// Formats a shape as `[1, 3, batch]`.
pub struct ShapeDisplay<'a>(pub &'a [Dim]);

impl fmt::Display for ShapeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, dim) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", dim)?;
        }
        write!(f, "]")
    }
}

/// Generates named symbols.
///
/// During inference it is sometimes necessary to create a new symbol for a
/// dimension whose size depends on values that are not known, such as the
/// output of a slice with dynamic bounds.
pub struct SymbolGen {
    prefix: Cow<'static, str>,
    next_symbol_id: u32,
}

impl Default for SymbolGen {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolGen {
    pub fn new() -> Self {
        Self::with_prefix("unknown".into())
    }

    pub fn with_prefix(prefix: Cow<'static, str>) -> Self {
        Self {
            prefix,
            next_symbol_id: 0,
        }
    }

    fn gen_name(&mut self) -> String {
        self.next_symbol_id += 1;
        format!("{}_{}", self.prefix, self.next_symbol_id)
    }

    /// Generate a new symbolic dimension.
    pub fn gen_dim(&mut self) -> Dim {
        Dim::Symbol(self.gen_name())
    }

    /// Generate a shape with `ndim` new symbolic dimensions.
    pub fn gen_shape(&mut self, ndim: usize) -> Vec<Dim> {
        (0..ndim).map(|_| self.gen_dim()).collect()
    }
}
