use rustc_hash::FxHashMap;

use crate::dim::Dim;
use crate::env::env_flag;
use crate::op_registry::OpRegistry;

/// Options which customize how a graph is inferred.
///
/// Some options can also be enabled with environment variables, which are
/// read when the options are created:
///
/// - `ONNX_SEMA_STRICT=1` disables [`skip_unknown_operators`](Self::skip_unknown_operators)
/// - `ONNX_SEMA_PROMOTE=1` enables [`implicit_promotion`](Self::implicit_promotion)
#[derive(Debug)]
pub struct InferOptions {
    pub(crate) registry: OpRegistry,
    pub(crate) default_dim_value: Option<usize>,
    pub(crate) input_dims: FxHashMap<String, Vec<Dim>>,
    pub(crate) skip_unknown_operators: bool,
    pub(crate) implicit_promotion: bool,
}

impl Default for InferOptions {
    fn default() -> Self {
        Self::with_all_ops()
    }
}

impl InferOptions {
    /// Create a set of options with all operators enabled.
    pub fn with_all_ops() -> InferOptions {
        Self::with_ops(OpRegistry::with_all_ops())
    }

    /// Create a set of options with a custom set of operators enabled.
    ///
    /// Nodes whose operator is not in `ops` are treated as unsupported.
    pub fn with_ops(ops: OpRegistry) -> InferOptions {
        InferOptions {
            registry: ops,
            default_dim_value: None,
            input_dims: FxHashMap::default(),
            skip_unknown_operators: !env_flag("ONNX_SEMA_STRICT", false),
            implicit_promotion: env_flag("ONNX_SEMA_PROMOTE", false),
        }
    }

    /// Replace every symbolic dimension of graph inputs with a fixed size.
    ///
    /// This is applied after [`input_dims`](Self::input_dims), so symbolic
    /// dims inside an override are also replaced.
    pub fn default_dim_value(&mut self, size: Option<usize>) -> &mut Self {
        self.default_dim_value = size;
        self
    }

    /// Override the shape of a graph input.
    ///
    /// The number of dims must match the rank declared by the graph.
    pub fn input_dims(&mut self, name: &str, dims: Vec<Dim>) -> &mut Self {
        self.input_dims.insert(name.to_string(), dims);
        self
    }

    /// Set whether nodes with unsupported operators are skipped.
    ///
    /// When enabled (the default) the outputs of such nodes, and any values
    /// computed from them, are left unresolved. When disabled the first
    /// unsupported node fails inference.
    pub fn skip_unknown_operators(&mut self, skip: bool) -> &mut Self {
        self.skip_unknown_operators = skip;
        self
    }

    /// Set whether inputs with mismatched types are promoted to a common
    /// type instead of causing an error.
    pub fn implicit_promotion(&mut self, enable: bool) -> &mut Self {
        self.implicit_promotion = enable;
        self
    }

    pub fn registry(&self) -> &OpRegistry {
        &self.registry
    }
}
