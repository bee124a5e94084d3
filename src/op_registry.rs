//! Conversion of graph nodes into operators.
//!
//! Each operator type maps to a read function which parses the node's
//! attributes into the operator's canonical representation. Attributes
//! which differ between opsets are normalized here so that operators see
//! one form.

use std::cell::RefCell;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::warn;

use crate::dtype::DataType;
use crate::error::OpError;
use crate::geometry::{AutoPad, WindowAttrs};
use crate::graph::{AttrValue, Node};
use crate::ops;
use crate::ops::{
    BinaryKind, EmbeddingBagMode, InferOp, PadMode, PoolKind, ReduceKind, UnaryKind, VariadicKind,
};
use crate::value::Constant;
use onnx_sema_proto::onnx;

/// Context passed to read functions.
#[derive(Clone, Debug)]
pub struct ReadContext {
    /// Opset version of the default ONNX domain.
    pub opset: i64,
}

type ReadOpResult = Result<Box<dyn InferOp>, OpError>;

type ReadOpFunction = dyn Fn(&Attrs, &ReadContext) -> ReadOpResult;

/// Registry of the operators that can be read from graph nodes.
///
/// New registries are empty. Use [`OpRegistry::with_all_ops`] to create a
/// registry with all built-in operators.
#[derive(Default)]
pub struct OpRegistry {
    /// Map from operator type (`NodeProto.op_type`) to read function.
    ops: FxHashMap<&'static str, Box<ReadOpFunction>>,
}

impl std::fmt::Debug for OpRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut op_types: Vec<_> = self.ops.keys().collect();
        op_types.sort();
        f.debug_struct("OpRegistry").field("ops", &op_types).finish()
    }
}

impl OpRegistry {
    pub fn new() -> Self {
        OpRegistry {
            ops: FxHashMap::default(),
        }
    }

    /// Register a read function for an operator type, replacing any existing
    /// registration.
    ///
    /// ```
    /// use onnx_sema::ops::{Unary, UnaryKind};
    /// use onnx_sema::OpRegistry;
    ///
    /// let mut reg = OpRegistry::new();
    /// reg.register("Relu", |_attrs, _ctx| {
    ///     Ok(Box::new(Unary { kind: UnaryKind::Relu }))
    /// });
    /// assert!(reg.contains("Relu"));
    /// ```
    pub fn register<F>(&mut self, op_type: &'static str, read: F)
    where
        F: Fn(&Attrs, &ReadContext) -> ReadOpResult + 'static,
    {
        self.ops.insert(op_type, Box::new(read));
    }

    /// Return true if an operator type is registered.
    pub fn contains(&self, op_type: &str) -> bool {
        self.ops.contains_key(op_type)
    }

    /// Read the operator for a graph node.
    ///
    /// Nodes from domains other than the default ONNX domain, and operator
    /// types that are not registered, produce
    /// [`OpError::UnsupportedOperator`].
    pub fn read_op(&self, node: &Node, ctx: &ReadContext) -> ReadOpResult {
        if !node.is_default_domain() {
            return Err(OpError::UnsupportedOperator(format!(
                "{}.{}",
                node.domain.as_deref().unwrap_or_default(),
                node.op_type
            )));
        }
        let read_fn = self
            .ops
            .get(node.op_type.as_str())
            .ok_or_else(|| OpError::UnsupportedOperator(node.op_type.clone()))?;

        let attrs = Attrs::new(node);
        let op = read_fn(&attrs, ctx)?;
        for name in attrs.unused() {
            warn!(op_type = %node.op_type, attr = name, "ignoring unsupported attribute");
        }
        Ok(op)
    }

    /// Create a registry with all built-in operators registered.
    pub fn with_all_ops() -> Self {
        let mut reg = OpRegistry::new();

        macro_rules! register_op {
            ($op_type:expr, $read:expr) => {
                reg.register($op_type, $read)
            };
        }

        macro_rules! register_unary {
            ($($kind:ident),+) => {
                $(register_op!(stringify!($kind), |_attrs, _ctx| {
                    Ok(Box::new(ops::Unary { kind: UnaryKind::$kind }))
                });)+
            };
        }

        macro_rules! register_binary {
            ($($kind:ident),+) => {
                $(register_op!(stringify!($kind), |attrs, _ctx| read_binary(attrs, BinaryKind::$kind));)+
            };
        }

        macro_rules! register_variadic {
            ($($kind:ident),+) => {
                $(register_op!(stringify!($kind), |_attrs, _ctx| {
                    Ok(Box::new(ops::Variadic { kind: VariadicKind::$kind }))
                });)+
            };
        }

        macro_rules! register_reduce {
            ($($op_type:literal => $kind:ident),+ $(,)?) => {
                $(register_op!($op_type, |attrs, _ctx| read_reduce(attrs, ReduceKind::$kind));)+
            };
        }

        register_unary!(
            Abs, Acos, Acosh, Asin, Asinh, Atan, Atanh, Ceil, Cos, Cosh, Erf, Exp, Floor, Identity,
            Log, Neg, Not, Reciprocal, Relu, Sigmoid, Sign, Sin, Sinh, Sqrt, Tan, Tanh
        );
        register_binary!(Add, And, Div, Equal, Greater, Less, Mul, Or, Pow, Sub, Xor);
        register_variadic!(Max, Mean, Min, Sum);
        register_reduce!(
            "ReduceL1" => L1,
            "ReduceL2" => L2,
            "ReduceLogSum" => LogSum,
            "ReduceLogSumExp" => LogSumExp,
            "ReduceMax" => Max,
            "ReduceMean" => Mean,
            "ReduceMin" => Min,
            "ReduceProd" => Prod,
            "ReduceSum" => Sum,
            "ReduceSumSquare" => SumSquare,
        );

        register_op!("ArgMax", |attrs, _ctx| read_arg_reduce(attrs, true));
        register_op!("ArgMin", |attrs, _ctx| read_arg_reduce(attrs, false));
        register_op!("ATen", read_aten);
        register_op!("AveragePool", |attrs, _ctx| read_pool(attrs, PoolKind::Average));
        register_op!("BatchNormalization", read_batch_norm);
        register_op!("Cast", read_cast);
        register_op!("Clip", read_clip);
        register_op!("Concat", read_concat);
        register_op!("Constant", read_constant);
        register_op!("ConstantFill", read_constant_fill);
        register_op!("ConstantOfShape", |attrs, _ctx| {
            let value = attrs.tensor("value")?.cloned();
            Ok(Box::new(ops::ConstantOfShape { value }))
        });
        register_op!("Conv", |attrs, _ctx| read_conv(attrs, false));
        register_op!("ConvInteger", |attrs, _ctx| read_conv(attrs, true));
        register_op!("ConvTranspose", read_conv_transpose);
        register_op!("Dropout", |attrs, _ctx| {
            attrs.ignore(&["is_test", "ratio", "seed"]);
            Ok(Box::new(ops::Dropout))
        });
        register_op!("Elu", |attrs, _ctx| {
            let alpha = attrs.float("alpha")?.unwrap_or(1.0);
            Ok(Box::new(ops::Unary {
                kind: UnaryKind::Elu { alpha },
            }))
        });
        register_op!("Expand", |_attrs, _ctx| Ok(Box::new(ops::Expand)));
        register_op!("Flatten", |attrs, _ctx| {
            let axis = attrs.int("axis")?.unwrap_or(1);
            Ok(Box::new(ops::Flatten { axis }))
        });
        register_op!("Gather", |attrs, _ctx| {
            let axis = attrs.int("axis")?.unwrap_or(0);
            Ok(Box::new(ops::Gather { axis }))
        });
        register_op!("GatherElements", |attrs, _ctx| {
            let axis = attrs.int("axis")?.unwrap_or(0);
            Ok(Box::new(ops::GatherElements { axis }))
        });
        register_op!("Gemm", read_gemm);
        register_op!("GlobalAveragePool", |_attrs, _ctx| {
            Ok(Box::new(ops::GlobalPool {
                kind: PoolKind::Average,
            }))
        });
        register_op!("GlobalMaxPool", |_attrs, _ctx| {
            Ok(Box::new(ops::GlobalPool {
                kind: PoolKind::Max,
            }))
        });
        register_op!("ImageScaler", |attrs, _ctx| {
            let bias = attrs.floats("bias")?.unwrap_or_default();
            let scale = attrs.float("scale")?.unwrap_or(1.0);
            Ok(Box::new(ops::ImageScaler { bias, scale }))
        });
        register_op!("InstanceNormalization", |attrs, _ctx| {
            let epsilon = attrs.float("epsilon")?.unwrap_or(1e-5);
            Ok(Box::new(ops::InstanceNormalization { epsilon }))
        });
        register_op!("LeakyRelu", |attrs, _ctx| {
            let alpha = attrs.float("alpha")?.unwrap_or(0.01);
            Ok(Box::new(ops::Unary {
                kind: UnaryKind::LeakyRelu { alpha },
            }))
        });
        register_op!("LogSoftmax", |attrs, ctx| read_softmax(attrs, ctx, true));
        register_op!("LRN", |attrs, _ctx| {
            let size = attrs.require_int("size")?;
            let alpha = attrs.float("alpha")?.unwrap_or(1e-4);
            let beta = attrs.float("beta")?.unwrap_or(0.75);
            let bias = attrs.float("bias")?.unwrap_or(1.0);
            Ok(Box::new(ops::Lrn {
                size,
                alpha,
                beta,
                bias,
            }))
        });
        register_op!("MatMul", |_attrs, _ctx| Ok(Box::new(ops::MatMul::default())));
        register_op!("MatMulInteger", |_attrs, _ctx| {
            Ok(Box::new(ops::MatMul { integer: true }))
        });
        register_op!("MaxPool", |attrs, _ctx| read_pool(attrs, PoolKind::Max));
        register_op!("NonZero", |_attrs, _ctx| Ok(Box::new(ops::NonZero)));
        register_op!("OneHot", |attrs, _ctx| {
            let axis = attrs.int("axis")?.unwrap_or(-1);
            Ok(Box::new(ops::OneHot { axis }))
        });
        register_op!("Pad", read_pad);
        register_op!("PRelu", |_attrs, _ctx| Ok(Box::new(ops::PRelu)));
        register_op!("Range", |_attrs, _ctx| Ok(Box::new(ops::Range)));
        register_op!("Reshape", |attrs, _ctx| {
            let shape = attrs.ints("shape")?;
            let allow_zero = attrs.bool("allowzero")?.unwrap_or(false);
            Ok(Box::new(ops::Reshape { shape, allow_zero }))
        });
        register_op!("Shape", |attrs, _ctx| {
            let start = attrs.int("start")?;
            let end = attrs.int("end")?;
            Ok(Box::new(ops::Shape { start, end }))
        });
        register_op!("Slice", |attrs, _ctx| {
            let starts = attrs.ints("starts")?;
            let ends = attrs.ints("ends")?;
            let axes = attrs.ints("axes")?;
            Ok(Box::new(ops::Slice { starts, ends, axes }))
        });
        register_op!("Softmax", |attrs, ctx| read_softmax(attrs, ctx, false));
        register_op!("Split", |attrs, _ctx| {
            let axis = attrs.int("axis")?.unwrap_or(0);
            let split = attrs.ints("split")?;
            let num_outputs = attrs.int("num_outputs")?;
            Ok(Box::new(ops::Split {
                axis,
                split,
                num_outputs,
            }))
        });
        register_op!("Squeeze", |attrs, _ctx| {
            let axes = attrs.ints("axes")?;
            Ok(Box::new(ops::Squeeze { axes }))
        });
        register_op!("Tile", |_attrs, _ctx| Ok(Box::new(ops::Tile)));
        register_op!("Transpose", |attrs, _ctx| {
            let perm = attrs.ints("perm")?;
            Ok(Box::new(ops::Transpose { perm }))
        });
        register_op!("Unsqueeze", |attrs, _ctx| {
            let axes = attrs.ints("axes")?;
            Ok(Box::new(ops::Unsqueeze { axes }))
        });

        reg
    }
}

/// Attributes of a node being read.
///
/// This provides typed access to attributes by name. It also records which
/// attributes have been read, to enable detecting unsupported attributes.
pub struct Attrs<'a> {
    node: &'a Node,
    used_attrs: RefCell<SmallVec<[&'static str; 6]>>,
}

impl<'a> Attrs<'a> {
    fn new(node: &'a Node) -> Self {
        Attrs {
            node,
            used_attrs: RefCell::new(SmallVec::new()),
        }
    }

    /// Get an optional attribute.
    pub fn get(&self, name: &'static str) -> Option<&'a AttrValue> {
        self.used_attrs.borrow_mut().push(name);
        self.node.attr(name)
    }

    /// Mark attributes as read without using their values.
    pub fn ignore(&self, names: &[&'static str]) {
        self.used_attrs.borrow_mut().extend_from_slice(names);
    }

    /// Return the names of attributes which were not read.
    fn unused(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.node
            .attrs
            .iter()
            .map(|attr| attr.name.as_str())
            .filter(|name| !self.used_attrs.borrow().iter().any(|used| used == name))
    }

    pub fn int(&self, name: &'static str) -> Result<Option<i64>, OpError> {
        match self.get(name) {
            None => Ok(None),
            Some(AttrValue::Int(x)) => Ok(Some(*x)),
            Some(other) => Err(wrong_kind(name, "int", other)),
        }
    }

    pub fn require_int(&self, name: &'static str) -> Result<i64, OpError> {
        self.int(name)?.ok_or_else(|| OpError::attr(name, "is required"))
    }

    pub fn bool(&self, name: &'static str) -> Result<Option<bool>, OpError> {
        Ok(self.int(name)?.map(|x| x != 0))
    }

    pub fn float(&self, name: &'static str) -> Result<Option<f32>, OpError> {
        match self.get(name) {
            None => Ok(None),
            Some(AttrValue::Float(x)) => Ok(Some(*x)),
            Some(other) => Err(wrong_kind(name, "float", other)),
        }
    }

    pub fn ints(&self, name: &'static str) -> Result<Option<Vec<i64>>, OpError> {
        match self.get(name) {
            None => Ok(None),
            Some(AttrValue::Ints(x)) => Ok(Some(x.clone())),
            Some(other) => Err(wrong_kind(name, "ints", other)),
        }
    }

    pub fn floats(&self, name: &'static str) -> Result<Option<Vec<f32>>, OpError> {
        match self.get(name) {
            None => Ok(None),
            Some(AttrValue::Floats(x)) => Ok(Some(x.clone())),
            Some(other) => Err(wrong_kind(name, "floats", other)),
        }
    }

    pub fn string(&self, name: &'static str) -> Result<Option<&'a str>, OpError> {
        match self.get(name) {
            None => Ok(None),
            Some(AttrValue::String(x)) => Ok(Some(x.as_str())),
            Some(other) => Err(wrong_kind(name, "string", other)),
        }
    }

    pub fn tensor(&self, name: &'static str) -> Result<Option<&'a Constant>, OpError> {
        match self.get(name) {
            None => Ok(None),
            Some(AttrValue::Tensor(x)) => Ok(Some(x)),
            Some(other) => Err(wrong_kind(name, "tensor", other)),
        }
    }

    /// Get an element type attribute holding a `TensorProto.DataType` value.
    pub fn dtype(&self, name: &'static str) -> Result<Option<DataType>, OpError> {
        let Some(value) = self.int(name)? else {
            return Ok(None);
        };
        let dtype = i32::try_from(value)
            .ok()
            .and_then(|v| DataType::from_onnx(onnx::DataType(v)))
            .ok_or_else(|| OpError::attr(name, format!("unsupported data type {}", value)))?;
        Ok(Some(dtype))
    }
}

fn wrong_kind(name: &str, expected: &str, actual: &AttrValue) -> OpError {
    OpError::attr(
        name,
        format!("expected {} value but got {}", expected, actual.kind()),
    )
}

fn read_binary(attrs: &Attrs, kind: BinaryKind) -> ReadOpResult {
    let broadcast = attrs.bool("broadcast")?.unwrap_or(false);
    let axis = attrs.int("axis")?;
    Ok(Box::new(ops::Binary {
        kind,
        broadcast,
        axis,
    }))
}

fn read_reduce(attrs: &Attrs, kind: ReduceKind) -> ReadOpResult {
    let mut op = ops::Reduce::new(kind);
    op.axes = attrs.ints("axes")?;
    op.keep_dims = attrs.bool("keepdims")?.unwrap_or(true);
    op.noop_with_empty_axes = attrs.bool("noop_with_empty_axes")?.unwrap_or(false);
    Ok(Box::new(op))
}

fn read_arg_reduce(attrs: &Attrs, max: bool) -> ReadOpResult {
    Ok(Box::new(ops::ArgReduce {
        max,
        axis: attrs.int("axis")?.unwrap_or(0),
        keep_dims: attrs.bool("keepdims")?.unwrap_or(true),
        select_last_index: attrs.bool("select_last_index")?.unwrap_or(false),
    }))
}

fn read_aten(attrs: &Attrs, _ctx: &ReadContext) -> ReadOpResult {
    let operator = attrs.string("operator")?.unwrap_or_default();
    if operator != "embedding_bag" {
        return Err(OpError::UnsupportedOperator(format!("ATen:{}", operator)));
    }
    let mode = attrs.int("mode")?.unwrap_or(0);
    let mode = EmbeddingBagMode::from_attr(mode)
        .ok_or_else(|| OpError::attr("mode", format!("unsupported value {}", mode)))?;
    Ok(Box::new(ops::EmbeddingBag { mode }))
}

fn read_window_attrs(attrs: &Attrs) -> Result<WindowAttrs, OpError> {
    let auto_pad = match attrs.string("auto_pad")? {
        Some(mode) => AutoPad::parse(mode)
            .ok_or_else(|| OpError::attr("auto_pad", format!("unsupported value \"{}\"", mode)))?,
        None => AutoPad::NotSet,
    };
    Ok(WindowAttrs {
        auto_pad,
        pads: attrs.ints("pads")?,
        strides: attrs.ints("strides")?,
        dilations: attrs.ints("dilations")?,
        ceil_mode: attrs.bool("ceil_mode")?.unwrap_or(false),
    })
}

fn read_pool(attrs: &Attrs, kind: PoolKind) -> ReadOpResult {
    let window = read_window_attrs(attrs)?;
    let kernel_shape = attrs
        .ints("kernel_shape")?
        .ok_or_else(|| OpError::attr("kernel_shape", "is required"))?;
    let count_include_pad = attrs.bool("count_include_pad")?.unwrap_or(false);
    attrs.ignore(&["storage_order"]);
    Ok(Box::new(ops::Pool {
        kind,
        window,
        kernel_shape,
        count_include_pad,
    }))
}

fn read_conv(attrs: &Attrs, integer: bool) -> ReadOpResult {
    Ok(Box::new(ops::Conv {
        window: read_window_attrs(attrs)?,
        group: attrs.int("group")?.unwrap_or(1),
        kernel_shape: attrs.ints("kernel_shape")?,
        integer,
    }))
}

fn read_conv_transpose(attrs: &Attrs, _ctx: &ReadContext) -> ReadOpResult {
    Ok(Box::new(ops::ConvTranspose {
        window: read_window_attrs(attrs)?,
        group: attrs.int("group")?.unwrap_or(1),
        kernel_shape: attrs.ints("kernel_shape")?,
        output_padding: attrs.ints("output_padding")?,
        output_shape: attrs.ints("output_shape")?,
    }))
}

fn read_batch_norm(attrs: &Attrs, _ctx: &ReadContext) -> ReadOpResult {
    let epsilon = attrs.float("epsilon")?.unwrap_or(1e-5);
    attrs.ignore(&["momentum", "spatial", "is_test", "training_mode", "consumed_inputs"]);
    Ok(Box::new(ops::BatchNormalization { epsilon }))
}

fn read_cast(attrs: &Attrs, _ctx: &ReadContext) -> ReadOpResult {
    let to = attrs
        .dtype("to")?
        .ok_or_else(|| OpError::attr("to", "is required"))?;
    attrs.ignore(&["saturate"]);
    Ok(Box::new(ops::Cast { to }))
}

fn read_clip(attrs: &Attrs, _ctx: &ReadContext) -> ReadOpResult {
    // Opsets before 11 give the bounds as attributes.
    let min = attrs.float("min")?;
    let max = attrs.float("max")?;
    Ok(Box::new(ops::Clip { min, max }))
}

fn read_concat(attrs: &Attrs, ctx: &ReadContext) -> ReadOpResult {
    // `axis` was optional, with a default of 1, before opset 4.
    let axis = match attrs.int("axis")? {
        Some(axis) => axis,
        None if ctx.opset < 4 => 1,
        None => return Err(OpError::attr("axis", "is required")),
    };
    Ok(Box::new(ops::Concat { axis }))
}

fn read_constant(attrs: &Attrs, _ctx: &ReadContext) -> ReadOpResult {
    let mut values = Vec::new();
    if let Some(value) = attrs.tensor("value")? {
        values.push(value.clone());
    }
    if let Some(x) = attrs.float("value_float")? {
        values.push(Constant::float_scalar(x as f64));
    }
    if let Some(x) = attrs.floats("value_floats")? {
        values.push(Constant::float_vec(x.into_iter().map(|x| x as f64).collect()));
    }
    if let Some(x) = attrs.int("value_int")? {
        values.push(Constant::int64_scalar(x));
    }
    if let Some(x) = attrs.ints("value_ints")? {
        values.push(Constant::int64_vec(x));
    }
    if attrs.get("sparse_value").is_some() || attrs.get("value_string").is_some() {
        return Err(OpError::UnsupportedOperator(
            "Constant with string or sparse value".into(),
        ));
    }
    attrs.ignore(&["value_strings"]);

    match values.len() {
        0 => Err(OpError::attr("value", "is required")),
        1 => Ok(Box::new(ops::ConstantOp {
            value: values.remove(0),
        })),
        _ => Err(OpError::attr(
            "value",
            "exactly one value attribute must be given",
        )),
    }
}

fn read_constant_fill(attrs: &Attrs, _ctx: &ReadContext) -> ReadOpResult {
    Ok(Box::new(ops::ConstantFill {
        dtype: attrs.dtype("dtype")?.unwrap_or(DataType::Float),
        value: attrs.float("value")?.unwrap_or(0.),
        shape: attrs.ints("shape")?,
        input_as_shape: attrs.bool("input_as_shape")?.unwrap_or(false),
        extra_shape: attrs.ints("extra_shape")?.unwrap_or_default(),
    }))
}

fn read_gemm(attrs: &Attrs, _ctx: &ReadContext) -> ReadOpResult {
    attrs.ignore(&["broadcast"]);
    Ok(Box::new(ops::Gemm {
        alpha: attrs.float("alpha")?.unwrap_or(1.0),
        beta: attrs.float("beta")?.unwrap_or(1.0),
        transpose_a: attrs.bool("transA")?.unwrap_or(false),
        transpose_b: attrs.bool("transB")?.unwrap_or(false),
    }))
}

fn read_pad(attrs: &Attrs, _ctx: &ReadContext) -> ReadOpResult {
    let mode = match attrs.string("mode")? {
        Some(mode) => PadMode::parse(mode)
            .ok_or_else(|| OpError::attr("mode", format!("unsupported value \"{}\"", mode)))?,
        None => PadMode::Constant,
    };

    // Opset 1 named the attribute `paddings`.
    let pads = match attrs.ints("pads")? {
        Some(pads) => Some(pads),
        None => attrs.ints("paddings")?,
    };
    let value = attrs.float("value")?;
    Ok(Box::new(ops::Pad { mode, pads, value }))
}

fn read_softmax(attrs: &Attrs, ctx: &ReadContext, log: bool) -> ReadOpResult {
    // The default axis changed, along with the operator's semantics, in
    // opset 13.
    let default_axis = if ctx.opset < 13 { 1 } else { -1 };
    let axis = attrs.int("axis")?.unwrap_or(default_axis);
    Ok(Box::new(ops::Softmax { axis, log }))
}
