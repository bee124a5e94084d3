//! Graph model: nodes, value descriptors and initializers.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::dim::Dim;
use crate::dtype::DataType;
use crate::error::{GraphError, NodeLabel};
use crate::value::Constant;

mod encode;
mod loader;

pub use encode::{encode_model, to_model_proto};
pub use loader::{load_model, load_model_file};

/// Default opset version used when a model does not import the default
/// domain.
pub const DEFAULT_OPSET: i64 = 13;

/// Declared type and shape of a named value.
///
/// Either part may be missing, eg. for graph outputs whose types are left to
/// inference.
#[derive(Clone, Debug, PartialEq)]
pub struct TensorDesc {
    pub name: String,
    pub dtype: Option<DataType>,
    pub shape: Option<Vec<Dim>>,
}

impl TensorDesc {
    pub fn new(name: &str, dtype: DataType, shape: Vec<Dim>) -> Self {
        TensorDesc {
            name: name.to_string(),
            dtype: Some(dtype),
            shape: Some(shape),
        }
    }

    /// Create a descriptor with no type or shape.
    pub fn untyped(name: &str) -> Self {
        TensorDesc {
            name: name.to_string(),
            dtype: None,
            shape: None,
        }
    }
}

/// Value of a node attribute.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    Float(f32),
    Int(i64),
    String(String),
    Floats(Vec<f32>),
    Ints(Vec<i64>),
    Strings(Vec<String>),
    Tensor(Constant),
}

impl AttrValue {
    /// Name of the attribute kind, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            AttrValue::Float(_) => "float",
            AttrValue::Int(_) => "int",
            AttrValue::String(_) => "string",
            AttrValue::Floats(_) => "floats",
            AttrValue::Ints(_) => "ints",
            AttrValue::Strings(_) => "strings",
            AttrValue::Tensor(_) => "tensor",
        }
    }
}

macro_rules! impl_attr_from {
    ($type:ty, $variant:ident) => {
        impl From<$type> for AttrValue {
            fn from(val: $type) -> AttrValue {
                AttrValue::$variant(val)
            }
        }
    };
}

impl_attr_from!(f32, Float);
impl_attr_from!(i64, Int);
impl_attr_from!(String, String);
impl_attr_from!(Vec<f32>, Floats);
impl_attr_from!(Vec<i64>, Ints);
impl_attr_from!(Vec<String>, Strings);
impl_attr_from!(Constant, Tensor);

impl From<&str> for AttrValue {
    fn from(val: &str) -> AttrValue {
        AttrValue::String(val.to_string())
    }
}

impl<const N: usize> From<[i64; N]> for AttrValue {
    fn from(val: [i64; N]) -> AttrValue {
        AttrValue::Ints(val.into())
    }
}

impl<const N: usize> From<[f32; N]> for AttrValue {
    fn from(val: [f32; N]) -> AttrValue {
        AttrValue::Floats(val.into())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: AttrValue,
}

/// An operator invocation in a graph.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub name: Option<String>,
    pub op_type: String,

    /// Operator domain. `None` or an empty string is the default ONNX domain.
    pub domain: Option<String>,

    /// Names of input values. An empty string is an omitted optional input.
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub attrs: Vec<Attribute>,
}

impl Node {
    pub fn new<'a>(
        op_type: &str,
        inputs: impl IntoIterator<Item = &'a str>,
        outputs: impl IntoIterator<Item = &'a str>,
    ) -> Node {
        Node {
            name: None,
            op_type: op_type.to_string(),
            domain: None,
            inputs: inputs.into_iter().map(|s| s.to_string()).collect(),
            outputs: outputs.into_iter().map(|s| s.to_string()).collect(),
            attrs: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: &str) -> Node {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_domain(mut self, domain: &str) -> Node {
        self.domain = Some(domain.to_string());
        self
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<AttrValue>) -> Node {
        self.attrs.push(Attribute {
            name: name.to_string(),
            value: value.into(),
        });
        self
    }

    /// Look up an attribute by name.
    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| &attr.value)
    }

    /// Return true if the node uses the default ONNX operator domain.
    pub fn is_default_domain(&self) -> bool {
        matches!(self.domain.as_deref(), None | Some("") | Some("ai.onnx"))
    }

    pub(crate) fn label(&self, index: usize) -> String {
        NodeLabel {
            name: self.name.as_deref(),
            first_output: self.outputs.first().map(|s| s.as_str()),
            index,
        }
        .to_string()
    }
}

/// A constant value bound to a name in the graph.
#[derive(Clone, Debug, PartialEq)]
pub struct Initializer {
    pub name: String,
    pub value: Constant,
}

/// A computation graph loaded from a model.
///
/// Nodes may be listed in any order. Use [`Graph::topo_order`] to get an
/// execution order.
#[derive(Clone, Debug, PartialEq)]
pub struct Graph {
    pub name: Option<String>,
    pub nodes: Vec<Node>,
    pub inputs: Vec<TensorDesc>,
    pub outputs: Vec<TensorDesc>,
    pub value_info: Vec<TensorDesc>,
    pub initializers: Vec<Initializer>,

    /// Opset version of the default ONNX domain.
    pub opset: i64,
}

impl Default for Graph {
    fn default() -> Self {
        Graph {
            name: None,
            nodes: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            value_info: Vec::new(),
            initializers: Vec::new(),
            opset: DEFAULT_OPSET,
        }
    }
}

impl Graph {
    pub fn new() -> Graph {
        Graph::default()
    }

    /// Find an initializer by name.
    pub fn initializer(&self, name: &str) -> Option<&Initializer> {
        self.initializers.iter().find(|init| init.name == name)
    }

    /// Find the descriptor of a graph input by name.
    pub fn input(&self, name: &str) -> Option<&TensorDesc> {
        self.inputs.iter().find(|input| input.name == name)
    }

    /// Return the names of values which are available before any node runs.
    fn source_names(&self) -> FxHashSet<&str> {
        self.inputs
            .iter()
            .map(|i| i.name.as_str())
            .chain(self.initializers.iter().map(|i| i.name.as_str()))
            .collect()
    }

    /// Map of value name to the index of the node that produces it.
    fn producers(&self) -> Result<FxHashMap<&str, usize>, GraphError> {
        let sources = self.source_names();
        let mut producers = FxHashMap::default();
        for (i, node) in self.nodes.iter().enumerate() {
            for output in node.outputs.iter().filter(|o| !o.is_empty()) {
                if sources.contains(output.as_str())
                    || producers.insert(output.as_str(), i).is_some()
                {
                    return Err(GraphError::DuplicateOutput(output.clone()));
                }
            }
        }
        Ok(producers)
    }

    /// Check that every value referenced by a node or graph output is
    /// defined exactly once, and that the nodes form a DAG.
    pub fn validate(&self) -> Result<(), GraphError> {
        let sources = self.source_names();
        let producers = self.producers()?;
        let is_defined =
            |name: &str| sources.contains(name) || producers.contains_key(name);

        for (i, node) in self.nodes.iter().enumerate() {
            for input in node.inputs.iter().filter(|i| !i.is_empty()) {
                if !is_defined(input) {
                    return Err(GraphError::DanglingInput {
                        node: node.label(i),
                        input: input.clone(),
                    });
                }
            }
        }

        for output in &self.outputs {
            if !is_defined(&output.name) {
                return Err(GraphError::UndefinedOutput(output.name.clone()));
            }
        }

        self.topo_order().map(|_| ())
    }

    /// Return node indices in an order where each node comes after the nodes
    /// that produce its inputs.
    ///
    /// Among nodes whose inputs are all available, the one declared first is
    /// chosen, so a graph which is already sorted keeps its order. Inputs
    /// which no node produces are treated as available.
    pub fn topo_order(&self) -> Result<Vec<usize>, GraphError> {
        let producers = self.producers()?;

        let mut pending_deps = vec![0usize; self.nodes.len()];
        let mut consumers: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];

        for (i, node) in self.nodes.iter().enumerate() {
            let mut deps: Vec<usize> = node
                .inputs
                .iter()
                .filter_map(|input| producers.get(input.as_str()).copied())
                .collect();
            deps.sort();
            deps.dedup();
            pending_deps[i] = deps.len();
            for dep in deps {
                consumers[dep].push(i);
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = pending_deps
            .iter()
            .enumerate()
            .filter(|(_, count)| **count == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse(i)) = ready.pop() {
            order.push(i);
            for &consumer in &consumers[i] {
                pending_deps[consumer] -= 1;
                if pending_deps[consumer] == 0 {
                    ready.push(Reverse(consumer));
                }
            }
        }

        if order.len() < self.nodes.len() {
            let stuck = pending_deps
                .iter()
                .position(|&count| count > 0)
                .unwrap_or_default();
            return Err(GraphError::Cycle(self.nodes[stuck].label(stuck)));
        }

        Ok(order)
    }
}
