//! Type and shape inference over a whole graph.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace, warn};

use crate::dim::{Dim, ShapeDisplay, SymbolGen};
use crate::error::{InferError, OpError};
use crate::graph::{Graph, Node, TensorDesc};
use crate::op_registry::ReadContext;
use crate::ops::{InferCtx, InferOp};
use crate::options::InferOptions;
use crate::value::ValueInfo;

/// A node that was skipped because its operator is not supported.
#[derive(Clone, Debug, PartialEq)]
pub struct UnsupportedNode {
    /// Name of the node, or of its first output if the node is unnamed.
    pub node: String,
    pub op_type: String,

    /// Description of the unsupported operator or operator variant.
    pub operator: String,
}

/// The result of inferring a graph.
#[derive(Debug, Default)]
pub struct InferredGraph {
    values: FxHashMap<String, ValueInfo>,
    unsupported: Vec<UnsupportedNode>,
    unresolved: Vec<String>,
}

impl InferredGraph {
    /// Return the inferred type, shape and value of a named value.
    ///
    /// Returns `None` if the name is unknown or the value is unresolved.
    pub fn value(&self, name: &str) -> Option<&ValueInfo> {
        self.values.get(name)
    }

    /// Iterate over resolved values, in no particular order.
    pub fn values(&self) -> impl Iterator<Item = (&str, &ValueInfo)> {
        self.values.iter().map(|(name, info)| (name.as_str(), info))
    }

    /// Nodes that were skipped because their operator is unsupported, in
    /// execution order.
    pub fn unsupported(&self) -> &[UnsupportedNode] {
        &self.unsupported
    }

    /// Names of values which could not be resolved because they depend on
    /// an unsupported node or an input without type information.
    pub fn unresolved(&self) -> &[String] {
        &self.unresolved
    }

    fn mark_unresolved<'a>(&mut self, names: impl IntoIterator<Item = &'a String>) {
        for name in names.into_iter().filter(|name| !name.is_empty()) {
            trace!(value = %name, "value is unresolved");
            self.unresolved.push(name.clone());
        }
    }
}

/// Infer the element type and shape of every value in a graph.
///
/// Nodes are visited in dependency order. Values whose contents can be
/// determined before the graph runs, such as shape computations on inputs
/// with fixed shapes, are evaluated so that shapes which depend on them can
/// be resolved.
///
/// The first operator error stops inference and is returned with the name
/// of the node that caused it. Unsupported operators are handled according
/// to [`InferOptions::skip_unknown_operators`].
pub fn infer_graph(graph: &Graph, opts: &InferOptions) -> Result<InferredGraph, InferError> {
    let mut result = InferredGraph::default();

    // Use a prefix that differs from the loader's, so generated dims cannot
    // collide with those in the graph's declared shapes.
    let mut sym_gen = SymbolGen::with_prefix("inferred".into());

    for init in &graph.initializers {
        result.values.insert(
            init.name.clone(),
            ValueInfo::from_constant(init.value.clone()),
        );
    }

    for input in &graph.inputs {
        if result.values.contains_key(&input.name) {
            continue;
        }
        match input_value(input, opts)? {
            Some(info) => {
                result.values.insert(input.name.clone(), info);
            }
            None => {
                warn!(input = %input.name, "graph input has no type or rank");
                result.mark_unresolved([&input.name]);
            }
        }
    }

    for name in opts.input_dims.keys() {
        if graph.input(name).is_none() {
            warn!(input = %name, "dims given for unknown graph input");
        }
    }

    let order = graph.topo_order().unwrap_or_else(|err| {
        warn!(%err, "nodes cannot be ordered, using declaration order");
        (0..graph.nodes.len()).collect()
    });

    let read_ctx = ReadContext { opset: graph.opset };
    let unsupported_error = |node: &Node, label: String, operator: String| {
        if opts.skip_unknown_operators {
            warn!(node = %label, op_type = %node.op_type, operator = %operator, "skipping unsupported operator");
            Ok(UnsupportedNode {
                node: label,
                op_type: node.op_type.clone(),
                operator,
            })
        } else {
            Err(InferError {
                node: label,
                op_type: node.op_type.clone(),
                error: OpError::UnsupportedOperator(operator),
            })
        }
    };

    for idx in order {
        let node = &graph.nodes[idx];
        let label = node.label(idx);

        let op: Box<dyn InferOp> = match opts.registry.read_op(node, &read_ctx) {
            Ok(op) => op,
            Err(OpError::UnsupportedOperator(operator)) => {
                let skipped = unsupported_error(node, label, operator)?;
                result.unsupported.push(skipped);
                result.mark_unresolved(&node.outputs);
                continue;
            }
            Err(error) => {
                return Err(InferError {
                    node: label,
                    op_type: node.op_type.clone(),
                    error,
                })
            }
        };

        let mut missing_inputs = false;
        let inputs: Vec<Option<&ValueInfo>> = node
            .inputs
            .iter()
            .map(|name| {
                if name.is_empty() {
                    return None;
                }
                let value = result.values.get(name);
                missing_inputs |= value.is_none();
                value
            })
            .collect();

        if missing_inputs {
            trace!(node = %label, "skipping node with unresolved inputs");
            result.mark_unresolved(&node.outputs);
            continue;
        }

        let mut ctx = InferCtx {
            sym_gen: &mut sym_gen,
            num_outputs: node.outputs.len(),
            implicit_promotion: opts.implicit_promotion,
        };
        let outputs = match op.infer(&inputs, &mut ctx) {
            Ok(outputs) => outputs,
            Err(OpError::UnsupportedOperator(operator)) => {
                let skipped = unsupported_error(node, label, operator)?;
                result.unsupported.push(skipped);
                result.mark_unresolved(&node.outputs);
                continue;
            }
            Err(error) => {
                return Err(InferError {
                    node: label,
                    op_type: node.op_type.clone(),
                    error,
                })
            }
        };

        // Trailing optional outputs which the operator does not produce.
        result.mark_unresolved(node.outputs.iter().skip(outputs.len()));

        for (name, output) in node.outputs.iter().zip(outputs) {
            if name.is_empty() {
                continue;
            }
            debug!(
                node = %label,
                op_type = %node.op_type,
                output = %name,
                dtype = %output.dtype,
                shape = %ShapeDisplay(&output.shape),
                constant = output.constant.is_some(),
                "inferred output"
            );
            result.values.insert(name.clone(), output);
        }
    }

    let unresolved_set: FxHashSet<&str> = result.unresolved.iter().map(|s| s.as_str()).collect();
    for output in &graph.outputs {
        if unresolved_set.contains(output.name.as_str()) {
            debug!(output = %output.name, "graph output is unresolved");
        }
    }

    Ok(result)
}

/// Create the value for a graph input, applying dim overrides.
///
/// Returns `None` if the input's type or rank is not declared.
fn input_value(input: &TensorDesc, opts: &InferOptions) -> Result<Option<ValueInfo>, InferError> {
    let (Some(dtype), Some(declared)) = (input.dtype, input.shape.as_ref()) else {
        return Ok(None);
    };

    let mut shape = match opts.input_dims.get(&input.name) {
        Some(dims) if dims.len() != declared.len() => {
            return Err(InferError {
                node: input.name.clone(),
                op_type: "Input".to_string(),
                error: OpError::shape(format!(
                    "input has {} dims but {} were given",
                    declared.len(),
                    dims.len()
                )),
            });
        }
        Some(dims) => dims.clone(),
        None => declared.clone(),
    };

    if let Some(size) = opts.default_dim_value {
        for dim in shape.iter_mut().filter(|dim| !dim.is_fixed()) {
            *dim = Dim::Fixed(size);
        }
    }

    Ok(Some(ValueInfo::new(dtype, shape)))
}

#[cfg(test)]
mod tests {
    use super::{infer_graph, UnsupportedNode};
    use crate::dim::Dim;
    use crate::dtype::DataType;
    use crate::error::{InferError, OpError};
    use crate::graph::{Graph, Initializer, Node, TensorDesc};
    use crate::options::InferOptions;
    use crate::value::Constant;

    fn graph(inputs: Vec<TensorDesc>, nodes: Vec<Node>, outputs: &[&str]) -> Graph {
        Graph {
            inputs,
            outputs: outputs.iter().map(|name| TensorDesc::untyped(name)).collect(),
            nodes,
            ..Default::default()
        }
    }

    fn lenient() -> InferOptions {
        let mut opts = InferOptions::with_all_ops();
        opts.skip_unknown_operators(true).implicit_promotion(false);
        opts
    }

    #[test]
    fn test_infer_graph() {
        let mut g = graph(
            vec![TensorDesc::new("x", DataType::Float, dims!["batch", 3, 4])],
            vec![
                Node::new("Mul", ["a", "scale"], ["y"]),
                Node::new("Relu", ["x"], ["a"]),
            ],
            &["y"],
        );
        g.initializers.push(Initializer {
            name: "scale".into(),
            value: Constant::float_vec(vec![1., 2., 3., 4.]),
        });

        let inferred = infer_graph(&g, &lenient()).unwrap();
        let y = inferred.value("y").unwrap();
        assert_eq!(y.dtype, DataType::Float);
        assert_eq!(y.shape, dims!["batch", 3, 4]);
        assert!(inferred.unsupported().is_empty());
        assert!(inferred.unresolved().is_empty());
        assert_eq!(inferred.values().count(), 4);
    }

    #[test]
    fn test_infer_graph_folds_shape_computations() {
        let g = graph(
            vec![
                TensorDesc::new("x", DataType::Float, dims![2, 3, 4]),
                TensorDesc::new("like", DataType::Float, dims![4, 6]),
            ],
            vec![
                Node::new("Shape", ["like"], ["s"]),
                Node::new("Reshape", ["x", "s"], ["y"]),
            ],
            &["y"],
        );
        let inferred = infer_graph(&g, &lenient()).unwrap();
        let s = inferred.value("s").unwrap();
        assert_eq!(s.constant.as_ref().map(|c| c.to_i64s()), Some(vec![4, 6]));
        assert_eq!(inferred.value("y").unwrap().shape, dims![4, 6]);
    }

    #[test]
    fn test_initializer_overrides_input() {
        let mut g = graph(
            vec![
                TensorDesc::new("x", DataType::Float, dims![3]),
                TensorDesc::new("w", DataType::Float, dims!["n"]),
            ],
            vec![Node::new("Add", ["x", "w"], ["y"])],
            &["y"],
        );
        g.initializers.push(Initializer {
            name: "w".into(),
            value: Constant::float_scalar(1.),
        });
        let inferred = infer_graph(&g, &lenient()).unwrap();
        assert_eq!(inferred.value("w").unwrap().shape, Vec::<Dim>::new());
        assert_eq!(inferred.value("y").unwrap().shape, dims![3]);
    }

    #[test]
    fn test_unsupported_operator() {
        let g = graph(
            vec![
                TensorDesc::new("0", DataType::Float, dims![2, 3, 4, 5]),
                TensorDesc::new("1", DataType::Float, dims![3, 4]),
            ],
            vec![
                Node::new("Unknown", ["0", "1"], ["2"]),
                Node::new("Unknown", ["2"], ["3"]),
                Node::new("Relu", ["3"], ["4"]),
                Node::new("Neg", ["1"], ["5"]),
            ],
            &["4", "5"],
        );

        let inferred = infer_graph(&g, &lenient()).unwrap();
        assert_eq!(
            inferred.unsupported(),
            [
                UnsupportedNode {
                    node: "2".into(),
                    op_type: "Unknown".into(),
                    operator: "Unknown".into(),
                },
                UnsupportedNode {
                    node: "3".into(),
                    op_type: "Unknown".into(),
                    operator: "Unknown".into(),
                },
            ]
        );
        assert_eq!(inferred.unresolved(), ["2", "3", "4"]);
        assert!(inferred.value("4").is_none());
        assert_eq!(inferred.value("5").unwrap().shape, dims![3, 4]);

        let mut strict = lenient();
        strict.skip_unknown_operators(false);
        let err = infer_graph(&g, &strict).err().unwrap();
        assert_eq!(
            err,
            InferError {
                node: "2".into(),
                op_type: "Unknown".into(),
                error: OpError::UnsupportedOperator("Unknown".into()),
            }
        );
    }

    #[test]
    fn test_error_names_node() {
        let g = graph(
            vec![
                TensorDesc::new("x", DataType::Float, dims![1, 3, 5]),
                TensorDesc::new("w", DataType::Float, dims![1, 3, 3]),
            ],
            vec![Node::new("Conv", ["x", "w"], ["y"])
                .with_name("conv1")
                .with_attr("strides", [1, 1])],
            &["y"],
        );
        let err = infer_graph(&g, &lenient()).err().unwrap();
        assert_eq!(err.node, "conv1");
        assert_eq!(err.op_type, "Conv");
        assert!(matches!(
            err.error,
            OpError::InvalidAttribute { ref name, .. } if name == "strides"
        ));
    }

    #[test]
    fn test_implicit_promotion() {
        let g = graph(
            vec![
                TensorDesc::new("a", DataType::Float, dims![2]),
                TensorDesc::new("b", DataType::Int32, dims![2]),
            ],
            vec![Node::new("Add", ["a", "b"], ["y"])],
            &["y"],
        );
        let err = infer_graph(&g, &lenient()).err().unwrap();
        assert!(matches!(err.error, OpError::TypeMismatch(_)));

        let mut opts = lenient();
        opts.implicit_promotion(true);
        let inferred = infer_graph(&g, &opts).unwrap();
        assert_eq!(inferred.value("y").unwrap().dtype, DataType::Float);
    }

    #[test]
    fn test_input_dims() {
        let g = graph(
            vec![TensorDesc::new("x", DataType::Float, dims!["batch", 3, "len"])],
            vec![Node::new("Relu", ["x"], ["y"])],
            &["y"],
        );

        let mut opts = lenient();
        opts.default_dim_value(Some(1));
        let inferred = infer_graph(&g, &opts).unwrap();
        assert_eq!(inferred.value("y").unwrap().shape, dims![1, 3, 1]);

        opts.input_dims("x", dims![8, 3, "len"]);
        let inferred = infer_graph(&g, &opts).unwrap();
        assert_eq!(inferred.value("y").unwrap().shape, dims![8, 3, 1]);

        opts.input_dims("x", dims![8, 3]);
        let err = infer_graph(&g, &opts).err().unwrap();
        assert!(matches!(err.error, OpError::ShapeMismatch(_)));
    }

    #[test]
    fn test_untyped_input_is_unresolved() {
        let g = graph(
            vec![TensorDesc::untyped("x")],
            vec![Node::new("Relu", ["x"], ["y"])],
            &["y"],
        );
        let inferred = infer_graph(&g, &lenient()).unwrap();
        assert_eq!(inferred.unresolved(), ["x", "y"]);
    }

    #[test]
    fn test_omitted_optional_outputs() {
        let g = graph(
            vec![TensorDesc::new("x", DataType::Float, dims![2, 2])],
            vec![Node::new("Dropout", ["x"], ["y", ""])],
            &["y"],
        );
        let inferred = infer_graph(&g, &lenient()).unwrap();
        assert_eq!(inferred.value("y").unwrap().shape, dims![2, 2]);
        assert!(inferred.unresolved().is_empty());
    }
}
