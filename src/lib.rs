//! onnx-sema computes the element types and shapes of the values in
//! [ONNX](https://onnx.ai) models.
//!
//! It reads a serialized `ModelProto`, checks that the graph is well formed
//! and then infers the output of every node, following the semantics of the
//! [ONNX operators][onnx_operators]: broadcasting, convolution and pooling
//! geometry, reduction axes, type promotion and casts, and shape
//! manipulation. Values that are known before the graph runs, such as shape
//! computations on inputs with fixed sizes, are evaluated so that shapes
//! which depend on them can be resolved.
//!
//! # Usage
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use onnx_sema::{infer_graph, load_model_file, InferOptions};
//!
//! let graph = load_model_file("model.onnx")?;
//! graph.validate()?;
//!
//! let inferred = infer_graph(&graph, &InferOptions::with_all_ops())?;
//! for output in &graph.outputs {
//!     if let Some(info) = inferred.value(&output.name) {
//!         println!("{}: {} {:?}", output.name, info.dtype, info.shape);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Unsupported operators
//!
//! Nodes whose operator is not supported do not fail inference by default.
//! They are reported by [`InferredGraph::unsupported`], and the values
//! computed from them by [`InferredGraph::unresolved`]. See
//! [`InferOptions::skip_unknown_operators`].
//!
//! # Logging
//!
//! Inference progress is logged using [tracing](https://docs.rs/tracing).
//! The library does not install a subscriber.
//!
//! [onnx_operators]: https://onnx.ai/onnx/operators/

#[macro_use]
pub mod dim;

mod axes;
mod broadcast;
mod env;
mod error;
mod geometry;
mod infer;
mod op_registry;
mod options;

pub mod dtype;
pub mod graph;
pub mod ops;
pub mod value;

pub use dim::{Dim, SymbolGen};
pub use dtype::DataType;
pub use error::{GraphError, InferError, LoadError, OpError};
pub use geometry::{AutoPad, WindowAttrs};
pub use graph::{encode_model, load_model, load_model_file, Graph, Node, TensorDesc};
pub use infer::{infer_graph, InferredGraph, UnsupportedNode};
pub use op_registry::{Attrs, OpRegistry, ReadContext};
pub use options::InferOptions;
pub use value::{Constant, ValueInfo};
