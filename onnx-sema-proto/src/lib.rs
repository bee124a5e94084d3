//! Reader and writer for [ONNX][onnx] model files.
//!
//! ONNX models are [Protocol Buffers][protobuf] messages using the
//! `ModelProto` schema from
//! [onnx.proto](https://github.com/onnx/onnx/blob/main/onnx/onnx.proto3).
//!
//! This crate decodes the parts of that schema which describe a model's
//! graph: nodes, attributes, value types and initializers. It can also encode
//! the same messages, which is used to build test models in memory without
//! depending on the Python `onnx` package.
//!
//! # Usage
//!
//! To read a model from a buffer:
//!
//! ```no_run
//! use onnx_sema_proto::onnx::ModelProto;
//! use onnx_sema_proto::protobuf::DecodeMessage;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let buffer = std::fs::read("model.onnx")?;
//! let model = ModelProto::decode(&buffer)?;
//! let node_count = model.graph.as_ref().map(|g| g.node.len()).unwrap_or(0);
//! println!("Model has {} operators", node_count);
//! # Ok(()) }
//! ```
//!
//! To write one:
//!
//! ```
//! use onnx_sema_proto::onnx::{GraphProto, ModelProto};
//! use onnx_sema_proto::protobuf::{DecodeMessage, EncodeMessage};
//!
//! let mut model = ModelProto::default();
//! model.ir_version = Some(8);
//! model.graph = Some(GraphProto::default());
//!
//! let bytes = model.encode();
//! let decoded = ModelProto::decode(&bytes).unwrap();
//! assert_eq!(decoded.ir_version, Some(8));
//! ```
//!
//! [onnx]: https://onnx.ai/onnx/
//! [protobuf]: https://protobuf.dev/

// This is a crate for parsing potentially untrusted files, so it is preferable
// to avoid unsafe code.
#![forbid(unsafe_code)]

pub mod onnx;
pub mod protobuf;
