//! Error types.

use std::fmt;

use onnx_sema_proto::protobuf::ProtobufError;

/// Errors reported by an operator when inferring its outputs.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum OpError {
    /// The input shapes are incompatible with each other or with the
    /// operator's attributes.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// An input has a type the operator does not accept, or inputs that must
    /// have the same type differ.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// An attribute is missing, has an invalid value or conflicts with
    /// another attribute or input.
    #[error("invalid attribute \"{name}\": {reason}")]
    InvalidAttribute { name: String, reason: String },

    /// The operator type or operator variant is not supported.
    #[error("unsupported operator {0}")]
    UnsupportedOperator(String),

    #[error("expected {expected} inputs but got {actual}")]
    IncorrectInputCount { expected: usize, actual: usize },

    /// A required input was not provided.
    #[error("missing required input {0}")]
    MissingInput(usize),
}

impl OpError {
    pub fn attr(name: &str, reason: impl Into<String>) -> Self {
        OpError::InvalidAttribute {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub fn shape(reason: impl Into<String>) -> Self {
        OpError::ShapeMismatch(reason.into())
    }

    pub fn dtype(reason: impl Into<String>) -> Self {
        OpError::TypeMismatch(reason.into())
    }
}

/// Error which occurred when inferring the outputs of a graph node.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("in node \"{node}\" ({op_type}): {error}")]
pub struct InferError {
    /// Name of the node, or of its first output if the node is unnamed.
    pub node: String,
    pub op_type: String,
    #[source]
    pub error: OpError,
}

/// Structural problems in a graph.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum GraphError {
    /// A node input refers to a value that is not produced by any node and
    /// is not a graph input or initializer.
    #[error("node \"{node}\" input \"{input}\" is not defined")]
    DanglingInput { node: String, input: String },

    /// A value name is produced more than once.
    #[error("value \"{0}\" is produced more than once")]
    DuplicateOutput(String),

    /// A graph output is not produced by any node, input or initializer.
    #[error("graph output \"{0}\" is not defined")]
    UndefinedOutput(String),

    /// The nodes contain a dependency cycle that includes the named node.
    #[error("dependency cycle involving node \"{0}\"")]
    Cycle(String),
}

/// Errors that occur when loading a model.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The model is not a valid serialized `ModelProto`.
    #[error("failed to parse model: {0}")]
    Protobuf(#[from] ProtobufError),

    #[error("failed to read model: {0}")]
    Io(#[from] std::io::Error),

    #[error("model does not contain a graph")]
    MissingGraph,

    /// An initializer or tensor attribute could not be converted.
    #[error("invalid tensor \"{name}\": {reason}")]
    InvalidTensor { name: String, reason: String },

    /// A graph input or output has missing or unsupported type information.
    #[error("invalid value info \"{name}\": {reason}")]
    InvalidValueInfo { name: String, reason: String },
}

/// Identifies the node an error relates to, for use in messages.
pub(crate) struct NodeLabel<'a> {
    pub name: Option<&'a str>,
    pub first_output: Option<&'a str>,
    pub index: usize,
}

impl fmt::Display for NodeLabel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.name, self.first_output) {
            (Some(name), _) if !name.is_empty() => write!(f, "{}", name),
            (_, Some(output)) if !output.is_empty() => write!(f, "{}", output),
            _ => write!(f, "#{}", self.index),
        }
    }
}
