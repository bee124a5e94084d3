use std::error::Error;
use std::fmt;

use crate::protobuf::varint::VarintError;

/// Error decoding a Protocol Buffers message.
///
/// Errors record the innermost message type and field number being decoded
/// when they occurred, if known.
#[derive(Clone, Debug, PartialEq)]
pub struct ProtobufError {
    kind: ErrorKind,
    context: Option<&'static str>,
    field: Option<u64>,
}

impl ProtobufError {
    pub fn new(kind: ErrorKind) -> Self {
        ProtobufError {
            kind,
            context: None,
            field: None,
        }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Name of the message type that was being decoded.
    pub fn context(&self) -> Option<&str> {
        self.context
    }

    /// Number of the field that was being decoded.
    pub fn field(&self) -> Option<u64> {
        self.field
    }

    /// Attach a message type and field number, unless the error already has
    /// them from an embedded message.
    pub fn with_context(self, context: Option<&'static str>, field: Option<u64>) -> Self {
        if self.context.is_some() {
            return self;
        }
        ProtobufError {
            context,
            field,
            ..self
        }
    }
}

impl fmt::Display for ProtobufError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.context, self.field) {
            (Some(context), Some(field)) => {
                write!(f, "error in message {} field {}: {}", context, field, self.kind)
            }
            (Some(context), None) => write!(f, "error in message {}: {}", context, self.kind),
            _ => write!(f, "{}", self.kind),
        }
    }
}

impl Error for ProtobufError {}

impl From<VarintError> for ProtobufError {
    fn from(err: VarintError) -> Self {
        let kind = match err {
            VarintError::Eof => ErrorKind::Eof,
            VarintError::InvalidVarint => ErrorKind::InvalidVarint,
        };
        ProtobufError::new(kind)
    }
}

/// The reason a [`ProtobufError`] occurred.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A varint has more than 10 bytes, or more than 64 bits of data.
    InvalidVarint,

    /// The buffer ended in the middle of a field.
    Eof,

    /// A field was read as a type that its wire type cannot hold.
    FieldTypeMismatch,

    /// A packed field's length is not a multiple of its element size.
    FieldLengthMismatch,

    /// A field tag has wire type 6 or 7, which are unassigned.
    InvalidWireType,

    InvalidUtf8,
}

impl ErrorKind {
    fn description(&self) -> &'static str {
        match self {
            ErrorKind::InvalidVarint => "invalid varint",
            ErrorKind::Eof => "unexpected end of buffer",
            ErrorKind::FieldTypeMismatch => "field type mismatch",
            ErrorKind::FieldLengthMismatch => "field length mismatch",
            ErrorKind::InvalidWireType => "invalid wire type",
            ErrorKind::InvalidUtf8 => "invalid UTF-8 in string",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}
