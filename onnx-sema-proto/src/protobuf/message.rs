use crate::protobuf::errors::ProtobufError;
use crate::protobuf::field::Fields;

/// Trait for deserializing a Protocol Buffers message into a struct.
///
/// Implementations visit the fields of the message using the [`Fields`]
/// iterator and update the returned struct. Fields which are not recognized
/// should be ignored.
///
/// ```
/// use onnx_sema_proto::protobuf::{DecodeMessage, Fields, ProtobufError};
///
/// #[derive(Default)]
/// struct Point {
///     x: i64,
///     y: i64,
/// }
///
/// impl DecodeMessage for Point {
///     fn decode_fields(fields: Fields) -> Result<Self, ProtobufError> {
///         let mut msg = Self::default();
///         for field in fields {
///             let field = field?;
///             match field.number() {
///                 1 => msg.x = field.get_int64()?,
///                 2 => msg.y = field.get_int64()?,
///                 _ => {}
///             }
///         }
///         Ok(msg)
///     }
/// }
///
/// let point = Point::decode(&[0x08, 0x03, 0x10, 0x04]).unwrap();
/// assert_eq!((point.x, point.y), (3, 4));
/// ```
pub trait DecodeMessage: Sized {
    /// Decode a message from a buffer.
    fn decode(buf: &[u8]) -> Result<Self, ProtobufError> {
        Self::decode_fields(Fields::new(buf, Some(Self::type_name())))
    }

    /// Decode a message from an iterator over its fields.
    fn decode_fields(fields: Fields) -> Result<Self, ProtobufError>;

    /// Name of the message type, used in error messages.
    fn type_name() -> &'static str {
        let name = std::any::type_name::<Self>();
        name.rsplit("::").next().unwrap_or(name)
    }
}
