use crate::protobuf::errors::{ErrorKind, ProtobufError};
use crate::protobuf::message::DecodeMessage;
use crate::protobuf::varint::read_varint;

/// Value of a field, tagged by its wire type.
///
/// See <https://protobuf.dev/programming-guides/encoding/#structure>.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum FieldValue<'a> {
    /// Variable-width integer.
    Varint(u64),

    /// Little-endian 8 byte value (`fixed64`, `sfixed64`, `double`).
    I64(i64),

    /// A variable-length value. This borrows the field's bytes from the
    /// message buffer.
    Len(&'a [u8]),

    /// Start of a group. Groups are deprecated and never used by ONNX.
    Sgroup,

    /// End of a group.
    Egroup,

    /// Little-endian 4 byte value (`fixed32`, `sfixed32`, `float`).
    I32(i32),
}

/// A single field of a message.
///
/// Produced by the [`Fields`] iterator over a message buffer.
///
/// Fields have a number and a value. Variable-length values (bytes, string,
/// embedded message, packed repeated field) borrow from the buffer being
/// decoded. Fields which are not of interest can simply be ignored.
///
/// # Repeated fields
///
/// A repeated scalar field is either written once per element, or packed
/// into a single length-delimited field. The `read_repeated_*` methods accept
/// either form and iterate over the one value or the packed values.
#[derive(Copy, Clone, Debug)]
pub struct Field<'a> {
    number: u64,
    value: FieldValue<'a>,

    /// Message type, used in error messages.
    context: Option<&'static str>,
}

impl<'a> Field<'a> {
    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn value(&self) -> FieldValue<'a> {
        self.value
    }

    /// Read a `bytes` field, borrowing from the message buffer.
    pub fn read_bytes(&self) -> Result<&'a [u8], ProtobufError> {
        match self.value {
            FieldValue::Len(bytes) => Ok(bytes),
            _ => Err(self.error(ErrorKind::FieldTypeMismatch)),
        }
    }

    pub fn read_string(&self) -> Result<&'a str, ProtobufError> {
        let bytes = self.read_bytes()?;
        std::str::from_utf8(bytes).map_err(|_| self.error(ErrorKind::InvalidUtf8))
    }

    /// Decode the embedded message in this field.
    pub fn read_message<M: DecodeMessage>(&self) -> Result<M, ProtobufError> {
        let bytes = self.read_bytes()?;
        M::decode(bytes).map_err(|err| err.with_context(self.context, Some(self.number)))
    }

    fn get_varint(&self) -> Result<u64, ProtobufError> {
        match self.value {
            FieldValue::Varint(val) => Ok(val),
            _ => Err(self.error(ErrorKind::FieldTypeMismatch)),
        }
    }

    pub fn get_int32(&self) -> Result<i32, ProtobufError> {
        self.get_varint().map(|val| val as i32)
    }

    /// Read an enum field as its numeric value.
    pub fn get_enum(&self) -> Result<i32, ProtobufError> {
        self.get_int32()
    }

    pub fn get_int64(&self) -> Result<i64, ProtobufError> {
        self.get_varint().map(|val| val as i64)
    }

    pub fn get_float(&self) -> Result<f32, ProtobufError> {
        match self.value {
            FieldValue::I32(val) => Ok(f32::from_le_bytes(val.to_le_bytes())),
            _ => Err(self.error(ErrorKind::FieldTypeMismatch)),
        }
    }

    pub fn read_repeated_int32(
        &self,
    ) -> Result<impl Iterator<Item = Result<i32, ProtobufError>> + 'a, ProtobufError> {
        self.read_repeated_varint(|x| x as i32)
    }

    pub fn read_repeated_int64(
        &self,
    ) -> Result<impl Iterator<Item = Result<i64, ProtobufError>> + 'a, ProtobufError> {
        self.read_repeated_varint(|x| x as i64)
    }

    pub fn read_repeated_uint64(
        &self,
    ) -> Result<impl Iterator<Item = Result<u64, ProtobufError>> + 'a, ProtobufError> {
        self.read_repeated_varint(|x| x)
    }

    /// Read the values of a `repeated float` field.
    pub fn read_repeated_float(
        &self,
    ) -> Result<impl Iterator<Item = Result<f32, ProtobufError>> + 'a, ProtobufError> {
        self.read_repeated_fixed(4, |val| match val {
            FieldValue::I32(val) => Some(f32::from_le_bytes(val.to_le_bytes())),
            _ => None,
        })
    }

    pub fn read_repeated_double(
        &self,
    ) -> Result<impl Iterator<Item = Result<f64, ProtobufError>> + 'a, ProtobufError> {
        self.read_repeated_fixed(8, |val| match val {
            FieldValue::I64(val) => Some(f64::from_le_bytes(val.to_le_bytes())),
            _ => None,
        })
    }

    fn read_repeated_varint<T: Copy + 'a>(
        &self,
        from_u64: impl Fn(u64) -> T + 'a,
    ) -> Result<Repeated<T, impl Iterator<Item = Result<T, ProtobufError>> + 'a>, ProtobufError>
    {
        let repeated = match self.value {
            FieldValue::Varint(val) => Repeated::Unpacked(Some(from_u64(val))),
            FieldValue::Len(mut bytes) => {
                let context = self.context;
                let number = self.number;
                let iter = std::iter::from_fn(move || {
                    if bytes.is_empty() {
                        return None;
                    }
                    match read_varint(bytes) {
                        Ok((val, len)) => {
                            bytes = &bytes[len..];
                            Some(Ok(from_u64(val)))
                        }
                        Err(err) => {
                            bytes = &[];
                            Some(Err(
                                ProtobufError::from(err).with_context(context, Some(number))
                            ))
                        }
                    }
                });
                Repeated::Packed(iter)
            }
            _ => {
                return Err(self.error(ErrorKind::FieldTypeMismatch));
            }
        };
        Ok(repeated)
    }

    /// Get the value of a repeated fixed-width scalar field.
    ///
    /// `convert` maps an unpacked value to an element, returning `None` if
    /// the wire type is not the one for this element type.
    fn read_repeated_fixed<T: Copy + 'a>(
        &self,
        width: usize,
        convert: impl Fn(FieldValue<'a>) -> Option<T> + 'a,
    ) -> Result<Repeated<T, impl Iterator<Item = Result<T, ProtobufError>> + 'a>, ProtobufError>
    {
        let repeated = match self.value {
            FieldValue::Len(bytes) => {
                if bytes.len() % width != 0 {
                    return Err(self.error(ErrorKind::FieldLengthMismatch));
                }
                let context = self.context;
                let number = self.number;
                let iter = bytes.chunks_exact(width).map(move |chunk| {
                    fixed_value(chunk).and_then(&convert).ok_or_else(|| {
                        ProtobufError::new(ErrorKind::FieldTypeMismatch)
                            .with_context(context, Some(number))
                    })
                });
                Repeated::Packed(iter)
            }
            value => match convert(value) {
                Some(elem) => Repeated::Unpacked(Some(elem)),
                None => return Err(self.error(ErrorKind::FieldTypeMismatch)),
            },
        };
        Ok(repeated)
    }

    fn error(&self, kind: ErrorKind) -> ProtobufError {
        ProtobufError::new(kind).with_context(self.context, Some(self.number))
    }
}

/// Convert a little-endian element of a packed field into the value it would
/// have as an unpacked field.
fn fixed_value<'a>(chunk: &[u8]) -> Option<FieldValue<'a>> {
    if let Ok(bytes) = <[u8; 4]>::try_from(chunk) {
        Some(FieldValue::I32(i32::from_le_bytes(bytes)))
    } else if let Ok(bytes) = <[u8; 8]>::try_from(chunk) {
        Some(FieldValue::I64(i64::from_le_bytes(bytes)))
    } else {
        None
    }
}

/// Iterator over a repeated scalar field.
///
/// Repeated scalar fields may use either a packed or un-packed representation.
/// See https://protobuf.dev/programming-guides/encoding/#repeated.
enum Repeated<T: Copy, I: Iterator<Item = Result<T, ProtobufError>>> {
    Unpacked(Option<T>),
    Packed(I),
}

impl<T: Copy, I: Iterator<Item = Result<T, ProtobufError>>> Iterator for Repeated<T, I> {
    type Item = Result<T, ProtobufError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Unpacked(val) => val.take().map(Ok),
            Self::Packed(packed) => packed.next(),
        }
    }
}

/// Iterator over fields of a message.
///
/// ```
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use onnx_sema_proto::protobuf::Fields;
///
/// // A minimal but valid message.
/// let message = [0x08, 0x96, 0x01];
///
/// for field in Fields::new(&message, None) {
///     let field = field?;
///     assert_eq!(field.number(), 1);
///     assert_eq!(field.get_int64()?, 150);
/// }
/// # Ok(()) }
/// ```
///
/// After an error is returned, the iterator is exhausted.
pub struct Fields<'a> {
    buf: &'a [u8],

    /// Debug name of the message type.
    context: Option<&'static str>,
}

impl<'a> Fields<'a> {
    /// Iterate over the fields of the message encoded in `buf`.
    ///
    /// `context` is the name of the message type being read, for debugging
    /// purposes.
    pub fn new(buf: &'a [u8], context: Option<&'static str>) -> Self {
        Self { buf, context }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ProtobufError> {
        if len > self.buf.len() {
            return Err(ProtobufError::new(ErrorKind::Eof));
        }
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    fn take_varint(&mut self) -> Result<u64, ProtobufError> {
        let (val, len) = read_varint(self.buf)?;
        self.buf = &self.buf[len..];
        Ok(val)
    }

    fn read_field(&mut self) -> Result<Field<'a>, ProtobufError> {
        let tag = self.take_varint()?;
        let number = tag >> 3;
        let wire_type = tag & 0x7;

        let value = match wire_type {
            0 => self.take_varint().map(FieldValue::Varint),
            1 => self.take(8).map(|bytes| {
                let mut buf = [0; 8];
                buf.copy_from_slice(bytes);
                FieldValue::I64(i64::from_le_bytes(buf))
            }),
            2 => self.take_varint().and_then(|len| {
                let len = usize::try_from(len).map_err(|_| ProtobufError::new(ErrorKind::Eof))?;
                self.take(len).map(FieldValue::Len)
            }),
            3 => Ok(FieldValue::Sgroup),
            4 => Ok(FieldValue::Egroup),
            5 => self.take(4).map(|bytes| {
                let mut buf = [0; 4];
                buf.copy_from_slice(bytes);
                FieldValue::I32(i32::from_le_bytes(buf))
            }),
            _ => Err(ProtobufError::new(ErrorKind::InvalidWireType)),
        }
        .map_err(|err| err.with_context(self.context, Some(number)))?;

        Ok(Field {
            number,
            value,
            context: self.context,
        })
    }
}

impl<'a> Iterator for Fields<'a> {
    type Item = Result<Field<'a>, ProtobufError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.is_empty() {
            return None;
        }
        let field = self.read_field();
        if field.is_err() {
            self.buf = &[];
        }
        Some(field)
    }
}
