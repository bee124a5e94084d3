use crate::protobuf::varint::write_varint;

/// Wire types for encoded fields.
///
/// See <https://protobuf.dev/programming-guides/encoding/#structure>.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum WireType {
    Varint = 0,
    I64 = 1,
    Len = 2,
    Sgroup = 3,
    Egroup = 4,
    I32 = 5,
}

/// Builds the serialized form of a message one field at a time.
///
/// Fields are written in the order the methods are called. Repeated scalar
/// fields can be written either as one field per element, or packed with the
/// `write_packed_*` methods.
#[derive(Default)]
pub struct MessageWriter {
    buf: Vec<u8>,
}

impl MessageWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the writer and return the encoded message.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_tag(&mut self, number: u64, wire_type: WireType) {
        write_varint((number << 3) | wire_type as u64, &mut self.buf);
    }

    /// Write a field with a raw varint value.
    pub fn write_varint(&mut self, number: u64, val: u64) {
        self.write_tag(number, WireType::Varint);
        write_varint(val, &mut self.buf);
    }

    pub fn write_int64(&mut self, number: u64, val: i64) {
        self.write_varint(number, val as u64);
    }

    /// Write an `int32` field.
    ///
    /// Negative values are sign-extended to 64 bits, as the Protocol Buffers
    /// encoding requires.
    pub fn write_int32(&mut self, number: u64, val: i32) {
        self.write_varint(number, val as i64 as u64);
    }

    pub fn write_enum(&mut self, number: u64, val: i32) {
        self.write_int32(number, val);
    }

    pub fn write_fixed32(&mut self, number: u64, bytes: [u8; 4]) {
        self.write_tag(number, WireType::I32);
        self.buf.extend_from_slice(&bytes);
    }

    pub fn write_fixed64(&mut self, number: u64, bytes: [u8; 8]) {
        self.write_tag(number, WireType::I64);
        self.buf.extend_from_slice(&bytes);
    }

    pub fn write_float(&mut self, number: u64, val: f32) {
        self.write_fixed32(number, val.to_le_bytes());
    }

    pub fn write_double(&mut self, number: u64, val: f64) {
        self.write_fixed64(number, val.to_le_bytes());
    }

    pub fn write_bytes(&mut self, number: u64, bytes: &[u8]) {
        self.write_tag(number, WireType::Len);
        write_varint(bytes.len() as u64, &mut self.buf);
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_string(&mut self, number: u64, val: &str) {
        self.write_bytes(number, val.as_bytes());
    }

    /// Write an embedded message.
    pub fn write_message<M: EncodeMessage>(&mut self, number: u64, msg: &M) {
        let bytes = msg.encode();
        self.write_bytes(number, &bytes);
    }

    pub fn write_packed_int32(&mut self, number: u64, vals: &[i32]) {
        let mut packed = Vec::new();
        for &val in vals {
            write_varint(val as i64 as u64, &mut packed);
        }
        self.write_bytes(number, &packed);
    }

    pub fn write_packed_int64(&mut self, number: u64, vals: &[i64]) {
        let mut packed = Vec::new();
        for &val in vals {
            write_varint(val as u64, &mut packed);
        }
        self.write_bytes(number, &packed);
    }

    pub fn write_packed_uint64(&mut self, number: u64, vals: &[u64]) {
        let mut packed = Vec::new();
        for &val in vals {
            write_varint(val, &mut packed);
        }
        self.write_bytes(number, &packed);
    }

    pub fn write_packed_float(&mut self, number: u64, vals: &[f32]) {
        let packed: Vec<u8> = vals.iter().flat_map(|x| x.to_le_bytes()).collect();
        self.write_bytes(number, &packed);
    }

    pub fn write_packed_double(&mut self, number: u64, vals: &[f64]) {
        let packed: Vec<u8> = vals.iter().flat_map(|x| x.to_le_bytes()).collect();
        self.write_bytes(number, &packed);
    }
}

/// Trait for serializing a struct as a Protocol Buffers message.
pub trait EncodeMessage {
    /// Write the fields of this message.
    fn encode_fields(&self, writer: &mut MessageWriter);

    /// Serialize this message.
    fn encode(&self) -> Vec<u8> {
        let mut writer = MessageWriter::new();
        self.encode_fields(&mut writer);
        writer.into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::{MessageWriter, WireType};

    #[test]
    fn test_write_fields() {
        // Examples from https://protobuf.dev/programming-guides/encoding/.
        let mut writer = MessageWriter::new();
        writer.write_int32(1, 150);
        assert_eq!(writer.into_bytes(), [0x08, 0x96, 0x01]);

        let mut writer = MessageWriter::new();
        writer.write_string(2, "testing");
        assert_eq!(
            writer.into_bytes(),
            [0x12, 0x07, 0x74, 0x65, 0x73, 0x74, 0x69, 0x6e, 0x67]
        );

        let mut writer = MessageWriter::new();
        writer.write_packed_int32(4, &[3, 270, 86942]);
        assert_eq!(
            writer.into_bytes(),
            [0x22, 0x06, 0x03, 0x8e, 0x02, 0x9e, 0xa7, 0x05]
        );
    }

    #[test]
    fn test_write_negative_int() {
        let mut writer = MessageWriter::new();
        writer.write_int32(1, -1);
        let bytes = writer.into_bytes();

        // Tag plus a 10-byte varint.
        assert_eq!(bytes.len(), 11);
        assert_eq!(bytes[0], 0x08);
        assert_eq!(bytes[10], 0x01);
    }

    #[test]
    fn test_write_tag() {
        let mut writer = MessageWriter::new();
        writer.write_tag(3, WireType::Egroup);
        assert_eq!(writer.into_bytes(), [(3 << 3) | 4]);
    }
}
