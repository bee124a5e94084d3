//! Varint encoding.
//!
//! Protocol Buffers encode integer fields and field tags as little-endian
//! base-128 groups, with the high bit of each byte set on all but the last
//! byte. See <https://protobuf.dev/programming-guides/encoding/#varints>.

/// Length of the longest varint, which holds 64 bits in groups of 7.
const MAX_VARINT_LEN: usize = 10;

#[derive(Debug, PartialEq)]
pub enum VarintError {
    /// There are no bytes to read.
    Eof,

    /// The value is longer than 64 bits or is cut off by the end of the
    /// buffer.
    InvalidVarint,
}

/// Read a varint value of up to 64-bits from the start of `src`.
///
/// Returns the value and the number of bytes it occupied, which will be
/// between one and ten.
pub fn read_varint(src: &[u8]) -> Result<(u64, usize), VarintError> {
    if src.is_empty() {
        return Err(VarintError::Eof);
    }

    let mut value = 0;
    for (index, byte) in src.iter().copied().take(MAX_VARINT_LEN).enumerate() {
        let payload = (byte & 0x7f) as u64;
        value |= payload << (index * 7);
        if byte & 0x80 == 0 {
            // The tenth byte contributes only the 64th bit.
            let overflow = index + 1 == MAX_VARINT_LEN && payload > 1;
            return if overflow {
                Err(VarintError::InvalidVarint)
            } else {
                Ok((value, index + 1))
            };
        }
    }

    Err(VarintError::InvalidVarint)
}

/// Append the varint encoding of `val` to `out`.
pub fn write_varint(mut val: u64, out: &mut Vec<u8>) {
    loop {
        let byte = (val & 0x7f) as u8;
        if val <= 0x7f {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
        val >>= 7;
    }
}

/// Return the varint encoding of `val`.
pub fn encode_varint(val: u64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(MAX_VARINT_LEN);
    write_varint(val, &mut bytes);
    bytes
}
