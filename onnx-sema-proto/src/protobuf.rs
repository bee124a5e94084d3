//! Low-level Protocol Buffers message codec.
//!
//! This module provides a small API for decoding [Protocol
//! Buffers](https://protobuf.dev/) messages from byte slices and encoding them
//! back. Decoders have control over which fields are read and which are
//! skipped, and the decoded values of `bytes` and `string` fields borrow from
//! the input buffer until the caller chooses to copy them.
//!
//! # Prerequisites
//!
//! To use this library, it is helpful to have an understanding of how Protocol
//! Buffers messages are encoded. See
//! <https://protobuf.dev/programming-guides/encoding/> for a guide.
//!
//! # Defining decoders and encoders
//!
//! Define a type into which a message will be deserialized and implement
//! [`DecodeMessage`] for it. `DecodeMessage` implementations use the
//! lower-level [`Fields`] iterator to visit fields of a message and update
//! fields of the returned struct.
//!
//! To serialize the same type, implement [`EncodeMessage`], which writes
//! fields in order using a [`MessageWriter`].

mod errors;
mod field;
mod message;
pub mod varint;
mod writer;

pub use errors::{ErrorKind, ProtobufError};
pub use field::{Field, FieldValue, Fields};
pub use message::DecodeMessage;
pub use writer::{EncodeMessage, MessageWriter, WireType};
