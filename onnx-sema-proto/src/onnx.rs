//! ONNX model Protocol Buffers types.
//!
//! The types in this module correspond to Protocol Buffers messages defined
//! in [onnx.proto](https://github.com/onnx/onnx/blob/main/onnx/onnx.proto3).
//! See the `.proto` file for detailed information on each type and field.
//!
//! These types are not complete. They only contain messages and fields which
//! are needed to describe a model's graph and the types of its values.

use crate::protobuf::{DecodeMessage, EncodeMessage, Fields, MessageWriter, ProtobufError};

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct AttributeType(pub i32);

impl AttributeType {
    pub const UNDEFINED: Self = Self(0);
    pub const FLOAT: Self = Self(1);
    pub const INT: Self = Self(2);
    pub const STRING: Self = Self(3);
    pub const TENSOR: Self = Self(4);
    pub const GRAPH: Self = Self(5);
    pub const FLOATS: Self = Self(6);
    pub const INTS: Self = Self(7);
    pub const STRINGS: Self = Self(8);
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AttributeProto {
    pub name: Option<String>,
    pub f: Option<f32>,
    pub s: Option<Vec<u8>>,
    pub i: Option<i64>,
    pub g: Option<GraphProto>,
    pub t: Option<TensorProto>,
    pub floats: Vec<f32>,
    pub ints: Vec<i64>,
    pub strings: Vec<Vec<u8>>,
    pub r#type: Option<AttributeType>,
}

impl AttributeProto {
    const NAME: u64 = 1;
    const F: u64 = 2;
    const I: u64 = 3;
    const S: u64 = 4;
    const T: u64 = 5;
    const G: u64 = 6;
    const FLOATS: u64 = 7;
    const INTS: u64 = 8;
    const STRINGS: u64 = 9;
    const TYPE: u64 = 20;
}

impl DecodeMessage for AttributeProto {
    fn decode_fields(fields: Fields) -> Result<Self, ProtobufError> {
        let mut msg = Self::default();
        for field in fields {
            let field = field?;
            match field.number() {
                Self::NAME => {
                    msg.name = Some(field.read_string()?.to_string());
                }
                Self::F => {
                    msg.f = Some(field.get_float()?);
                }
                Self::S => {
                    msg.s = Some(field.read_bytes()?.to_vec());
                }
                Self::I => {
                    msg.i = Some(field.get_int64()?);
                }
                Self::G => {
                    msg.g = Some(field.read_message()?);
                }
                Self::T => {
                    msg.t = Some(field.read_message()?);
                }
                Self::FLOATS => {
                    for float in field.read_repeated_float()? {
                        msg.floats.push(float?);
                    }
                }
                Self::INTS => {
                    for int in field.read_repeated_int64()? {
                        msg.ints.push(int?);
                    }
                }
                Self::STRINGS => {
                    msg.strings.push(field.read_bytes()?.to_vec());
                }
                Self::TYPE => {
                    msg.r#type = Some(AttributeType(field.get_enum()?));
                }
                _ => {}
            }
        }
        Ok(msg)
    }
}

impl EncodeMessage for AttributeProto {
    fn encode_fields(&self, writer: &mut MessageWriter) {
        if let Some(name) = &self.name {
            writer.write_string(Self::NAME, name);
        }
        if let Some(f) = self.f {
            writer.write_float(Self::F, f);
        }
        if let Some(i) = self.i {
            writer.write_int64(Self::I, i);
        }
        if let Some(s) = &self.s {
            writer.write_bytes(Self::S, s);
        }
        if let Some(t) = &self.t {
            writer.write_message(Self::T, t);
        }
        if let Some(g) = &self.g {
            writer.write_message(Self::G, g);
        }
        if !self.floats.is_empty() {
            writer.write_packed_float(Self::FLOATS, &self.floats);
        }
        if !self.ints.is_empty() {
            writer.write_packed_int64(Self::INTS, &self.ints);
        }
        for s in &self.strings {
            writer.write_bytes(Self::STRINGS, s);
        }
        if let Some(ty) = self.r#type {
            writer.write_enum(Self::TYPE, ty.0);
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeProto {
    pub name: Option<String>,
    pub input: Vec<String>,
    pub output: Vec<String>,
    pub op_type: Option<String>,
    pub domain: Option<String>,
    pub attribute: Vec<AttributeProto>,
}

impl NodeProto {
    const INPUT: u64 = 1;
    const OUTPUT: u64 = 2;
    const NAME: u64 = 3;
    const OP_TYPE: u64 = 4;
    const ATTRIBUTE: u64 = 5;
    const DOMAIN: u64 = 7;
}

impl DecodeMessage for NodeProto {
    fn decode_fields(fields: Fields) -> Result<Self, ProtobufError> {
        let mut msg = Self::default();
        for field in fields {
            let field = field?;
            match field.number() {
                Self::INPUT => {
                    msg.input.push(field.read_string()?.to_string());
                }
                Self::OUTPUT => {
                    msg.output.push(field.read_string()?.to_string());
                }
                Self::NAME => {
                    msg.name = Some(field.read_string()?.to_string());
                }
                Self::OP_TYPE => {
                    msg.op_type = Some(field.read_string()?.to_string());
                }
                Self::ATTRIBUTE => {
                    msg.attribute.push(field.read_message()?);
                }
                Self::DOMAIN => {
                    msg.domain = Some(field.read_string()?.to_string());
                }
                _ => {}
            }
        }
        Ok(msg)
    }
}

impl EncodeMessage for NodeProto {
    fn encode_fields(&self, writer: &mut MessageWriter) {
        for input in &self.input {
            writer.write_string(Self::INPUT, input);
        }
        for output in &self.output {
            writer.write_string(Self::OUTPUT, output);
        }
        if let Some(name) = &self.name {
            writer.write_string(Self::NAME, name);
        }
        if let Some(op_type) = &self.op_type {
            writer.write_string(Self::OP_TYPE, op_type);
        }
        for attr in &self.attribute {
            writer.write_message(Self::ATTRIBUTE, attr);
        }
        if let Some(domain) = &self.domain {
            writer.write_string(Self::DOMAIN, domain);
        }
    }
}

#[derive(Clone, Default, PartialEq)]
pub struct TensorProto {
    pub dims: Vec<i64>,
    pub data_type: Option<DataType>,
    pub float_data: Vec<f32>,
    pub int32_data: Vec<i32>,
    pub int64_data: Vec<i64>,
    pub double_data: Vec<f64>,
    pub uint64_data: Vec<u64>,

    /// Field containing tensor data as bytes in packed little-endian order.
    pub raw_data: Option<Vec<u8>>,

    pub name: Option<String>,
}

impl TensorProto {
    const DIMS: u64 = 1;
    const DATA_TYPE: u64 = 2;
    const FLOAT_DATA: u64 = 4;
    const INT32_DATA: u64 = 5;
    const INT64_DATA: u64 = 7;
    const NAME: u64 = 8;
    const RAW_DATA: u64 = 9;
    const DOUBLE_DATA: u64 = 10;
    const UINT64_DATA: u64 = 11;
}

impl std::fmt::Debug for TensorProto {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("TensorProto")
            .field("dims", &self.dims)
            .field("data_type", &self.data_type)
            .field("name", &self.name)
            .finish()
    }
}

impl DecodeMessage for TensorProto {
    fn decode_fields(fields: Fields) -> Result<Self, ProtobufError> {
        let mut msg = TensorProto::default();
        for field in fields {
            let field = field?;
            match field.number() {
                Self::DIMS => {
                    for dim in field.read_repeated_int64()? {
                        msg.dims.push(dim?);
                    }
                }
                Self::DATA_TYPE => {
                    msg.data_type = Some(DataType(field.get_enum()?));
                }
                Self::FLOAT_DATA => {
                    for float in field.read_repeated_float()? {
                        msg.float_data.push(float?);
                    }
                }
                Self::INT32_DATA => {
                    for int32 in field.read_repeated_int32()? {
                        msg.int32_data.push(int32?);
                    }
                }
                Self::INT64_DATA => {
                    for int64 in field.read_repeated_int64()? {
                        msg.int64_data.push(int64?);
                    }
                }
                Self::DOUBLE_DATA => {
                    for double in field.read_repeated_double()? {
                        msg.double_data.push(double?);
                    }
                }
                Self::UINT64_DATA => {
                    for uint64 in field.read_repeated_uint64()? {
                        msg.uint64_data.push(uint64?);
                    }
                }
                Self::NAME => {
                    msg.name = Some(field.read_string()?.to_string());
                }
                Self::RAW_DATA => {
                    msg.raw_data = Some(field.read_bytes()?.to_vec());
                }
                _ => {}
            }
        }
        Ok(msg)
    }
}

impl EncodeMessage for TensorProto {
    fn encode_fields(&self, writer: &mut MessageWriter) {
        if !self.dims.is_empty() {
            writer.write_packed_int64(Self::DIMS, &self.dims);
        }
        if let Some(data_type) = self.data_type {
            writer.write_enum(Self::DATA_TYPE, data_type.0);
        }
        if !self.float_data.is_empty() {
            writer.write_packed_float(Self::FLOAT_DATA, &self.float_data);
        }
        if !self.int32_data.is_empty() {
            writer.write_packed_int32(Self::INT32_DATA, &self.int32_data);
        }
        if !self.int64_data.is_empty() {
            writer.write_packed_int64(Self::INT64_DATA, &self.int64_data);
        }
        if let Some(name) = &self.name {
            writer.write_string(Self::NAME, name);
        }
        if let Some(raw_data) = &self.raw_data {
            writer.write_bytes(Self::RAW_DATA, raw_data);
        }
        if !self.double_data.is_empty() {
            writer.write_packed_double(Self::DOUBLE_DATA, &self.double_data);
        }
        if !self.uint64_data.is_empty() {
            writer.write_packed_uint64(Self::UINT64_DATA, &self.uint64_data);
        }
    }
}

/// Element type of a tensor.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct DataType(pub i32);

impl DataType {
    pub const UNDEFINED: Self = Self(0);
    pub const FLOAT: Self = Self(1);
    pub const UINT8: Self = Self(2);
    pub const INT8: Self = Self(3);
    pub const UINT16: Self = Self(4);
    pub const INT16: Self = Self(5);
    pub const INT32: Self = Self(6);
    pub const INT64: Self = Self(7);
    pub const STRING: Self = Self(8);
    pub const BOOL: Self = Self(9);
    pub const FLOAT16: Self = Self(10);
    pub const DOUBLE: Self = Self(11);
    pub const UINT32: Self = Self(12);
    pub const UINT64: Self = Self(13);
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dimension {
    pub dim_value: Option<i64>,
    pub dim_param: Option<String>,
}

impl Dimension {
    const DIM_VALUE: u64 = 1;
    const DIM_PARAM: u64 = 2;
}

impl DecodeMessage for Dimension {
    fn decode_fields(fields: Fields) -> Result<Self, ProtobufError> {
        let mut msg = Self::default();
        for field in fields {
            let field = field?;
            match field.number() {
                Self::DIM_VALUE => {
                    msg.dim_value = Some(field.get_int64()?);
                }
                Self::DIM_PARAM => {
                    msg.dim_param = Some(field.read_string()?.to_string());
                }
                _ => {}
            }
        }
        Ok(msg)
    }
}

impl EncodeMessage for Dimension {
    fn encode_fields(&self, writer: &mut MessageWriter) {
        if let Some(value) = self.dim_value {
            writer.write_int64(Self::DIM_VALUE, value);
        }
        if let Some(param) = &self.dim_param {
            writer.write_string(Self::DIM_PARAM, param);
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TensorShapeProto {
    pub dim: Vec<Dimension>,
}

impl TensorShapeProto {
    const DIM: u64 = 1;
}

impl DecodeMessage for TensorShapeProto {
    fn decode_fields(fields: Fields) -> Result<Self, ProtobufError> {
        let mut msg = Self::default();
        for field in fields {
            let field = field?;
            if field.number() == Self::DIM {
                msg.dim.push(field.read_message()?);
            }
        }
        Ok(msg)
    }
}

impl EncodeMessage for TensorShapeProto {
    fn encode_fields(&self, writer: &mut MessageWriter) {
        for dim in &self.dim {
            writer.write_message(Self::DIM, dim);
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TypeProtoTensor {
    pub elem_type: Option<DataType>,
    pub shape: Option<TensorShapeProto>,
}

impl TypeProtoTensor {
    const ELEM_TYPE: u64 = 1; // DataType
    const SHAPE: u64 = 2; // TensorShapeProto
}

impl DecodeMessage for TypeProtoTensor {
    fn decode_fields(fields: Fields) -> Result<Self, ProtobufError> {
        let mut msg = Self::default();
        for field in fields {
            let field = field?;
            match field.number() {
                Self::ELEM_TYPE => {
                    msg.elem_type = Some(DataType(field.get_enum()?));
                }
                Self::SHAPE => {
                    msg.shape = Some(field.read_message()?);
                }
                _ => {}
            }
        }
        Ok(msg)
    }
}

impl EncodeMessage for TypeProtoTensor {
    fn encode_fields(&self, writer: &mut MessageWriter) {
        if let Some(elem_type) = self.elem_type {
            writer.write_enum(Self::ELEM_TYPE, elem_type.0);
        }
        if let Some(shape) = &self.shape {
            writer.write_message(Self::SHAPE, shape);
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TypeProto {
    pub tensor_type: Option<TypeProtoTensor>,
}

impl TypeProto {
    const TENSOR_TYPE: u64 = 1;
}

impl DecodeMessage for TypeProto {
    fn decode_fields(fields: Fields) -> Result<Self, ProtobufError> {
        let mut msg = Self::default();
        for field in fields {
            let field = field?;
            if field.number() == Self::TENSOR_TYPE {
                msg.tensor_type = Some(field.read_message()?);
            }
        }
        Ok(msg)
    }
}

impl EncodeMessage for TypeProto {
    fn encode_fields(&self, writer: &mut MessageWriter) {
        if let Some(tensor_type) = &self.tensor_type {
            writer.write_message(Self::TENSOR_TYPE, tensor_type);
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValueInfoProto {
    pub name: Option<String>,
    pub r#type: Option<TypeProto>,
}

impl ValueInfoProto {
    const NAME: u64 = 1;
    const TYPE: u64 = 2;
}

impl DecodeMessage for ValueInfoProto {
    fn decode_fields(fields: Fields) -> Result<Self, ProtobufError> {
        let mut msg = Self::default();
        for field in fields {
            let field = field?;
            match field.number() {
                Self::NAME => {
                    msg.name = Some(field.read_string()?.to_string());
                }
                Self::TYPE => {
                    msg.r#type = Some(field.read_message()?);
                }
                _ => {}
            }
        }
        Ok(msg)
    }
}

impl EncodeMessage for ValueInfoProto {
    fn encode_fields(&self, writer: &mut MessageWriter) {
        if let Some(name) = &self.name {
            writer.write_string(Self::NAME, name);
        }
        if let Some(ty) = &self.r#type {
            writer.write_message(Self::TYPE, ty);
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GraphProto {
    pub node: Vec<NodeProto>,
    pub name: Option<String>,
    pub initializer: Vec<TensorProto>,
    pub input: Vec<ValueInfoProto>,
    pub output: Vec<ValueInfoProto>,
    pub value_info: Vec<ValueInfoProto>,
}

impl GraphProto {
    const NODE: u64 = 1;
    const NAME: u64 = 2;
    const INITIALIZER: u64 = 5;
    const INPUT: u64 = 11;
    const OUTPUT: u64 = 12;
    const VALUE_INFO: u64 = 13;
}

impl DecodeMessage for GraphProto {
    fn decode_fields(fields: Fields) -> Result<Self, ProtobufError> {
        let mut msg = Self::default();
        for field in fields {
            let field = field?;
            match field.number() {
                Self::NODE => {
                    msg.node.push(field.read_message()?);
                }
                Self::NAME => {
                    msg.name = Some(field.read_string()?.to_string());
                }
                Self::INITIALIZER => {
                    msg.initializer.push(field.read_message()?);
                }
                Self::INPUT => {
                    msg.input.push(field.read_message()?);
                }
                Self::OUTPUT => {
                    msg.output.push(field.read_message()?);
                }
                Self::VALUE_INFO => {
                    msg.value_info.push(field.read_message()?);
                }
                _ => {}
            }
        }
        Ok(msg)
    }
}

impl EncodeMessage for GraphProto {
    fn encode_fields(&self, writer: &mut MessageWriter) {
        for node in &self.node {
            writer.write_message(Self::NODE, node);
        }
        if let Some(name) = &self.name {
            writer.write_string(Self::NAME, name);
        }
        for init in &self.initializer {
            writer.write_message(Self::INITIALIZER, init);
        }
        for input in &self.input {
            writer.write_message(Self::INPUT, input);
        }
        for output in &self.output {
            writer.write_message(Self::OUTPUT, output);
        }
        for info in &self.value_info {
            writer.write_message(Self::VALUE_INFO, info);
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct OperatorSetIdProto {
    pub domain: Option<String>,
    pub version: Option<i64>,
}

impl OperatorSetIdProto {
    const DOMAIN: u64 = 1;
    const VERSION: u64 = 2;
}

impl DecodeMessage for OperatorSetIdProto {
    fn decode_fields(fields: Fields) -> Result<Self, ProtobufError> {
        let mut msg = Self::default();
        for field in fields {
            let field = field?;
            match field.number() {
                Self::DOMAIN => {
                    msg.domain = Some(field.read_string()?.to_string());
                }
                Self::VERSION => {
                    msg.version = Some(field.get_int64()?);
                }
                _ => {}
            }
        }
        Ok(msg)
    }
}

impl EncodeMessage for OperatorSetIdProto {
    fn encode_fields(&self, writer: &mut MessageWriter) {
        if let Some(domain) = &self.domain {
            writer.write_string(Self::DOMAIN, domain);
        }
        if let Some(version) = self.version {
            writer.write_int64(Self::VERSION, version);
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelProto {
    pub ir_version: Option<i64>,
    pub producer_name: Option<String>,
    pub graph: Option<GraphProto>,
    pub opset_import: Vec<OperatorSetIdProto>,
}

impl ModelProto {
    const IR_VERSION: u64 = 1;
    const PRODUCER_NAME: u64 = 2;
    const GRAPH: u64 = 7;
    const OPSET_IMPORT: u64 = 8;
}

impl DecodeMessage for ModelProto {
    fn decode_fields(fields: Fields) -> Result<Self, ProtobufError> {
        let mut msg = Self::default();
        for field in fields {
            let field = field?;
            match field.number() {
                Self::IR_VERSION => {
                    msg.ir_version = Some(field.get_int64()?);
                }
                Self::PRODUCER_NAME => {
                    msg.producer_name = Some(field.read_string()?.to_string());
                }
                Self::GRAPH => {
                    msg.graph = Some(field.read_message()?);
                }
                Self::OPSET_IMPORT => {
                    msg.opset_import.push(field.read_message()?);
                }
                _ => {}
            }
        }
        Ok(msg)
    }
}

impl EncodeMessage for ModelProto {
    fn encode_fields(&self, writer: &mut MessageWriter) {
        if let Some(ir_version) = self.ir_version {
            writer.write_int64(Self::IR_VERSION, ir_version);
        }
        if let Some(producer) = &self.producer_name {
            writer.write_string(Self::PRODUCER_NAME, producer);
        }
        if let Some(graph) = &self.graph {
            writer.write_message(Self::GRAPH, graph);
        }
        for opset in &self.opset_import {
            writer.write_message(Self::OPSET_IMPORT, opset);
        }
    }
}

/// Simplified version of [`ModelProto`] used for file type detection.
#[derive(Debug, Default)]
struct SlimModelProto {
    pub ir_version: Option<i64>,
    pub graph: bool,
}

impl DecodeMessage for SlimModelProto {
    fn decode_fields(fields: Fields) -> Result<Self, ProtobufError> {
        let mut msg = Self::default();
        for field in fields {
            let field = field?;
            match field.number() {
                ModelProto::IR_VERSION => {
                    msg.ir_version = Some(field.get_int64()?);
                }
                ModelProto::GRAPH => {
                    msg.graph = field.read_bytes().is_ok();
                }
                _ => {}
            }
        }
        Ok(msg)
    }
}

/// Test whether a buffer contains an ONNX model.
///
/// ONNX models do not contain any magic bytes that would make detection simple.
/// Instead this function attempts to parse the data as a simplified version of
/// the `ModelProto` message type, testing for the presence of a few key fields
/// but skipping over the main graph.
///
/// ```
/// use onnx_sema_proto::onnx::is_onnx_model;
///
/// assert!(!is_onnx_model(b"NOT AN ONNX MODEL"));
/// ```
pub fn is_onnx_model(buf: &[u8]) -> bool {
    let Ok(model) = SlimModelProto::decode(buf) else {
        return false;
    };
    // The `ir_version` field is required, and a model without a graph is not
    // useful.
    model.ir_version.is_some() && model.graph
}

#[cfg(test)]
mod tests {
    use super::{
        is_onnx_model, AttributeProto, AttributeType, DataType, Dimension, GraphProto,
        ModelProto, NodeProto, OperatorSetIdProto, TensorProto, TensorShapeProto, TypeProto,
        TypeProtoTensor, ValueInfoProto,
    };
    use crate::protobuf::{DecodeMessage, EncodeMessage, ErrorKind, MessageWriter};

    fn value_info(name: &str, elem_type: DataType, dims: &[Dimension]) -> ValueInfoProto {
        ValueInfoProto {
            name: Some(name.to_string()),
            r#type: Some(TypeProto {
                tensor_type: Some(TypeProtoTensor {
                    elem_type: Some(elem_type),
                    shape: Some(TensorShapeProto { dim: dims.to_vec() }),
                }),
            }),
        }
    }

    fn fixed(size: i64) -> Dimension {
        Dimension {
            dim_value: Some(size),
            dim_param: None,
        }
    }

    fn conv_model() -> ModelProto {
        let strides = AttributeProto {
            name: Some("strides".to_string()),
            ints: vec![2, 2],
            r#type: Some(AttributeType::INTS),
            ..Default::default()
        };
        let auto_pad = AttributeProto {
            name: Some("auto_pad".to_string()),
            s: Some(b"SAME_UPPER".to_vec()),
            r#type: Some(AttributeType::STRING),
            ..Default::default()
        };
        let weight = TensorProto {
            name: Some("w".to_string()),
            dims: vec![1, 1, 3, 3],
            data_type: Some(DataType::FLOAT),
            float_data: vec![0.5; 9],
            ..Default::default()
        };
        let batch = Dimension {
            dim_value: None,
            dim_param: Some("batch".to_string()),
        };

        ModelProto {
            ir_version: Some(8),
            producer_name: Some("test".to_string()),
            opset_import: vec![OperatorSetIdProto {
                domain: Some(String::new()),
                version: Some(13),
            }],
            graph: Some(GraphProto {
                name: Some("conv".to_string()),
                node: vec![NodeProto {
                    name: Some("conv_1".to_string()),
                    op_type: Some("Conv".to_string()),
                    input: vec!["x".to_string(), "w".to_string()],
                    output: vec!["y".to_string()],
                    attribute: vec![strides, auto_pad],
                    domain: None,
                }],
                initializer: vec![weight],
                input: vec![value_info(
                    "x",
                    DataType::FLOAT,
                    &[batch, fixed(1), fixed(32), fixed(32)],
                )],
                output: vec![value_info("y", DataType::FLOAT, &[])],
                value_info: Vec::new(),
            }),
        }
    }

    // Test decoding an empty buffer. This should succeed and return a
    // default ModelProto.
    #[test]
    fn test_decode_empty_model() {
        let model = ModelProto::decode(&[]).unwrap();
        assert!(model.graph.is_none());
    }

    #[test]
    fn test_encode_decode_model() {
        let model = conv_model();
        let decoded = ModelProto::decode(&model.encode()).unwrap();
        assert_eq!(decoded, model);

        let graph = decoded.graph.unwrap();
        let conv = &graph.node[0];
        assert_eq!(conv.op_type.as_deref(), Some("Conv"));
        assert_eq!(conv.attribute[0].ints, [2, 2]);
        assert_eq!(conv.attribute[1].s.as_deref(), Some(&b"SAME_UPPER"[..]));
        assert_eq!(graph.initializer[0].float_data.len(), 9);
    }

    #[test]
    fn test_decode_unpacked_repeated_fields() {
        // Older exporters write repeated scalars one element per field.
        let mut writer = MessageWriter::new();
        writer.write_int64(1, 2);
        writer.write_int64(1, 3);
        writer.write_enum(2, DataType::INT64.0);
        writer.write_int64(7, -1);
        writer.write_int64(7, 5);
        let tensor = TensorProto::decode(&writer.into_bytes()).unwrap();

        assert_eq!(tensor.dims, [2, 3]);
        assert_eq!(tensor.data_type, Some(DataType::INT64));
        assert_eq!(tensor.int64_data, [-1, 5]);
    }

    #[test]
    fn test_decode_error_reports_message() {
        let mut writer = MessageWriter::new();
        writer.write_string(3, "node");
        // `op_type` must be a string, not a varint.
        writer.write_int64(4, 1);
        let err = NodeProto::decode(&writer.into_bytes()).err().unwrap();

        assert_eq!(err.kind(), &ErrorKind::FieldTypeMismatch);
        assert_eq!(err.context(), Some("NodeProto"));
        assert_eq!(err.field(), Some(4));
    }

    #[test]
    fn test_is_onnx_model() {
        assert!(is_onnx_model(&conv_model().encode()));
        assert!(!is_onnx_model(&[]));
        assert!(!is_onnx_model(&ModelProto::default().encode()));
    }
}
