use onnx_sema_proto::onnx;
use onnx_sema_proto::protobuf::EncodeMessage;
use rten_tensor::prelude::*;

use super::{AttrValue, Attribute, Graph, Node, TensorDesc};
use crate::dim::Dim;
use crate::dtype::{f32_to_f16, DataType};
use crate::value::{Constant, TensorData};

/// IR version written to encoded models.
const IR_VERSION: i64 = 8;

/// Serialize a graph as an ONNX `ModelProto`.
///
/// The model imports the default domain at `graph.opset`. Loading the result
/// with [`load_model`](super::load_model) reproduces the graph, except that
/// generated names of dynamic dims are written as `dim_param`s.
pub fn encode_model(graph: &Graph) -> Vec<u8> {
    to_model_proto(graph).encode()
}

/// Convert a graph to an ONNX `ModelProto`.
pub fn to_model_proto(graph: &Graph) -> onnx::ModelProto {
    onnx::ModelProto {
        ir_version: Some(IR_VERSION),
        producer_name: Some("onnx-sema".to_string()),
        graph: Some(to_graph_proto(graph)),
        opset_import: vec![onnx::OperatorSetIdProto {
            domain: Some(String::new()),
            version: Some(graph.opset),
        }],
    }
}

fn to_graph_proto(graph: &Graph) -> onnx::GraphProto {
    onnx::GraphProto {
        node: graph.nodes.iter().map(to_node_proto).collect(),
        name: graph.name.clone(),
        initializer: graph
            .initializers
            .iter()
            .map(|init| to_tensor_proto(&init.name, &init.value))
            .collect(),
        input: graph.inputs.iter().map(to_value_info).collect(),
        output: graph.outputs.iter().map(to_value_info).collect(),
        value_info: graph.value_info.iter().map(to_value_info).collect(),
    }
}

fn to_node_proto(node: &Node) -> onnx::NodeProto {
    onnx::NodeProto {
        name: node.name.clone(),
        input: node.inputs.clone(),
        output: node.outputs.clone(),
        op_type: Some(node.op_type.clone()),
        domain: node.domain.clone(),
        attribute: node.attrs.iter().map(to_attr_proto).collect(),
    }
}

fn to_attr_proto(attr: &Attribute) -> onnx::AttributeProto {
    let mut proto = onnx::AttributeProto {
        name: Some(attr.name.clone()),
        ..Default::default()
    };
    let attr_type = match &attr.value {
        AttrValue::Float(f) => {
            proto.f = Some(*f);
            onnx::AttributeType::FLOAT
        }
        AttrValue::Int(i) => {
            proto.i = Some(*i);
            onnx::AttributeType::INT
        }
        AttrValue::String(s) => {
            proto.s = Some(s.as_bytes().to_vec());
            onnx::AttributeType::STRING
        }
        AttrValue::Floats(floats) => {
            proto.floats = floats.clone();
            onnx::AttributeType::FLOATS
        }
        AttrValue::Ints(ints) => {
            proto.ints = ints.clone();
            onnx::AttributeType::INTS
        }
        AttrValue::Strings(strings) => {
            proto.strings = strings.iter().map(|s| s.as_bytes().to_vec()).collect();
            onnx::AttributeType::STRINGS
        }
        AttrValue::Tensor(tensor) => {
            proto.t = Some(to_tensor_proto("", tensor));
            onnx::AttributeType::TENSOR
        }
    };
    proto.r#type = Some(attr_type);
    proto
}

/// Convert a constant to a `TensorProto`.
///
/// Values are written to the typed data fields rather than `raw_data`. As in
/// ONNX, float16 values are stored as bit patterns in `int32_data`.
pub(crate) fn to_tensor_proto(name: &str, value: &Constant) -> onnx::TensorProto {
    let mut proto = onnx::TensorProto {
        dims: value.shape().iter().map(|&d| d as i64).collect(),
        data_type: Some(value.dtype().to_onnx()),
        name: (!name.is_empty()).then(|| name.to_string()),
        ..Default::default()
    };

    match (value.dtype(), value.data()) {
        (DataType::Float, TensorData::Float(t)) => {
            proto.float_data = t.iter().map(|&x| x as f32).collect();
        }
        (DataType::Double, TensorData::Float(t)) => {
            proto.double_data = t.to_vec();
        }
        (DataType::Float16, TensorData::Float(t)) => {
            proto.int32_data = t.iter().map(|&x| f32_to_f16(x as f32) as i32).collect();
        }
        (DataType::Int64, TensorData::Int(t)) => {
            proto.int64_data = t.to_vec();
        }
        (DataType::UInt32 | DataType::UInt64, TensorData::Int(t)) => {
            proto.uint64_data = t.iter().map(|&x| x as u64).collect();
        }
        (_, TensorData::Int(t)) => {
            proto.int32_data = t.iter().map(|&x| x as i32).collect();
        }
        (_, TensorData::Float(t)) => {
            proto.double_data = t.to_vec();
        }
    }

    proto
}

fn to_value_info(desc: &TensorDesc) -> onnx::ValueInfoProto {
    let tensor_type = match (&desc.dtype, &desc.shape) {
        (None, None) => None,
        (dtype, shape) => Some(onnx::TypeProtoTensor {
            elem_type: dtype.map(|dt| dt.to_onnx()),
            shape: shape.as_ref().map(|dims| onnx::TensorShapeProto {
                dim: dims.iter().map(to_dimension).collect(),
            }),
        }),
    };
    onnx::ValueInfoProto {
        name: Some(desc.name.clone()),
        r#type: tensor_type.map(|tensor_type| onnx::TypeProto {
            tensor_type: Some(tensor_type),
        }),
    }
}

fn to_dimension(dim: &Dim) -> onnx::Dimension {
    match dim {
        Dim::Fixed(size) => onnx::Dimension {
            dim_value: Some(*size as i64),
            dim_param: None,
        },
        Dim::Symbol(name) => onnx::Dimension {
            dim_value: None,
            dim_param: Some(name.clone()),
        },
    }
}
