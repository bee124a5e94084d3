use std::path::Path;

use onnx_sema_proto::onnx;
use onnx_sema_proto::protobuf::DecodeMessage;
use tracing::{debug, warn};

use super::{AttrValue, Attribute, Graph, Initializer, Node, TensorDesc, DEFAULT_OPSET};
use crate::dim::{Dim, SymbolGen};
use crate::dtype::{f16_to_f32, DataType};
use crate::error::LoadError;
use crate::value::Constant;

/// Load a graph from a serialized ONNX `ModelProto`.
///
/// The returned graph has not been validated. Call [`Graph::validate`] to
/// check references between nodes.
pub fn load_model(data: &[u8]) -> Result<Graph, LoadError> {
    let model = onnx::ModelProto::decode(data)?;
    let opset = model
        .opset_import
        .iter()
        .find(|op| matches!(op.domain.as_deref(), None | Some("") | Some("ai.onnx")))
        .and_then(|op| op.version)
        .unwrap_or(DEFAULT_OPSET);

    let onnx_graph = model.graph.as_ref().ok_or(LoadError::MissingGraph)?;
    let graph = load_graph(onnx_graph, opset)?;

    debug!(
        nodes = graph.nodes.len(),
        initializers = graph.initializers.len(),
        opset,
        "loaded model"
    );

    Ok(graph)
}

/// Load a graph from an `.onnx` file.
pub fn load_model_file<P: AsRef<Path>>(path: P) -> Result<Graph, LoadError> {
    let data = std::fs::read(path)?;
    load_model(&data)
}

/// Create a [`LoadError`] that relates to a named tensor or value.
macro_rules! load_error {
    ($kind:ident, $name:expr, $format_str:literal, $($arg:tt)*) => {{
        LoadError::$kind {
            name: $name.to_string(),
            reason: format!($format_str, $($arg)*),
        }
    }};

    ($kind:ident, $name:expr, $reason:expr) => {{
        LoadError::$kind {
            name: $name.to_string(),
            reason: $reason.to_string(),
        }
    }};
}

fn load_graph(onnx_graph: &onnx::GraphProto, opset: i64) -> Result<Graph, LoadError> {
    let mut sym_gen = SymbolGen::new();

    let mut initializers = Vec::with_capacity(onnx_graph.initializer.len());
    for tensor in &onnx_graph.initializer {
        let name = tensor.name.as_deref().unwrap_or_default();
        let value = load_constant(tensor, name)?;
        initializers.push(Initializer {
            name: name.to_string(),
            value,
        });
    }
    let is_initializer = |name: &str| initializers.iter().any(|init| init.name == name);

    let mut inputs = Vec::with_capacity(onnx_graph.input.len());
    for value in &onnx_graph.input {
        let desc = load_value_info(value, &mut sym_gen)?;

        // Graph inputs which are not also initializers must declare a type
        // and shape, since they are the starting point for inference.
        if !is_initializer(&desc.name) {
            if desc.dtype.is_none() {
                return Err(load_error!(
                    InvalidValueInfo,
                    desc.name,
                    "graph input has no supported element type"
                ));
            }
            if desc.shape.is_none() {
                return Err(load_error!(
                    InvalidValueInfo,
                    desc.name,
                    "graph input has no shape"
                ));
            }
        }
        inputs.push(desc);
    }

    let outputs = onnx_graph
        .output
        .iter()
        .map(|value| load_value_info(value, &mut sym_gen))
        .collect::<Result<Vec<_>, _>>()?;
    let value_info = onnx_graph
        .value_info
        .iter()
        .map(|value| load_value_info(value, &mut sym_gen))
        .collect::<Result<Vec<_>, _>>()?;

    let nodes = onnx_graph
        .node
        .iter()
        .map(load_node)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Graph {
        name: onnx_graph.name.clone(),
        nodes,
        inputs,
        outputs,
        value_info,
        initializers,
        opset,
    })
}

fn load_node(node: &onnx::NodeProto) -> Result<Node, LoadError> {
    let label = node
        .name
        .as_deref()
        .filter(|name| !name.is_empty())
        .or(node.output.first().map(|s| s.as_str()))
        .unwrap_or_default();

    let mut attrs = Vec::with_capacity(node.attribute.len());
    for attr in &node.attribute {
        let name = attr.name.as_deref().unwrap_or_default();
        if let Some(value) = load_attr(attr, label)? {
            attrs.push(Attribute {
                name: name.to_string(),
                value,
            });
        }
    }

    Ok(Node {
        name: node.name.clone(),
        op_type: node.op_type.clone().unwrap_or_default(),
        domain: node.domain.clone(),
        inputs: node.input.clone(),
        outputs: node.output.clone(),
        attrs,
    })
}

/// Convert an attribute value.
///
/// Returns `None` for attribute kinds that are not used by any supported
/// operator (graphs, sparse tensors).
fn load_attr(attr: &onnx::AttributeProto, node: &str) -> Result<Option<AttrValue>, LoadError> {
    let name = attr.name.as_deref().unwrap_or_default();
    let to_string = |bytes: &[u8]| String::from_utf8_lossy(bytes).into_owned();

    // Older exporters omit the `type` field, in which case the kind is
    // inferred from whichever field is set.
    let attr_type = attr.r#type.unwrap_or_else(|| {
        if attr.t.is_some() {
            onnx::AttributeType::TENSOR
        } else if attr.s.is_some() {
            onnx::AttributeType::STRING
        } else if attr.f.is_some() {
            onnx::AttributeType::FLOAT
        } else if attr.i.is_some() {
            onnx::AttributeType::INT
        } else if !attr.floats.is_empty() {
            onnx::AttributeType::FLOATS
        } else if !attr.strings.is_empty() {
            onnx::AttributeType::STRINGS
        } else {
            onnx::AttributeType::INTS
        }
    });

    let value = match attr_type {
        onnx::AttributeType::FLOAT => AttrValue::Float(attr.f.unwrap_or_default()),
        onnx::AttributeType::INT => AttrValue::Int(attr.i.unwrap_or_default()),
        onnx::AttributeType::STRING => AttrValue::String(to_string(
            attr.s.as_deref().unwrap_or_default(),
        )),
        onnx::AttributeType::FLOATS => AttrValue::Floats(attr.floats.clone()),
        onnx::AttributeType::INTS => AttrValue::Ints(attr.ints.clone()),
        onnx::AttributeType::STRINGS => {
            AttrValue::Strings(attr.strings.iter().map(|s| to_string(s)).collect())
        }
        onnx::AttributeType::TENSOR => {
            let Some(tensor) = &attr.t else {
                return Err(load_error!(
                    InvalidTensor,
                    name,
                    "tensor attribute of node \"{}\" has no value",
                    node
                ));
            };
            AttrValue::Tensor(load_constant(tensor, name)?)
        }
        other => {
            warn!(node, attr = name, kind = other.0, "ignoring unsupported attribute kind");
            return Ok(None);
        }
    };
    Ok(Some(value))
}

/// Convert type and shape information from an ONNX value.
///
/// Dynamic dimensions keep their `dim_param` name. Dimensions with neither a
/// name nor a positive size get a generated name.
fn load_value_info(
    value: &onnx::ValueInfoProto,
    sym_gen: &mut SymbolGen,
) -> Result<TensorDesc, LoadError> {
    let name = value.name.clone().unwrap_or_default();
    let mut desc = TensorDesc::untyped(&name);

    let Some(tensor_type) = value
        .r#type
        .as_ref()
        .and_then(|type_info| type_info.tensor_type.as_ref())
    else {
        return Ok(desc);
    };

    if let Some(elem_type) = tensor_type.elem_type {
        let dtype = DataType::from_onnx(elem_type).ok_or_else(|| {
            load_error!(
                InvalidValueInfo,
                name,
                "unsupported element type {}",
                elem_type.0
            )
        })?;
        desc.dtype = Some(dtype);
    }

    if let Some(onnx_shape) = &tensor_type.shape {
        let dims = onnx_shape
            .dim
            .iter()
            .map(|dim| match (dim.dim_value, dim.dim_param.as_deref()) {
                (Some(size), _) if size > 0 => Dim::Fixed(size as usize),
                (_, Some(param)) if !param.is_empty() => Dim::Symbol(param.to_string()),
                _ => sym_gen.gen_dim(),
            })
            .collect();
        desc.shape = Some(dims);
    }

    Ok(desc)
}

/// Load data from an ONNX tensor.
///
/// The values may come from `raw_data`, in little-endian order, or from the
/// typed data field that ONNX uses for the element type.
pub(crate) fn load_constant(tensor: &onnx::TensorProto, name: &str) -> Result<Constant, LoadError> {
    let shape: Vec<usize> = tensor
        .dims
        .iter()
        .map(|&dim| usize::try_from(dim))
        .collect::<Result<_, _>>()
        .map_err(|_| load_error!(InvalidTensor, name, "invalid shape {:?}", tensor.dims))?;

    let onnx_dtype = tensor.data_type.unwrap_or(onnx::DataType::UNDEFINED);
    let dtype = DataType::from_onnx(onnx_dtype).ok_or_else(|| {
        load_error!(InvalidTensor, name, "unsupported data type {}", onnx_dtype.0)
    })?;
    let raw = tensor.raw_data.as_deref();

    let constant = match dtype {
        DataType::Float => {
            let values = match raw {
                Some(data) => load_raw_data(data, name, f32::from_le_bytes)?,
                None => tensor.float_data.clone(),
            };
            let values: Vec<f64> = values.into_iter().map(|x| x as f64).collect();
            check_len(&shape, values, name).map(|v| Constant::from_floats(dtype, &shape, v))?
        }
        DataType::Double => {
            let values = match raw {
                Some(data) => load_raw_data(data, name, f64::from_le_bytes)?,
                None => tensor.double_data.clone(),
            };
            check_len(&shape, values, name).map(|v| Constant::from_floats(dtype, &shape, v))?
        }
        DataType::Float16 => {
            let bits: Vec<u16> = match raw {
                Some(data) => load_raw_data(data, name, u16::from_le_bytes)?,
                None => tensor.int32_data.iter().map(|&x| x as u16).collect(),
            };
            let values: Vec<f64> = bits.into_iter().map(|b| f16_to_f32(b) as f64).collect();
            check_len(&shape, values, name).map(|v| Constant::from_floats(dtype, &shape, v))?
        }
        DataType::Int64 => {
            let values = match raw {
                Some(data) => load_raw_data(data, name, i64::from_le_bytes)?,
                None => tensor.int64_data.clone(),
            };
            check_len(&shape, values, name).map(|v| Constant::from_ints(dtype, &shape, v))?
        }
        DataType::UInt64 | DataType::UInt32 => {
            let values: Vec<i64> = match (raw, dtype) {
                (Some(data), DataType::UInt32) => load_raw_data(data, name, u32::from_le_bytes)?
                    .into_iter()
                    .map(|x| x as i64)
                    .collect(),
                (Some(data), _) => load_raw_data(data, name, u64::from_le_bytes)?
                    .into_iter()
                    .map(|x| x as i64)
                    .collect(),
                (None, _) => tensor.uint64_data.iter().map(|&x| x as i64).collect(),
            };
            check_len(&shape, values, name).map(|v| Constant::from_ints(dtype, &shape, v))?
        }
        DataType::Int32 | DataType::Int16 | DataType::UInt16 => {
            let values: Vec<i64> = match (raw, dtype) {
                (Some(data), DataType::Int32) => load_raw_data(data, name, i32::from_le_bytes)?
                    .into_iter()
                    .map(|x| x as i64)
                    .collect(),
                (Some(data), DataType::Int16) => load_raw_data(data, name, i16::from_le_bytes)?
                    .into_iter()
                    .map(|x| x as i64)
                    .collect(),
                (Some(data), _) => load_raw_data(data, name, u16::from_le_bytes)?
                    .into_iter()
                    .map(|x| x as i64)
                    .collect(),
                (None, _) => tensor.int32_data.iter().map(|&x| x as i64).collect(),
            };
            check_len(&shape, values, name).map(|v| Constant::from_ints(dtype, &shape, v))?
        }
        DataType::Int8 | DataType::UInt8 | DataType::Bool => {
            let values: Vec<i64> = match raw {
                Some(data) if dtype == DataType::Int8 => {
                    data.iter().map(|&x| x as i8 as i64).collect()
                }
                Some(data) => data.iter().map(|&x| x as i64).collect(),
                None => tensor.int32_data.iter().map(|&x| x as i64).collect(),
            };
            check_len(&shape, values, name).map(|v| Constant::from_ints(dtype, &shape, v))?
        }
        DataType::String => {
            return Err(load_error!(
                InvalidTensor,
                name,
                "string tensors are not supported"
            ));
        }
    };

    Ok(constant)
}

fn check_len<T>(shape: &[usize], values: Vec<T>, name: &str) -> Result<Vec<T>, LoadError> {
    let expected: usize = shape.iter().product();
    if values.len() != expected {
        return Err(load_error!(
            InvalidTensor,
            name,
            "length {} does not match shape {:?}",
            values.len(),
            shape
        ));
    }
    Ok(values)
}

fn load_raw_data<T, const SIZE_OF_T: usize>(
    data: &[u8],
    name: &str,
    convert: impl Fn([u8; SIZE_OF_T]) -> T,
) -> Result<Vec<T>, LoadError> {
    if data.len() % SIZE_OF_T != 0 {
        return Err(load_error!(
            InvalidTensor,
            name,
            "raw data length {} is not a multiple of element size {}",
            data.len(),
            SIZE_OF_T
        ));
    }
    let mut values = Vec::with_capacity(data.len() / SIZE_OF_T);
    for chunk in data.chunks_exact(SIZE_OF_T) {
        let mut bytes = [0u8; SIZE_OF_T];
        bytes.copy_from_slice(chunk);
        values.push(convert(bytes));
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use onnx_sema_proto::onnx;
    use onnx_sema_proto::protobuf::EncodeMessage;

    use super::{load_constant, load_model};
    use crate::dim::Dim;
    use crate::dtype::DataType;
    use crate::error::LoadError;
    use crate::graph::{encode_model, AttrValue, Graph, Initializer, Node, TensorDesc};
    use crate::value::Constant;

    fn tensor_proto(dtype: onnx::DataType, dims: &[i64]) -> onnx::TensorProto {
        onnx::TensorProto {
            dims: dims.to_vec(),
            data_type: Some(dtype),
            ..Default::default()
        }
    }

    #[test]
    fn test_load_constant_raw_data() {
        let mut tensor = tensor_proto(onnx::DataType::FLOAT, &[2]);
        tensor.raw_data = Some([1.5f32.to_le_bytes(), (-2.0f32).to_le_bytes()].concat());
        let value = load_constant(&tensor, "x").unwrap();
        assert_eq!(value.dtype(), DataType::Float);
        assert_eq!(value.to_f64s(), [1.5, -2.0]);

        let mut tensor = tensor_proto(onnx::DataType::INT64, &[1, 2]);
        tensor.raw_data = Some([7i64.to_le_bytes(), (-1i64).to_le_bytes()].concat());
        let value = load_constant(&tensor, "x").unwrap();
        assert_eq!(value.shape(), [1, 2]);
        assert_eq!(value.to_i64s(), [7, -1]);

        let mut tensor = tensor_proto(onnx::DataType::INT8, &[2]);
        tensor.raw_data = Some(vec![0xff, 0x01]);
        assert_eq!(load_constant(&tensor, "x").unwrap().to_i64s(), [-1, 1]);

        let mut tensor = tensor_proto(onnx::DataType::FLOAT16, &[1]);
        tensor.raw_data = Some(0x3e00u16.to_le_bytes().to_vec());
        assert_eq!(load_constant(&tensor, "x").unwrap().to_f64s(), [1.5]);
    }

    #[test]
    fn test_load_constant_typed_data() {
        let mut tensor = tensor_proto(onnx::DataType::FLOAT16, &[2]);
        tensor.int32_data = vec![15872, 16640];
        assert_eq!(load_constant(&tensor, "x").unwrap().to_f64s(), [1.5, 2.5]);

        let mut tensor = tensor_proto(onnx::DataType::BOOL, &[3]);
        tensor.int32_data = vec![1, 0, 1];
        let value = load_constant(&tensor, "x").unwrap();
        assert_eq!(value.dtype(), DataType::Bool);
        assert_eq!(value.to_i64s(), [1, 0, 1]);

        let mut tensor = tensor_proto(onnx::DataType::DOUBLE, &[]);
        tensor.double_data = vec![0.1];
        assert_eq!(load_constant(&tensor, "x").unwrap().to_f64s(), [0.1]);
    }

    #[test]
    fn test_load_constant_errors() {
        let mut tensor = tensor_proto(onnx::DataType::FLOAT, &[3]);
        tensor.float_data = vec![1., 2.];
        let err = load_constant(&tensor, "x").err().unwrap();
        assert!(matches!(err, LoadError::InvalidTensor { .. }));
        assert_eq!(
            err.to_string(),
            "invalid tensor \"x\": length 2 does not match shape [3]"
        );

        let mut tensor = tensor_proto(onnx::DataType::INT32, &[1]);
        tensor.raw_data = Some(vec![1, 2, 3]);
        assert!(load_constant(&tensor, "x").is_err());

        let tensor = tensor_proto(onnx::DataType::FLOAT, &[-1]);
        assert!(load_constant(&tensor, "x").is_err());

        let tensor = tensor_proto(onnx::DataType::STRING, &[0]);
        assert!(load_constant(&tensor, "x").is_err());
    }

    #[test]
    fn test_load_model_round_trip() {
        let graph = Graph {
            name: Some("test".into()),
            nodes: vec![Node::new("Gemm", ["x", "w"], ["y"])
                .with_name("gemm")
                .with_attr("transB", 1i64)
                .with_attr("alpha", 0.5f32)],
            inputs: vec![TensorDesc::new("x", DataType::Float, dims!["batch", 2])],
            outputs: vec![TensorDesc::new("y", DataType::Float, dims!["batch", 4])],
            initializers: vec![Initializer {
                name: "w".into(),
                value: Constant::from_floats(DataType::Float, &[4, 2], (0..8).map(|x| x as f64).collect()),
            }],
            opset: 9,
            ..Default::default()
        };
        let loaded = load_model(&encode_model(&graph)).unwrap();
        assert_eq!(loaded, graph);
        assert_eq!(loaded.nodes[0].attr("transB"), Some(&AttrValue::Int(1)));
    }

    #[test]
    fn test_generated_dim_names() {
        let mut model = onnx::ModelProto::default();
        let mut graph = onnx::GraphProto::default();
        for (name, size) in [("a", 0), ("b", -1)] {
            graph.input.push(onnx::ValueInfoProto {
                name: Some(name.into()),
                r#type: Some(onnx::TypeProto {
                    tensor_type: Some(onnx::TypeProtoTensor {
                        elem_type: Some(onnx::DataType::FLOAT),
                        shape: Some(onnx::TensorShapeProto {
                            dim: vec![
                                onnx::Dimension {
                                    dim_value: Some(size),
                                    dim_param: None,
                                },
                                onnx::Dimension {
                                    dim_value: Some(3),
                                    dim_param: None,
                                },
                            ],
                        }),
                    }),
                }),
            });
        }
        model.graph = Some(graph);

        let loaded = load_model(&model.encode()).unwrap();
        assert_eq!(
            loaded.inputs[0].shape,
            Some(vec![Dim::Symbol("unknown_1".into()), Dim::Fixed(3)])
        );
        assert_eq!(
            loaded.inputs[1].shape,
            Some(vec![Dim::Symbol("unknown_2".into()), Dim::Fixed(3)])
        );
        assert_eq!(loaded.opset, crate::graph::DEFAULT_OPSET);
    }

    #[test]
    fn test_load_model_errors() {
        let model = onnx::ModelProto::default();
        let err = load_model(&model.encode()).err().unwrap();
        assert!(matches!(err, LoadError::MissingGraph));

        let err = load_model(&[0x0a, 0xff]).err().unwrap();
        assert!(matches!(err, LoadError::Protobuf(_)));

        let graph = Graph {
            inputs: vec![TensorDesc::untyped("x")],
            ..Default::default()
        };
        let err = load_model(&encode_model(&graph)).err().unwrap();
        assert!(matches!(err, LoadError::InvalidValueInfo { .. }));
    }
}
