use crate::dim::Dim;
use crate::dtype::DataType;
use crate::error::OpError;
use crate::ops::{check_dtype, check_inputs, check_rank, required, InferCtx, InferOp};
use crate::value::ValueInfo;

/// How embeddings in each bag are combined.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum EmbeddingBagMode {
    #[default]
    Sum,
    Mean,
    Max,
}

impl EmbeddingBagMode {
    /// Convert the PyTorch `mode` attribute value.
    pub fn from_attr(mode: i64) -> Option<EmbeddingBagMode> {
        match mode {
            0 => Some(EmbeddingBagMode::Sum),
            1 => Some(EmbeddingBagMode::Mean),
            2 => Some(EmbeddingBagMode::Max),
            _ => None,
        }
    }
}

/// PyTorch `embedding_bag` exported as an `ATen` node.
///
/// Inputs are the embedding table `[N, D]`, a 1-D list of indices into the
/// table and the offsets in the indices at which each bag starts.
#[derive(Debug, Default)]
pub struct EmbeddingBag {
    pub mode: EmbeddingBagMode,
}

impl InferOp for EmbeddingBag {
    fn op_type(&self) -> &str {
        "ATen"
    }

    fn infer(
        &self,
        inputs: &[Option<&ValueInfo>],
        _ctx: &mut InferCtx,
    ) -> Result<Vec<ValueInfo>, OpError> {
        check_inputs(inputs, 3, usize::MAX)?;
        let weight = required(inputs, 0)?;
        let indices = required(inputs, 1)?;
        let offsets = required(inputs, 2)?;

        check_dtype("embedding_bag", weight, DataType::is_float)?;
        check_dtype("embedding_bag", indices, DataType::is_integer)?;
        check_dtype("embedding_bag", offsets, DataType::is_integer)?;
        check_rank("weight", weight, 2)?;
        check_rank("indices", indices, 1)?;

        if offsets.ndim() > 1 {
            check_rank("offsets", offsets, 1)?;
        }

        // A scalar offset describes a single bag.
        let num_bags = offsets.shape.first().cloned().unwrap_or(Dim::Fixed(1));
        let shape = vec![num_bags, weight.shape[1].clone()];
        Ok([ValueInfo::new(weight.dtype, shape)].into())
    }
}
