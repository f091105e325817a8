use super::encoder::EncoderOutput;
use super::traits::KvCache;
use crate::core::tensor::{first_token, l2_normalize};
use crate::core::Result;
use candle_core::Tensor;

/// Model name whose deployments expect dense sentence embeddings.
pub const BGE_M3: &str = "BAAI/bge-m3";

/// Per-chunk result: the encoder output plus the pooled first token.
#[derive(Debug, Clone)]
pub struct ModelOutput {
    pub last_hidden_state: Tensor,
    pub pooler_output: Option<Tensor>,
    pub hidden_states: Option<Vec<Tensor>>,
    pub attentions: Option<Vec<Tensor>>,
    pub past_key_values: Option<Vec<KvCache>>,
}

impl ModelOutput {
    pub fn new(encoder_output: EncoderOutput, pooler_output: Option<Tensor>) -> Self {
        Self {
            last_hidden_state: encoder_output.last_hidden_state,
            pooler_output,
            hidden_states: encoder_output.hidden_states,
            attentions: encoder_output.attentions,
            past_key_values: encoder_output.past_key_values,
        }
    }
}

/// Maps one chunk's output to the tensor handed back to the serving loop.
pub trait OutputTransform: Send + Sync {
    fn name(&self) -> &'static str;

    /// `attention_mask` is the 0/1 `(B, L)` mask for the chunk.
    fn apply(&self, output: ModelOutput, attention_mask: &Tensor) -> Result<Tensor>;
}

/// Keeps the raw `(B, L, H)` last hidden state.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastHiddenState;

impl OutputTransform for LastHiddenState {
    fn name(&self) -> &'static str {
        "last_hidden_state"
    }

    fn apply(&self, output: ModelOutput, _attention_mask: &Tensor) -> Result<Tensor> {
        Ok(output.last_hidden_state)
    }
}

/// First-token embedding, L2-normalized: `(B, H)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenseEmbedding;

impl OutputTransform for DenseEmbedding {
    fn name(&self) -> &'static str {
        "dense"
    }

    fn apply(&self, output: ModelOutput, _attention_mask: &Tensor) -> Result<Tensor> {
        let dense = first_token(&output.last_hidden_state)?;
        l2_normalize(&dense)
    }
}

pub fn for_model(name_or_path: &str) -> Box<dyn OutputTransform> {
    if name_or_path == BGE_M3 {
        Box::new(DenseEmbedding)
    } else {
        Box::new(LastHiddenState)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device, D};

    fn output(hidden: Tensor) -> ModelOutput {
        ModelOutput {
            last_hidden_state: hidden,
            pooler_output: None,
            hidden_states: None,
            attentions: None,
            past_key_values: None,
        }
    }

    #[test]
    fn test_transform_selection() {
        assert_eq!(for_model(BGE_M3).name(), "dense");
        assert_eq!(for_model("xlm-roberta-base").name(), "last_hidden_state");
        assert_eq!(for_model("baai/bge-m3").name(), "last_hidden_state");
    }

    #[test]
    fn test_dense_embedding_is_unit_norm() {
        let device = Device::Cpu;
        let hidden = Tensor::randn(0f32, 1.0, (3, 5, 8), &device).unwrap();
        let mask = Tensor::ones((3, 5), DType::U32, &device).unwrap();

        let dense = DenseEmbedding.apply(output(hidden), &mask).unwrap();
        assert_eq!(dense.dims(), &[3, 8]);

        let norms = dense
            .sqr()
            .unwrap()
            .sum(D::Minus1)
            .unwrap()
            .sqrt()
            .unwrap()
            .to_vec1::<f32>()
            .unwrap();
        for norm in norms {
            assert!((norm - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_last_hidden_state_keeps_shape() {
        let device = Device::Cpu;
        let hidden = Tensor::zeros((2, 4, 6), DType::F32, &device).unwrap();
        let mask = Tensor::ones((2, 4), DType::U32, &device).unwrap();
        let out = LastHiddenState.apply(output(hidden), &mask).unwrap();
        assert_eq!(out.dims(), &[2, 4, 6]);
    }
}
