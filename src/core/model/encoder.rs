use super::config::XlmRobertaConfig;
use super::traits::KvCache;
use crate::core::Result;
use candle_core::Tensor;

/// One optional mask per hidden layer, each broadcastable to `(batch, heads, seq, seq)`.
pub type HeadMask = Vec<Option<Tensor>>;

/// Output switches resolved from the static config. Request data never sets them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncoderFlags {
    pub output_attentions: bool,
    pub output_hidden_states: bool,
    pub return_dict: bool,
    pub use_cache: bool,
}

impl EncoderFlags {
    pub fn from_config(config: &XlmRobertaConfig) -> Self {
        Self {
            output_attentions: config.output_attentions,
            output_hidden_states: config.output_hidden_states,
            return_dict: config.use_return_dict,
            use_cache: config.is_decoder && config.use_cache,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EncoderOutput {
    pub last_hidden_state: Tensor,
    /// Embedding output followed by every layer output, when requested.
    pub hidden_states: Option<Vec<Tensor>>,
    pub attentions: Option<Vec<Tensor>>,
    pub past_key_values: Option<Vec<KvCache>>,
}

/// An encoder family: embed token ids, contextualize them, optionally pool.
///
/// The adapter owns masking, chunking and output shaping; implementations only
/// do the math.
pub trait Encoder: Send + Sync {
    fn num_hidden_layers(&self) -> usize;

    /// Buffered `(1, max_positions)` token type ids, if the embeddings keep one.
    fn token_type_ids(&self) -> Option<&Tensor>;

    /// `position_ids: None` lets the encoder derive positions from the ids.
    fn embed(
        &self,
        input_ids: &Tensor,
        token_type_ids: &Tensor,
        position_ids: Option<&Tensor>,
    ) -> Result<Tensor>;

    /// `attention_mask` is the additive 4D mask; it may be in a narrower dtype
    /// than the hidden states.
    fn contextualize(
        &self,
        embeddings: &Tensor,
        attention_mask: &Tensor,
        head_mask: &[Option<Tensor>],
        flags: EncoderFlags,
    ) -> Result<EncoderOutput>;

    fn pool(&self, sequence_output: &Tensor) -> Result<Option<Tensor>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_use_cache_only_for_decoders() {
        let encoder = XlmRobertaConfig::default();
        assert!(encoder.use_cache);
        assert!(!EncoderFlags::from_config(&encoder).use_cache);

        let decoder = XlmRobertaConfig::builder().is_decoder(true).build();
        assert!(EncoderFlags::from_config(&decoder).use_cache);
    }

    #[test]
    fn test_flags_follow_config() {
        let config = XlmRobertaConfig::builder()
            .output_attentions(true)
            .output_hidden_states(true)
            .build();
        let flags = EncoderFlags::from_config(&config);
        assert!(flags.output_attentions);
        assert!(flags.output_hidden_states);
        assert!(flags.return_dict);
    }
}
