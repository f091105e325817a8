use crate::core::model::config::XlmRobertaConfig;
use crate::core::model::encoder::{Encoder, EncoderFlags, EncoderOutput};
use crate::core::model::traits::KvCache;
use crate::core::tensor::first_token;
use crate::core::Result;
use candle_core::{DType, Tensor};
use candle_nn::{Activation, Embedding, Init, LayerNorm, Linear, Module, VarBuilder};

/// How freshly created parameters are filled.
#[derive(Debug, Clone, Copy)]
struct ParamInit {
    skip: bool,
    stdev: f64,
}

impl ParamInit {
    fn weight(&self) -> Init {
        if self.skip {
            Init::Const(0.)
        } else {
            Init::Randn {
                mean: 0.,
                stdev: self.stdev,
            }
        }
    }
}

fn linear(vb: VarBuilder, in_dim: usize, out_dim: usize, init: ParamInit) -> Result<Linear> {
    let weight = vb.get_with_hints((out_dim, in_dim), "weight", init.weight())?;
    let bias = vb.get_with_hints(out_dim, "bias", Init::Const(0.))?;
    Ok(Linear::new(weight, Some(bias)))
}

fn embedding(vb: VarBuilder, count: usize, dim: usize, init: ParamInit) -> Result<Embedding> {
    let weight = vb.get_with_hints((count, dim), "weight", init.weight())?;
    Ok(Embedding::new(weight, dim))
}

fn layer_norm(vb: VarBuilder, size: usize, eps: f64) -> Result<LayerNorm> {
    let weight = vb.get_with_hints(size, "weight", Init::Const(1.))?;
    let bias = vb.get_with_hints(size, "bias", Init::Const(0.))?;
    Ok(LayerNorm::new(weight, bias, eps))
}

struct RobertaEmbeddings {
    word_embeddings: Embedding,
    position_embeddings: Embedding,
    token_type_embeddings: Embedding,
    layer_norm: LayerNorm,
    token_type_ids: Tensor,
    padding_idx: u32,
}

impl RobertaEmbeddings {
    fn new(config: &XlmRobertaConfig, vb: VarBuilder, init: ParamInit) -> Result<Self> {
        let hidden = config.hidden_size;
        let token_type_ids = Tensor::zeros(
            (1, config.max_position_embeddings),
            DType::U32,
            vb.device(),
        )?;

        Ok(Self {
            word_embeddings: embedding(vb.pp("word_embeddings"), config.vocab_size, hidden, init)?,
            position_embeddings: embedding(
                vb.pp("position_embeddings"),
                config.max_position_embeddings,
                hidden,
                init,
            )?,
            token_type_embeddings: embedding(
                vb.pp("token_type_embeddings"),
                config.type_vocab_size,
                hidden,
                init,
            )?,
            layer_norm: layer_norm(vb.pp("LayerNorm"), hidden, config.layer_norm_eps)?,
            token_type_ids,
            padding_idx: config.pad_token_id,
        })
    }

    /// Padding tokens keep `padding_idx`; real tokens count up from `padding_idx + 1`.
    fn position_ids_from_input_ids(&self, input_ids: &Tensor) -> Result<Tensor> {
        let mask = input_ids.ne(self.padding_idx)?.to_dtype(DType::F32)?;
        let positions = mask
            .cumsum(1)?
            .mul(&mask)?
            .affine(1., self.padding_idx as f64)?;
        Ok(positions.to_dtype(DType::U32)?)
    }

    fn forward(
        &self,
        input_ids: &Tensor,
        token_type_ids: &Tensor,
        position_ids: Option<&Tensor>,
    ) -> Result<Tensor> {
        let position_ids = match position_ids {
            Some(ids) => ids.clone(),
            None => self.position_ids_from_input_ids(input_ids)?,
        };

        let embeddings = self
            .word_embeddings
            .forward(input_ids)?
            .add(&self.token_type_embeddings.forward(token_type_ids)?)?
            .add(&self.position_embeddings.forward(&position_ids)?)?;
        Ok(self.layer_norm.forward(&embeddings)?)
    }
}

struct LayerOutput {
    hidden_states: Tensor,
    attention_probs: Tensor,
    present: KvCache,
}

struct RobertaLayer {
    query: Linear,
    key: Linear,
    value: Linear,
    attention_dense: Linear,
    attention_norm: LayerNorm,
    intermediate: Linear,
    activation: Activation,
    output_dense: Linear,
    output_norm: LayerNorm,
    num_heads: usize,
    head_dim: usize,
}

impl RobertaLayer {
    fn new(config: &XlmRobertaConfig, vb: VarBuilder, init: ParamInit) -> Result<Self> {
        let hidden = config.hidden_size;
        let attention = vb.pp("attention");
        let self_attention = attention.pp("self");

        Ok(Self {
            query: linear(self_attention.pp("query"), hidden, hidden, init)?,
            key: linear(self_attention.pp("key"), hidden, hidden, init)?,
            value: linear(self_attention.pp("value"), hidden, hidden, init)?,
            attention_dense: linear(attention.pp("output").pp("dense"), hidden, hidden, init)?,
            attention_norm: layer_norm(
                attention.pp("output").pp("LayerNorm"),
                hidden,
                config.layer_norm_eps,
            )?,
            intermediate: linear(
                vb.pp("intermediate").pp("dense"),
                hidden,
                config.intermediate_size,
                init,
            )?,
            activation: config.hidden_act.clone(),
            output_dense: linear(
                vb.pp("output").pp("dense"),
                config.intermediate_size,
                hidden,
                init,
            )?,
            output_norm: layer_norm(vb.pp("output").pp("LayerNorm"), hidden, config.layer_norm_eps)?,
            num_heads: config.num_attention_heads,
            head_dim: config.head_dim(),
        })
    }

    fn split_heads(&self, xs: Tensor, batch: usize, seq_len: usize) -> Result<Tensor> {
        Ok(xs
            .reshape((batch, seq_len, self.num_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?)
    }

    fn forward(
        &self,
        hidden_states: &Tensor,
        attention_mask: &Tensor,
        head_mask: Option<&Tensor>,
    ) -> Result<LayerOutput> {
        let (batch, seq_len, hidden) = hidden_states.dims3()?;

        let query = self.split_heads(self.query.forward(hidden_states)?, batch, seq_len)?;
        let key = self.split_heads(self.key.forward(hidden_states)?, batch, seq_len)?;
        let value = self.split_heads(self.value.forward(hidden_states)?, batch, seq_len)?;

        let scores = (query.matmul(&key.t()?)? / (self.head_dim as f64).sqrt())?;
        let scores = scores.broadcast_add(&attention_mask.to_dtype(scores.dtype())?)?;
        let mut probs = candle_nn::ops::softmax_last_dim(&scores)?;
        if let Some(mask) = head_mask {
            probs = probs.broadcast_mul(&mask.to_dtype(probs.dtype())?)?;
        }

        let context = probs
            .matmul(&value)?
            .transpose(1, 2)?
            .reshape((batch, seq_len, hidden))?;

        let attention_output = self
            .attention_norm
            .forward(&self.attention_dense.forward(&context)?.add(hidden_states)?)?;

        let intermediate = self
            .activation
            .forward(&self.intermediate.forward(&attention_output)?)?;
        let output = self
            .output_norm
            .forward(&self.output_dense.forward(&intermediate)?.add(&attention_output)?)?;

        Ok(LayerOutput {
            hidden_states: output,
            attention_probs: probs,
            present: (key, value),
        })
    }
}

struct RobertaPooler {
    dense: Linear,
}

impl RobertaPooler {
    fn forward(&self, sequence_output: &Tensor) -> Result<Tensor> {
        let first = first_token(sequence_output)?;
        Ok(self.dense.forward(&first)?.tanh()?)
    }
}

/// Post-LayerNorm RoBERTa encoder with the checkpoint parameter layout
/// (`embeddings.*`, `encoder.layer.{i}.*`, `pooler.dense.*`).
pub struct RobertaEncoder {
    embeddings: RobertaEmbeddings,
    layers: Vec<RobertaLayer>,
    pooler: Option<RobertaPooler>,
}

impl RobertaEncoder {
    pub fn new(config: &XlmRobertaConfig, vb: VarBuilder, skip_init: bool) -> Result<Self> {
        let init = ParamInit {
            skip: skip_init,
            stdev: config.initializer_range,
        };

        let embeddings = RobertaEmbeddings::new(config, vb.pp("embeddings"), init)?;

        let layers_vb = vb.pp("encoder").pp("layer");
        let layers = (0..config.num_hidden_layers)
            .map(|i| RobertaLayer::new(config, layers_vb.pp(i), init))
            .collect::<Result<Vec<_>>>()?;

        let pooler = if config.add_pooling_layer {
            let dense = linear(
                vb.pp("pooler").pp("dense"),
                config.hidden_size,
                config.hidden_size,
                init,
            )?;
            Some(RobertaPooler { dense })
        } else {
            None
        };

        Ok(Self {
            embeddings,
            layers,
            pooler,
        })
    }
}

impl Encoder for RobertaEncoder {
    fn num_hidden_layers(&self) -> usize {
        self.layers.len()
    }

    fn token_type_ids(&self) -> Option<&Tensor> {
        Some(&self.embeddings.token_type_ids)
    }

    fn embed(
        &self,
        input_ids: &Tensor,
        token_type_ids: &Tensor,
        position_ids: Option<&Tensor>,
    ) -> Result<Tensor> {
        self.embeddings.forward(input_ids, token_type_ids, position_ids)
    }

    fn contextualize(
        &self,
        embeddings: &Tensor,
        attention_mask: &Tensor,
        head_mask: &[Option<Tensor>],
        flags: EncoderFlags,
    ) -> Result<EncoderOutput> {
        let mut hidden_states = embeddings.clone();
        let mut all_hidden_states = flags.output_hidden_states.then(Vec::new);
        let mut all_attentions = flags.output_attentions.then(Vec::new);
        let mut presents = flags.use_cache.then(Vec::new);

        for (i, layer) in self.layers.iter().enumerate() {
            if let Some(states) = all_hidden_states.as_mut() {
                states.push(hidden_states.clone());
            }

            let layer_head_mask = head_mask.get(i).and_then(Option::as_ref);
            let output = layer.forward(&hidden_states, attention_mask, layer_head_mask)?;
            hidden_states = output.hidden_states;

            if let Some(attentions) = all_attentions.as_mut() {
                attentions.push(output.attention_probs);
            }
            if let Some(presents) = presents.as_mut() {
                presents.push(output.present);
            }
        }

        if let Some(states) = all_hidden_states.as_mut() {
            states.push(hidden_states.clone());
        }

        Ok(EncoderOutput {
            last_hidden_state: hidden_states,
            hidden_states: all_hidden_states,
            attentions: all_attentions,
            past_key_values: presents,
        })
    }

    fn pool(&self, sequence_output: &Tensor) -> Result<Option<Tensor>> {
        self.pooler
            .as_ref()
            .map(|pooler| pooler.forward(sequence_output))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tensor::extended_attention_mask;
    use candle_core::Device;
    use candle_nn::VarMap;

    fn tiny_config() -> XlmRobertaConfig {
        XlmRobertaConfig::builder()
            .vocab_size(16)
            .hidden_size(8)
            .intermediate_size(16)
            .num_heads(2)
            .num_layers(2)
            .max_position_embeddings(20)
            .build()
    }

    #[test]
    fn test_parameter_names_match_checkpoint_layout() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        RobertaEncoder::new(&tiny_config(), vb, true).unwrap();

        let data = varmap.data().lock().unwrap();
        for name in [
            "embeddings.word_embeddings.weight",
            "embeddings.position_embeddings.weight",
            "embeddings.token_type_embeddings.weight",
            "embeddings.LayerNorm.weight",
            "encoder.layer.0.attention.self.query.weight",
            "encoder.layer.1.attention.output.LayerNorm.bias",
            "encoder.layer.1.intermediate.dense.weight",
            "encoder.layer.0.output.dense.bias",
            "pooler.dense.weight",
        ] {
            assert!(data.contains_key(name), "missing {name}");
        }
        // 5 embedding tensors, 16 per layer, 2 pooler tensors
        assert_eq!(data.len(), 5 + 16 * 2 + 2);
        assert!(!data.contains_key("embeddings.token_type_ids"));
    }

    #[test]
    fn test_skip_init_creates_constant_weights() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        RobertaEncoder::new(&tiny_config(), vb, true).unwrap();

        let data = varmap.data().lock().unwrap();
        let query = data["encoder.layer.0.attention.self.query.weight"]
            .as_tensor()
            .abs()
            .unwrap()
            .sum_all()
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        assert_eq!(query, 0.0);

        let norm = data["embeddings.LayerNorm.weight"].as_tensor().to_vec1::<f32>().unwrap();
        assert!(norm.iter().all(|&w| w == 1.0));
    }

    #[test]
    fn test_position_ids_skip_padding() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let encoder = RobertaEncoder::new(&tiny_config(), vb, true).unwrap();

        let ids = Tensor::new(&[[0u32, 7, 9, 1, 1]], &Device::Cpu).unwrap();
        let positions = encoder.embeddings.position_ids_from_input_ids(&ids).unwrap();
        assert_eq!(positions.to_vec2::<u32>().unwrap(), vec![vec![2, 3, 4, 1, 1]]);
    }

    #[test]
    fn test_contextualize_collects_requested_outputs() {
        let config = tiny_config();
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let encoder = RobertaEncoder::new(&config, vb, false).unwrap();

        let ids = Tensor::new(&[[0u32, 5, 6, 2], [0, 4, 2, 1]], &Device::Cpu).unwrap();
        let token_types = Tensor::zeros((2, 4), DType::U32, &Device::Cpu).unwrap();
        let mask = Tensor::new(&[[1u32, 1, 1, 1], [1, 1, 1, 0]], &Device::Cpu).unwrap();
        let mask = extended_attention_mask(&mask, &[2, 4]).unwrap();

        let embeddings = encoder.embed(&ids, &token_types, None).unwrap();
        let flags = EncoderFlags {
            output_attentions: true,
            output_hidden_states: true,
            return_dict: true,
            use_cache: false,
        };
        let head_mask = vec![None, None];
        let output = encoder
            .contextualize(&embeddings, &mask, &head_mask, flags)
            .unwrap();

        assert_eq!(output.last_hidden_state.dims(), &[2, 4, 8]);
        assert_eq!(output.hidden_states.as_ref().unwrap().len(), 3);
        let attentions = output.attentions.unwrap();
        assert_eq!(attentions.len(), 2);
        assert_eq!(attentions[0].dims(), &[2, 2, 4, 4]);
        assert!(output.past_key_values.is_none());

        // masked key position gets (almost) no attention
        let row = attentions[0]
            .get(1)
            .unwrap()
            .get(0)
            .unwrap()
            .get(0)
            .unwrap()
            .to_vec1::<f32>()
            .unwrap();
        assert!(row[3] < 1e-6);

        let pooled = encoder.pool(&output.last_hidden_state).unwrap().unwrap();
        assert_eq!(pooled.dims(), &[2, 8]);
    }
}
