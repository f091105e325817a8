use super::roberta::RobertaEncoder;
use crate::core::model::config::XlmRobertaConfig;
use crate::core::model::encoder::{Encoder, EncoderFlags};
use crate::core::model::output::{self, ModelOutput, OutputTransform};
use crate::core::model::traits::{
    InputMetadata, KvCache, LinearMethod, Model, ModelOptions, SamplingMetadata,
};
use crate::core::model::XLM_ROBERTA_ARCHITECTURE;
use crate::core::tensor::{attention_mask_from_slots, extended_attention_mask, head_mask};
use crate::core::{ModelError, Result};
use crate::infra::hub;
use crate::infra::weights::{default_weight_loader, hf_model_weights_iterator, LoadFormat};
use crate::progress::ChunkProgress;
use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use std::ops::Range;
use std::path::Path;

/// Rows run through the encoder at once. Fixed; not derived from memory.
pub const CHUNK_SIZE: usize = 12;

/// Splits `total` rows into consecutive ranges of at most `chunk_size`.
pub fn chunk_ranges(total: usize, chunk_size: usize) -> Vec<Range<usize>> {
    (0..total)
        .step_by(chunk_size.max(1))
        .map(|start| start..(start + chunk_size).min(total))
        .collect()
}

pub struct XlmRobertaModel {
    config: XlmRobertaConfig,
    linear_method: Option<LinearMethod>,
    encoder: Box<dyn Encoder>,
    params: VarMap,
    output_transform: Box<dyn OutputTransform>,
}

impl XlmRobertaModel {
    pub fn new(config: XlmRobertaConfig, options: ModelOptions) -> Result<Self> {
        if let Some(method) = &options.linear_method {
            if *method != LinearMethod::Unquantized {
                return Err(ModelError::UnsupportedQuantization {
                    architecture: XLM_ROBERTA_ARCHITECTURE.to_string(),
                    method: method.name().to_string(),
                });
            }
        }
        if options.lora_config.is_some() {
            return Err(ModelError::UnsupportedLora(XLM_ROBERTA_ARCHITECTURE.to_string()));
        }
        config.validate()?;

        let params = VarMap::new();
        let vb = VarBuilder::from_varmap(&params, options.dtype, &options.device);
        let encoder = RobertaEncoder::new(&config, vb, options.skip_init)?;

        tracing::info!(
            "Built {} ({} layers, hidden {}, skip_init={}) on {:?}",
            XLM_ROBERTA_ARCHITECTURE,
            config.num_hidden_layers,
            config.hidden_size,
            options.skip_init,
            options.device
        );

        Ok(Self::from_parts(config, options.linear_method, Box::new(encoder), params))
    }

    /// Assembles an adapter around an already built encoder and its parameter map.
    pub fn from_parts(
        config: XlmRobertaConfig,
        linear_method: Option<LinearMethod>,
        encoder: Box<dyn Encoder>,
        params: VarMap,
    ) -> Self {
        let output_transform = output::for_model(&config.name_or_path);
        Self {
            config,
            linear_method,
            encoder,
            params,
            output_transform,
        }
    }

    /// Resolves `config.json` and weights for `model_id`, then builds and loads the model.
    pub fn from_pretrained(
        model_id: &str,
        cache_dir: Option<&Path>,
        load_format: LoadFormat,
        revision: Option<&str>,
        options: ModelOptions,
    ) -> Result<Self> {
        let config_path = hub::resolve_file(model_id, "config.json", cache_dir, revision)?;
        let mut config = XlmRobertaConfig::from_file(&config_path)?;
        config.name_or_path = model_id.to_string();

        let mut model = Self::new(config, options)?;
        model.load_weights(model_id, cache_dir, load_format, revision)?;
        Ok(model)
    }

    pub fn with_output_transform(mut self, transform: Box<dyn OutputTransform>) -> Self {
        self.output_transform = transform;
        self
    }

    pub fn config(&self) -> &XlmRobertaConfig {
        &self.config
    }

    pub fn linear_method(&self) -> Option<&LinearMethod> {
        self.linear_method.as_ref()
    }

    pub fn output_transform(&self) -> &dyn OutputTransform {
        self.output_transform.as_ref()
    }

    /// Parameter tensors sorted by name. They share storage with the model.
    pub fn named_parameters(&self) -> Vec<(String, Tensor)> {
        let params = self.params.data().lock().unwrap_or_else(|e| e.into_inner());
        let mut named: Vec<_> = params
            .iter()
            .map(|(name, var)| (name.clone(), var.as_tensor().clone()))
            .collect();
        named.sort_by(|a, b| a.0.cmp(&b.0));
        named
    }

    pub fn load_weights(
        &mut self,
        model_name_or_path: &str,
        cache_dir: Option<&Path>,
        load_format: LoadFormat,
        revision: Option<&str>,
    ) -> Result<usize> {
        tracing::info!("Loading {} weights from {}", load_format, model_name_or_path);
        let weights =
            hf_model_weights_iterator(model_name_or_path, cache_dir, load_format, revision)?;
        self.load_weights_from(weights)
    }

    /// Copies every yielded tensor into the parameter of the same name.
    ///
    /// Stops at the first unknown name or shape mismatch. Parameters copied
    /// before the failure keep their new values.
    pub fn load_weights_from<I>(&mut self, weights: I) -> Result<usize>
    where
        I: IntoIterator<Item = Result<(String, Tensor)>>,
    {
        let params = self.params.data().lock().unwrap_or_else(|e| e.into_inner());
        let mut loaded = 0;

        for item in weights {
            let (name, tensor) = item?;
            let param = params
                .get(&name)
                .ok_or_else(|| ModelError::MissingParameter(name.clone()))?;
            default_weight_loader(&name, param, &tensor)?;
            loaded += 1;
        }

        tracing::info!("Loaded {} tensors into {} parameters", loaded, params.len());
        Ok(loaded)
    }

    pub fn forward(
        &self,
        input_ids: &Tensor,
        _positions: &Tensor,
        _kv_caches: &[KvCache],
        input_metadata: &InputMetadata,
    ) -> Result<Tensor> {
        let total = input_ids.dim(0)?;
        if total == 0 {
            return Err(ModelError::EmptyBatch);
        }

        let ranges = chunk_ranges(total, CHUNK_SIZE);
        let progress = ChunkProgress::new("Inference Embeddings", total, ranges.len());
        let mut outputs = Vec::with_capacity(ranges.len());

        for range in ranges {
            let ids = input_ids.narrow(0, range.start, range.len())?;
            let slots = input_metadata
                .slot_mapping
                .as_ref()
                .map(|slots| slots.narrow(0, range.start, range.len()))
                .transpose()?;

            outputs.push(self.forward_chunk(&ids, slots.as_ref())?);
            progress.inc();
        }
        progress.finish();

        Ok(Tensor::cat(&outputs, 0)?)
    }

    /// Runs one chunk and applies the output transform.
    pub fn forward_chunk(&self, input_ids: &Tensor, slot_mapping: Option<&Tensor>) -> Result<Tensor> {
        let (output, attention_mask) = self.encode_chunk(input_ids, slot_mapping)?;
        self.output_transform.apply(output, &attention_mask)
    }

    /// Runs one chunk through the encoder, returning the full output and the 0/1 mask used.
    pub fn encode_chunk(
        &self,
        input_ids: &Tensor,
        slot_mapping: Option<&Tensor>,
    ) -> Result<(ModelOutput, Tensor)> {
        let (batch_size, seq_length) = input_ids.dims2()?;
        let input_shape = [batch_size, seq_length];
        let device = input_ids.device();

        let attention_mask = match slot_mapping {
            Some(slots) => attention_mask_from_slots(slots)?,
            None => Tensor::ones((batch_size, seq_length), DType::U32, device)?,
        };
        let flags = EncoderFlags::from_config(&self.config);
        let token_type_ids = self.token_type_ids(batch_size, seq_length, device)?;

        let extended_mask = extended_attention_mask(&attention_mask, &input_shape)?;
        let head_mask = head_mask(None, self.encoder.num_hidden_layers(), false)?;

        let embedding_output = self.encoder.embed(input_ids, &token_type_ids, None)?;
        let encoder_output =
            self.encoder
                .contextualize(&embedding_output, &extended_mask, &head_mask, flags)?;
        let pooled_output = self.encoder.pool(&encoder_output.last_hidden_state)?;

        Ok((ModelOutput::new(encoder_output, pooled_output), attention_mask))
    }

    fn token_type_ids(&self, batch_size: usize, seq_length: usize, device: &Device) -> Result<Tensor> {
        match self.encoder.token_type_ids() {
            Some(buffered) => Ok(buffered
                .narrow(1, 0, seq_length)?
                .broadcast_as((batch_size, seq_length))?
                .contiguous()?),
            None => Ok(Tensor::zeros((batch_size, seq_length), DType::U32, device)?),
        }
    }

    /// Encoders produce no tokens; hidden states pass straight through.
    pub fn sample(
        &self,
        hidden_states: Tensor,
        _sampling_metadata: &SamplingMetadata,
    ) -> Result<Option<Tensor>> {
        Ok(Some(hidden_states))
    }
}

impl Model for XlmRobertaModel {
    fn architecture(&self) -> &str {
        XLM_ROBERTA_ARCHITECTURE
    }

    fn load_weights(
        &mut self,
        model_name_or_path: &str,
        cache_dir: Option<&Path>,
        load_format: LoadFormat,
        revision: Option<&str>,
    ) -> Result<usize> {
        XlmRobertaModel::load_weights(self, model_name_or_path, cache_dir, load_format, revision)
    }

    fn forward(
        &self,
        input_ids: &Tensor,
        positions: &Tensor,
        kv_caches: &[KvCache],
        input_metadata: &InputMetadata,
    ) -> Result<Tensor> {
        XlmRobertaModel::forward(self, input_ids, positions, kv_caches, input_metadata)
    }

    fn sample(
        &self,
        hidden_states: Tensor,
        sampling_metadata: &SamplingMetadata,
    ) -> Result<Option<Tensor>> {
        XlmRobertaModel::sample(self, hidden_states, sampling_metadata)
    }
}
