use crate::core::Result;
use crate::infra::weights::LoadFormat;
use candle_core::{DType, Device, Tensor};
use std::path::Path;

/// Key/value cache pair handed over by the serving loop. Encoders never read it.
pub type KvCache = (Tensor, Tensor);

/// The surface a serving host drives: load once, then forward and sample per batch.
pub trait Model: Send + Sync {
    fn architecture(&self) -> &str;

    /// Streams checkpoint tensors into the model parameters.
    ///
    /// Takes `&mut self` so loading can never overlap an inference call.
    fn load_weights(
        &mut self,
        model_name_or_path: &str,
        cache_dir: Option<&Path>,
        load_format: LoadFormat,
        revision: Option<&str>,
    ) -> Result<usize>;

    fn forward(
        &self,
        input_ids: &Tensor,
        positions: &Tensor,
        kv_caches: &[KvCache],
        input_metadata: &InputMetadata,
    ) -> Result<Tensor>;

    fn sample(
        &self,
        hidden_states: Tensor,
        sampling_metadata: &SamplingMetadata,
    ) -> Result<Option<Tensor>>;
}

#[derive(Debug, Clone, Default)]
pub struct InputMetadata {
    /// `(batch, seq_len)` i64 slots; [`InputMetadata::UNUSED_SLOT`] marks padding.
    pub slot_mapping: Option<Tensor>,
}

impl InputMetadata {
    pub const UNUSED_SLOT: i64 = -1;

    pub fn new(slot_mapping: Tensor) -> Self {
        Self {
            slot_mapping: Some(slot_mapping),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SamplingMetadata {
    pub prompt_lens: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinearMethod {
    Unquantized,
    Quantized(String),
}

impl LinearMethod {
    pub fn name(&self) -> &str {
        match self {
            LinearMethod::Unquantized => "unquantized",
            LinearMethod::Quantized(method) => method,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoraConfig {
    pub max_lora_rank: usize,
    pub max_loras: usize,
}

#[derive(Debug, Clone)]
pub struct ModelOptions {
    pub linear_method: Option<LinearMethod>,
    pub lora_config: Option<LoraConfig>,
    /// Create parameters as constants instead of sampling random values.
    /// Checkpoint loading overwrites them anyway.
    pub skip_init: bool,
    pub device: Device,
    pub dtype: DType,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            linear_method: None,
            lora_config: None,
            skip_init: true,
            device: Device::Cpu,
            dtype: DType::F32,
        }
    }
}

impl ModelOptions {
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn with_random_init(mut self) -> Self {
        self.skip_init = false;
        self
    }
}
