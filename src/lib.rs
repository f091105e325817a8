pub mod core;
pub mod envconfig;
pub mod infra;
pub mod progress;
pub mod utils;

pub mod model {
    pub use crate::core::model::*;
}

pub use core::{
    Encoder, EncoderFlags, InputMetadata, KvCache, LinearMethod, LoraConfig, Model, ModelError,
    ModelOptions, ModelOutput, ModelRegistry, OutputTransform, Result, SamplingMetadata,
    XlmRobertaConfig, XlmRobertaModel,
};

pub use infra::{default_weight_loader, hf_model_weights_iterator, LoadFormat, WeightsIterator};
