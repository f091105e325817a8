pub mod error;
pub mod model;
pub mod tensor;

pub use error::ModelError;
pub use model::{
    Encoder, EncoderFlags, InputMetadata, KvCache, LinearMethod, LoraConfig, Model,
    ModelOptions, ModelOutput, ModelRegistry, OutputTransform, SamplingMetadata,
    XlmRobertaConfig, XlmRobertaModel,
};

pub type Result<T> = std::result::Result<T, ModelError>;
