pub mod traits;
pub mod config;
pub mod encoder;
pub mod output;
pub mod registry;
pub mod architectures;

pub use traits::*;
pub use config::{XlmRobertaConfig, XlmRobertaConfigBuilder};
pub use encoder::{Encoder, EncoderFlags, EncoderOutput, HeadMask};
pub use output::{DenseEmbedding, LastHiddenState, ModelOutput, OutputTransform};
pub use registry::ModelRegistry;
pub use architectures::{RobertaEncoder, XlmRobertaModel};

/// Architecture name found in `config.json` under `architectures`.
pub const XLM_ROBERTA_ARCHITECTURE: &str = "XLMRobertaModel";

pub fn init_models() {
    registry::REGISTRY.register(XLM_ROBERTA_ARCHITECTURE, |config, options| {
        let config = XlmRobertaConfig::from_value(config.clone())?;
        let model = XlmRobertaModel::new(config, options)?;
        Ok(Box::new(model) as Box<dyn Model>)
    });
    registry::REGISTRY.register_alias("RobertaModel", XLM_ROBERTA_ARCHITECTURE);
}
