use crate::core::{ModelError, Result};
use candle_nn::Activation;
use serde::Deserialize;
use std::path::Path;

/// Hyperparameters of an XLM-RoBERTa checkpoint, as found in its `config.json`.
///
/// Missing keys fall back to the upstream `XLMRobertaConfig` defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct XlmRobertaConfig {
    pub vocab_size: usize,
    pub hidden_size: usize,
    pub num_hidden_layers: usize,
    pub num_attention_heads: usize,
    pub intermediate_size: usize,
    pub hidden_act: Activation,
    pub max_position_embeddings: usize,
    pub type_vocab_size: usize,
    pub initializer_range: f64,
    pub layer_norm_eps: f64,
    pub pad_token_id: u32,
    pub is_decoder: bool,
    pub use_cache: bool,
    pub output_attentions: bool,
    pub output_hidden_states: bool,
    #[serde(rename = "return_dict")]
    pub use_return_dict: bool,
    #[serde(rename = "_name_or_path")]
    pub name_or_path: String,
    pub add_pooling_layer: bool,
}

impl Default for XlmRobertaConfig {
    fn default() -> Self {
        Self {
            vocab_size: 30522,
            hidden_size: 768,
            num_hidden_layers: 12,
            num_attention_heads: 12,
            intermediate_size: 3072,
            hidden_act: Activation::Gelu,
            max_position_embeddings: 512,
            type_vocab_size: 2,
            initializer_range: 0.02,
            layer_norm_eps: 1e-12,
            pad_token_id: 1,
            is_decoder: false,
            use_cache: true,
            output_attentions: false,
            output_hidden_states: false,
            use_return_dict: true,
            name_or_path: String::new(),
            add_pooling_layer: true,
        }
    }
}

impl XlmRobertaConfig {
    pub fn builder() -> XlmRobertaConfigBuilder {
        XlmRobertaConfigBuilder::new()
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let config: Self = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    pub fn head_dim(&self) -> usize {
        self.hidden_size / self.num_attention_heads
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_attention_heads == 0 || self.hidden_size % self.num_attention_heads != 0 {
            return Err(ModelError::InvalidConfig(format!(
                "hidden_size {} is not a multiple of num_attention_heads {}",
                self.hidden_size, self.num_attention_heads
            )));
        }
        if (self.pad_token_id as usize) >= self.max_position_embeddings {
            return Err(ModelError::InvalidConfig(format!(
                "pad_token_id {} leaves no room in {} position embeddings",
                self.pad_token_id, self.max_position_embeddings
            )));
        }
        Ok(())
    }
}

pub struct XlmRobertaConfigBuilder {
    config: XlmRobertaConfig,
}

impl XlmRobertaConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: XlmRobertaConfig::default(),
        }
    }

    pub fn vocab_size(mut self, size: usize) -> Self {
        self.config.vocab_size = size;
        self
    }

    pub fn hidden_size(mut self, size: usize) -> Self {
        self.config.hidden_size = size;
        self
    }

    pub fn intermediate_size(mut self, size: usize) -> Self {
        self.config.intermediate_size = size;
        self
    }

    pub fn num_layers(mut self, n: usize) -> Self {
        self.config.num_hidden_layers = n;
        self
    }

    pub fn num_heads(mut self, n: usize) -> Self {
        self.config.num_attention_heads = n;
        self
    }

    pub fn max_position_embeddings(mut self, n: usize) -> Self {
        self.config.max_position_embeddings = n;
        self
    }

    pub fn is_decoder(mut self, is_decoder: bool) -> Self {
        self.config.is_decoder = is_decoder;
        self
    }

    pub fn output_hidden_states(mut self, enabled: bool) -> Self {
        self.config.output_hidden_states = enabled;
        self
    }

    pub fn output_attentions(mut self, enabled: bool) -> Self {
        self.config.output_attentions = enabled;
        self
    }

    pub fn add_pooling_layer(mut self, enabled: bool) -> Self {
        self.config.add_pooling_layer = enabled;
        self
    }

    pub fn name_or_path(mut self, name: impl Into<String>) -> Self {
        self.config.name_or_path = name.into();
        self
    }

    pub fn build(self) -> XlmRobertaConfig {
        self.config
    }
}

impl Default for XlmRobertaConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = XlmRobertaConfig::builder()
            .hidden_size(32)
            .num_heads(4)
            .num_layers(2)
            .name_or_path("BAAI/bge-m3")
            .build();

        assert_eq!(config.hidden_size, 32);
        assert_eq!(config.head_dim(), 8);
        assert_eq!(config.num_hidden_layers, 2);
        assert_eq!(config.name_or_path, "BAAI/bge-m3");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_json() {
        let json = serde_json::json!({
            "_name_or_path": "xlm-roberta-base",
            "architectures": ["XLMRobertaModel"],
            "hidden_act": "gelu",
            "hidden_size": 1024,
            "intermediate_size": 4096,
            "max_position_embeddings": 8194,
            "num_attention_heads": 16,
            "num_hidden_layers": 24,
            "vocab_size": 250002,
            "layer_norm_eps": 1e-05,
            "type_vocab_size": 1
        });

        let config = XlmRobertaConfig::from_value(json).unwrap();
        assert_eq!(config.name_or_path, "xlm-roberta-base");
        assert_eq!(config.hidden_act, Activation::Gelu);
        assert_eq!(config.num_hidden_layers, 24);
        assert_eq!(config.type_vocab_size, 1);
        assert_eq!(config.pad_token_id, 1);
        assert!(config.use_return_dict);
        assert!(!config.is_decoder);
    }

    #[test]
    fn test_config_rejects_uneven_heads() {
        let config = XlmRobertaConfig::builder().hidden_size(30).num_heads(4).build();
        let err = config.validate().unwrap_err();
        assert!(err.is_config_error());
    }
}
