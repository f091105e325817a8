use super::traits::{Model, ModelOptions};
use crate::core::{ModelError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

pub type ModelCreator =
    Arc<dyn Fn(&serde_json::Value, ModelOptions) -> Result<Box<dyn Model>> + Send + Sync>;

pub struct ModelRegistry {
    architectures: RwLock<HashMap<String, ModelCreator>>,
    aliases: RwLock<HashMap<String, String>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            architectures: RwLock::new(HashMap::new()),
            aliases: RwLock::new(HashMap::new()),
        }
    }

    pub fn register<N, F>(&self, name: N, creator: F)
    where
        N: Into<String>,
        F: Fn(&serde_json::Value, ModelOptions) -> Result<Box<dyn Model>> + Send + Sync + 'static,
    {
        let name = name.into();
        tracing::debug!("Registering architecture {}", name);
        self.architectures
            .write()
            .insert(name, Arc::new(creator) as ModelCreator);
    }

    pub fn register_alias<A, T>(&self, alias: A, target: T)
    where
        A: Into<String>,
        T: Into<String>,
    {
        self.aliases.write().insert(alias.into(), target.into());
    }

    pub fn get(&self, name: &str) -> Option<ModelCreator> {
        let architectures = self.architectures.read();

        if let Some(creator) = architectures.get(name) {
            return Some(Arc::clone(creator));
        }

        let aliases = self.aliases.read();
        aliases
            .get(name)
            .and_then(|target| architectures.get(target))
            .map(Arc::clone)
    }

    /// Builds a model from a raw `config.json` value, dispatching on `architectures[0]`.
    pub fn create(&self, config: &serde_json::Value, options: ModelOptions) -> Result<Box<dyn Model>> {
        let arch = config
            .get("architectures")
            .and_then(|archs| archs.as_array())
            .and_then(|archs| archs.first())
            .and_then(|arch| arch.as_str())
            .ok_or_else(|| ModelError::InvalidConfig("config has no architectures entry".into()))?;

        let creator = self
            .get(arch)
            .ok_or_else(|| ModelError::UnsupportedArchitecture(arch.to_string()))?;

        creator(config, options)
    }

    pub fn architectures(&self) -> Vec<String> {
        self.architectures.read().keys().cloned().collect()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub static REGISTRY: once_cell::sync::Lazy<ModelRegistry> =
    once_cell::sync::Lazy::new(ModelRegistry::new);

pub fn create(config: &serde_json::Value, options: ModelOptions) -> Result<Box<dyn Model>> {
    REGISTRY.create(config, options)
}

pub fn architectures() -> Vec<String> {
    REGISTRY.architectures()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{InputMetadata, KvCache, SamplingMetadata};
    use crate::infra::weights::LoadFormat;
    use candle_core::Tensor;
    use std::path::Path;

    struct TestModel;

    impl Model for TestModel {
        fn architecture(&self) -> &str {
            "test"
        }

        fn load_weights(
            &mut self,
            _model_name_or_path: &str,
            _cache_dir: Option<&Path>,
            _load_format: LoadFormat,
            _revision: Option<&str>,
        ) -> Result<usize> {
            Ok(0)
        }

        fn forward(
            &self,
            input_ids: &Tensor,
            _positions: &Tensor,
            _kv_caches: &[KvCache],
            _input_metadata: &InputMetadata,
        ) -> Result<Tensor> {
            Ok(input_ids.clone())
        }

        fn sample(
            &self,
            hidden_states: Tensor,
            _sampling_metadata: &SamplingMetadata,
        ) -> Result<Option<Tensor>> {
            Ok(Some(hidden_states))
        }
    }

    #[test]
    fn test_registry() {
        let registry = ModelRegistry::new();

        registry.register("test", |_config, _options| Ok(Box::new(TestModel) as Box<dyn Model>));
        registry.register_alias("test-alias", "test");

        assert!(registry.get("test").is_some());
        assert!(registry.get("test-alias").is_some());
        assert!(registry.get("unknown").is_none());
        assert_eq!(registry.architectures(), vec!["test".to_string()]);
    }

    #[test]
    fn test_create_dispatches_on_architectures() {
        let registry = ModelRegistry::new();
        registry.register("test", |_config, _options| Ok(Box::new(TestModel) as Box<dyn Model>));

        let config = serde_json::json!({ "architectures": ["test"] });
        let model = registry.create(&config, ModelOptions::default()).unwrap();
        assert_eq!(model.architecture(), "test");

        let unknown = serde_json::json!({ "architectures": ["GPT2LMHeadModel"] });
        assert!(matches!(
            registry.create(&unknown, ModelOptions::default()),
            Err(ModelError::UnsupportedArchitecture(_))
        ));

        let missing = serde_json::json!({ "hidden_size": 8 });
        assert!(matches!(
            registry.create(&missing, ModelOptions::default()),
            Err(ModelError::InvalidConfig(_))
        ));
    }
}
