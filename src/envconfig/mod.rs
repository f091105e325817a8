use std::env;
use std::path::PathBuf;

pub const DEFAULT_ENDPOINT: &str = "https://huggingface.co";

/// Hub settings taken from the same variables the Hugging Face tooling reads.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub hub_cache: PathBuf,
    pub endpoint: String,
    pub offline: bool,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        let hub_cache = env::var("HF_HUB_CACHE")
            .map(|path| expand_home(&path))
            .unwrap_or_else(|_| {
                let home = env::var("HF_HOME").unwrap_or_else(|_| "~/.cache/huggingface".to_string());
                expand_home(&home).join("hub")
            });

        Self {
            hub_cache,
            endpoint: env::var("HF_ENDPOINT")
                .map(|e| e.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string()),
            offline: env::var("HF_HUB_OFFLINE")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
        }
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

pub fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
