use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("{architecture} does not currently support quantization (requested: {method})")]
    UnsupportedQuantization { architecture: String, method: String },

    #[error("{0} does not currently support deployments with LoRA adapters")]
    UnsupportedLora(String),

    #[error("unsupported load format: {0}")]
    UnsupportedLoadFormat(String),

    #[error("unsupported architecture: {0}")]
    UnsupportedArchitecture(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("parameter {0} not found in model")]
    MissingParameter(String),

    #[error("no weight files found for {0}")]
    WeightsNotFound(String),

    #[error("wrong shape for input_ids (shape {input_shape:?}) or attention_mask (shape {mask_shape:?})")]
    InvalidMaskShape {
        input_shape: Vec<usize>,
        mask_shape: Vec<usize>,
    },

    #[error("input batch is empty")]
    EmptyBatch,

    #[error("head mask must have rank 1 or 2, got shape {0:?}")]
    InvalidHeadMask(Vec<usize>),

    #[error("shape mismatch for {name}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error(transparent)]
    Candle(#[from] candle_core::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl ModelError {
    /// True for errors raised while validating construction options.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            ModelError::UnsupportedQuantization { .. }
                | ModelError::UnsupportedLora(_)
                | ModelError::UnsupportedLoadFormat(_)
                | ModelError::UnsupportedArchitecture(_)
                | ModelError::InvalidConfig(_)
        )
    }

    pub fn is_shape_error(&self) -> bool {
        matches!(
            self,
            ModelError::InvalidMaskShape { .. }
                | ModelError::EmptyBatch
                | ModelError::InvalidHeadMask(_)
                | ModelError::ShapeMismatch { .. }
        )
    }
}
