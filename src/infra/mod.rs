pub mod hub;
pub mod weights;

pub use hub::{resolve_file, resolve_weight_files, FileSource, HubRepo, LocalDir};
pub use weights::{default_weight_loader, hf_model_weights_iterator, LoadFormat, WeightsIterator};
