use super::hub;
use crate::core::{ModelError, Result};
use candle_core::{Device, Tensor, Var};
use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadFormat {
    /// Safetensors when the checkpoint has them, pytorch pickles otherwise.
    #[default]
    Auto,
    Safetensors,
    Pt,
    /// Load nothing; parameters keep their constructed values.
    Dummy,
}

impl FromStr for LoadFormat {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(LoadFormat::Auto),
            "safetensors" => Ok(LoadFormat::Safetensors),
            "pt" => Ok(LoadFormat::Pt),
            "dummy" => Ok(LoadFormat::Dummy),
            _ => Err(ModelError::UnsupportedLoadFormat(s.to_string())),
        }
    }
}

impl fmt::Display for LoadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoadFormat::Auto => "auto",
            LoadFormat::Safetensors => "safetensors",
            LoadFormat::Pt => "pt",
            LoadFormat::Dummy => "dummy",
        };
        f.write_str(name)
    }
}

/// Lazily yields `(name, tensor)` pairs, one checkpoint file at a time.
///
/// Not restartable. After an error the iterator is exhausted.
pub struct WeightsIterator {
    files: VecDeque<PathBuf>,
    pending: std::vec::IntoIter<(String, Tensor)>,
}

impl WeightsIterator {
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self {
            files: files.into(),
            pending: Vec::new().into_iter(),
        }
    }
}

impl Iterator for WeightsIterator {
    type Item = Result<(String, Tensor)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.pending.next() {
                return Some(Ok(item));
            }

            let path = self.files.pop_front()?;
            match read_weight_file(&path) {
                Ok(tensors) => self.pending = tensors.into_iter(),
                Err(e) => {
                    self.files.clear();
                    return Some(Err(e));
                }
            }
        }
    }
}

fn read_weight_file(path: &Path) -> Result<Vec<(String, Tensor)>> {
    tracing::debug!("Reading weights from {}", path.display());

    let is_safetensors = path
        .extension()
        .is_some_and(|ext| ext == "safetensors");

    if is_safetensors {
        let mut tensors: Vec<_> = candle_core::safetensors::load(path, &Device::Cpu)?
            .into_iter()
            .collect();
        tensors.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(tensors)
    } else {
        Ok(candle_core::pickle::read_all(path)?)
    }
}

/// Finds the checkpoint files for `model_name_or_path` and streams their tensors.
pub fn hf_model_weights_iterator(
    model_name_or_path: &str,
    cache_dir: Option<&Path>,
    load_format: LoadFormat,
    revision: Option<&str>,
) -> Result<WeightsIterator> {
    let files = hub::resolve_weight_files(model_name_or_path, cache_dir, load_format, revision)?;
    tracing::info!(
        "Found {} weight file(s) for {}",
        files.len(),
        model_name_or_path
    );
    Ok(WeightsIterator::new(files))
}

/// Copies `loaded` into `param` in place. Shapes must match exactly; dtype and
/// device follow the parameter.
pub fn default_weight_loader(name: &str, param: &Var, loaded: &Tensor) -> Result<()> {
    if param.dims() != loaded.dims() {
        return Err(ModelError::ShapeMismatch {
            name: name.to_string(),
            expected: param.dims().to_vec(),
            actual: loaded.dims().to_vec(),
        });
    }

    let loaded = loaded.to_dtype(param.dtype())?.to_device(param.device())?;
    param.set(&loaded)?;
    Ok(())
}
