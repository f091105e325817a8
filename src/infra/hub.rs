use super::weights::LoadFormat;
use crate::core::{ModelError, Result};
use crate::envconfig::EnvConfig;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

/// Somewhere checkpoint files can be looked up by name.
pub trait FileSource {
    /// `Ok(None)` when the file does not exist at the source.
    fn get(&self, file: &str) -> Result<Option<PathBuf>>;

    /// Files already available without fetching anything.
    fn list(&self) -> Result<Vec<PathBuf>>;
}

pub struct LocalDir {
    root: PathBuf,
}

impl LocalDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl FileSource for LocalDir {
    fn get(&self, file: &str) -> Result<Option<PathBuf>> {
        let path = self.root.join(file);
        Ok(path.is_file().then_some(path))
    }

    fn list(&self) -> Result<Vec<PathBuf>> {
        list_files(&self.root)
    }
}

/// A model repository mirrored into the Hugging Face cache layout:
/// `{cache}/models--{org}--{name}/snapshots/{revision}/`.
pub struct HubRepo {
    model_id: String,
    revision: String,
    snapshot_dir: PathBuf,
    endpoint: String,
    offline: bool,
    client: Client,
}

impl HubRepo {
    pub fn new(model_id: &str, cache_dir: &Path, revision: &str, env: &EnvConfig) -> Self {
        let repo_dir = cache_dir.join(format!("models--{}", model_id.replace('/', "--")));

        // refs/{revision} holds the commit hash the snapshot is stored under.
        let snapshot = fs::read_to_string(repo_dir.join("refs").join(revision))
            .map(|commit| commit.trim().to_string())
            .unwrap_or_else(|_| revision.to_string());

        Self {
            model_id: model_id.to_string(),
            revision: revision.to_string(),
            snapshot_dir: repo_dir.join("snapshots").join(snapshot),
            endpoint: env.endpoint.clone(),
            offline: env.offline,
            client: Client::new(),
        }
    }

    pub fn snapshot_dir(&self) -> &Path {
        &self.snapshot_dir
    }

    fn url(&self, file: &str) -> String {
        format!(
            "{}/{}/resolve/{}/{}",
            self.endpoint, self.model_id, self.revision, file
        )
    }

    fn download(&self, file: &str, dest: &Path) -> Result<bool> {
        let url = self.url(file);
        tracing::info!("Downloading {}", url);

        let response = self.client.get(&url).send()?;
        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!("{} not found upstream", url);
            return Ok(false);
        }
        let mut response = response.error_for_status()?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let partial = dest.with_extension("incomplete");
        let mut out = fs::File::create(&partial)?;
        response.copy_to(&mut out)?;
        fs::rename(&partial, dest)?;
        Ok(true)
    }
}

impl FileSource for HubRepo {
    fn get(&self, file: &str) -> Result<Option<PathBuf>> {
        let path = self.snapshot_dir.join(file);
        if path.is_file() {
            return Ok(Some(path));
        }
        if self.offline {
            tracing::debug!("Offline; {} is not cached", file);
            return Ok(None);
        }
        Ok(self.download(file, &path)?.then_some(path))
    }

    fn list(&self) -> Result<Vec<PathBuf>> {
        if self.snapshot_dir.is_dir() {
            list_files(&self.snapshot_dir)
        } else {
            Ok(Vec::new())
        }
    }
}

fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Local directories are used as-is; anything else is treated as a hub model id.
pub fn source_for(
    model_name_or_path: &str,
    cache_dir: Option<&Path>,
    revision: Option<&str>,
) -> Box<dyn FileSource> {
    let path = Path::new(model_name_or_path);
    if path.is_dir() {
        return Box::new(LocalDir::new(path));
    }

    let env = EnvConfig::from_env();
    let cache_dir = cache_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| env.hub_cache.clone());
    Box::new(HubRepo::new(
        model_name_or_path,
        &cache_dir,
        revision.unwrap_or("main"),
        &env,
    ))
}

pub fn resolve_file(
    model_name_or_path: &str,
    file: &str,
    cache_dir: Option<&Path>,
    revision: Option<&str>,
) -> Result<PathBuf> {
    source_for(model_name_or_path, cache_dir, revision)
        .get(file)?
        .ok_or_else(|| ModelError::WeightsNotFound(format!("{}/{}", model_name_or_path, file)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WeightKind {
    Safetensors,
    Pickle,
}

impl WeightKind {
    fn index_file(self) -> &'static str {
        match self {
            WeightKind::Safetensors => "model.safetensors.index.json",
            WeightKind::Pickle => "pytorch_model.bin.index.json",
        }
    }

    fn single_file(self) -> &'static str {
        match self {
            WeightKind::Safetensors => "model.safetensors",
            WeightKind::Pickle => "pytorch_model.bin",
        }
    }

    fn matches(self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        match self {
            WeightKind::Safetensors => ext == "safetensors",
            WeightKind::Pickle => {
                (ext == "bin" || ext == "pt")
                    && path.file_name().is_some_and(|name| name != "training_args.bin")
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ShardIndex {
    weight_map: HashMap<String, String>,
}

fn shard_files(index_path: &Path) -> Result<BTreeSet<String>> {
    let index: ShardIndex = serde_json::from_str(&fs::read_to_string(index_path)?)?;
    Ok(index.weight_map.into_values().collect())
}

fn find_weight_files(source: &dyn FileSource, kind: WeightKind) -> Result<Vec<PathBuf>> {
    if let Some(index_path) = source.get(kind.index_file())? {
        return shard_files(&index_path)?
            .iter()
            .map(|shard| {
                source
                    .get(shard)?
                    .ok_or_else(|| ModelError::WeightsNotFound(shard.clone()))
            })
            .collect();
    }

    if let Some(path) = source.get(kind.single_file())? {
        return Ok(vec![path]);
    }

    Ok(source
        .list()?
        .into_iter()
        .filter(|path| kind.matches(path))
        .collect())
}

/// Checkpoint files to read for `load_format`, in a stable order.
pub fn resolve_weight_files(
    model_name_or_path: &str,
    cache_dir: Option<&Path>,
    load_format: LoadFormat,
    revision: Option<&str>,
) -> Result<Vec<PathBuf>> {
    let kinds: &[WeightKind] = match load_format {
        LoadFormat::Dummy => return Ok(Vec::new()),
        LoadFormat::Auto => &[WeightKind::Safetensors, WeightKind::Pickle],
        LoadFormat::Safetensors => &[WeightKind::Safetensors],
        LoadFormat::Pt => &[WeightKind::Pickle],
    };

    let path = Path::new(model_name_or_path);
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let source = source_for(model_name_or_path, cache_dir, revision);
    for kind in kinds {
        let files = find_weight_files(source.as_ref(), *kind)?;
        if !files.is_empty() {
            return Ok(files);
        }
    }

    Err(ModelError::WeightsNotFound(model_name_or_path.to_string()))
}
