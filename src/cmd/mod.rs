use crate::format::{human_bytes, human_params, shape};
use anyhow::{bail, Context, Result};
use candle_core::{DType, Tensor};
use std::path::{Path, PathBuf};
use xlmr_adapter::model::XLM_ROBERTA_ARCHITECTURE;
use xlmr_adapter::utils::{pad_batch, select_device};
use xlmr_adapter::{InputMetadata, LoadFormat, ModelOptions, XlmRobertaModel};

/// Where and how to fetch a checkpoint. Shared by every subcommand.
pub struct LoadArgs {
    pub cache_dir: Option<PathBuf>,
    pub load_format: LoadFormat,
    pub revision: Option<String>,
    pub cpu: bool,
}

impl LoadArgs {
    fn load(&self, model: &str, load_format: LoadFormat) -> Result<XlmRobertaModel> {
        let device = select_device(self.cpu)?;
        let options = ModelOptions::default().with_device(device);

        XlmRobertaModel::from_pretrained(
            model,
            self.cache_dir.as_deref(),
            load_format,
            self.revision.as_deref(),
            options,
        )
        .with_context(|| format!("failed to load {}", model))
    }
}

pub fn inspect(model: &str, args: &LoadArgs) -> Result<()> {
    // Only the shapes are needed, so skip reading the weights.
    let model = args.load(model, LoadFormat::Dummy)?;
    let config = model.config();

    println!("  architecture        {}", XLM_ROBERTA_ARCHITECTURE);
    println!("  output              {}", model.output_transform().name());
    println!("  hidden size         {}", config.hidden_size);
    println!("  layers              {}", config.num_hidden_layers);
    println!("  attention heads     {}", config.num_attention_heads);
    println!("  intermediate size   {}", config.intermediate_size);
    println!("  vocab size          {}", config.vocab_size);
    println!("  max positions       {}", config.max_position_embeddings);
    println!();

    let params = model.named_parameters();
    let mut total = 0;
    let mut bytes = 0;
    for (name, tensor) in &params {
        total += tensor.elem_count();
        bytes += tensor.elem_count() * tensor.dtype().size_in_bytes();
        println!("  {:<60} {}", name, shape(tensor.dims()));
    }
    println!();
    println!(
        "  {} tensors, {} parameters ({})",
        params.len(),
        human_params(total),
        human_bytes(bytes as u64)
    );

    Ok(())
}

/// Parses `0,581,2`-style token id lists.
pub fn parse_ids(raw: &str) -> Result<Vec<u32>> {
    let ids = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u32>().with_context(|| format!("invalid token id {:?}", s)))
        .collect::<Result<Vec<_>>>()?;
    if ids.is_empty() {
        bail!("empty token id list");
    }
    Ok(ids)
}

pub fn embed(model: &str, ids: &[String], args: &LoadArgs) -> Result<()> {
    let sequences = ids
        .iter()
        .map(|raw| parse_ids(raw))
        .collect::<Result<Vec<_>>>()?;

    let model = args.load(model, args.load_format)?;
    let device = select_device(args.cpu)?;

    let (ids, slots, seq_len) = pad_batch(&sequences, model.config().pad_token_id);
    let batch = sequences.len();
    let input_ids = Tensor::from_vec(ids, (batch, seq_len), &device)?;
    let slot_mapping = Tensor::from_vec(slots, (batch, seq_len), &device)?;
    let positions = Tensor::zeros((batch, seq_len), DType::U32, &device)?;

    let output = model.forward(
        &input_ids,
        &positions,
        &[],
        &InputMetadata::new(slot_mapping),
    )?;

    println!("{} {}", model.output_transform().name(), shape(output.dims()));
    let rows = output.flatten_from(1)?.to_dtype(DType::F32)?.to_vec2::<f32>()?;
    for row in &rows {
        println!("{:?}, ... (total {})", &row[..5.min(row.len())], row.len());
    }

    Ok(())
}

pub fn cache_dir_arg(raw: Option<&str>) -> Option<PathBuf> {
    raw.map(|dir| xlmr_adapter::envconfig::expand_home(dir))
        .filter(|dir| dir != Path::new(""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ids() {
        assert_eq!(parse_ids("0, 581,2").unwrap(), vec![0, 581, 2]);
        assert_eq!(parse_ids("0,2,").unwrap(), vec![0, 2]);
        assert!(parse_ids("0,x").is_err());
        assert!(parse_ids(" , ").is_err());
    }

    #[test]
    fn test_cache_dir_arg() {
        assert_eq!(cache_dir_arg(None), None);
        assert_eq!(cache_dir_arg(Some("/tmp/hf")), Some(PathBuf::from("/tmp/hf")));
    }
}
