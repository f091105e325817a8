mod cmd;
mod format;

use clap::{Parser, Subcommand};
use std::process;
use tracing_subscriber::EnvFilter;
use xlmr_adapter::LoadFormat;

#[derive(Parser)]
#[command(name = "xlmr")]
#[command(version)]
#[command(about = "Load and run XLM-RoBERTa encoder checkpoints", long_about = None)]
struct Cli {
    /// Hugging Face cache directory; defaults to HF_HUB_CACHE or ~/.cache/huggingface/hub.
    #[arg(long, global = true)]
    cache_dir: Option<String>,

    /// auto, safetensors, pt or dummy.
    #[arg(long, global = true, default_value = "auto")]
    load_format: LoadFormat,

    #[arg(long, global = true)]
    revision: Option<String>,

    /// Stay on the CPU even when an accelerator is available.
    #[arg(long, global = true)]
    cpu: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the configuration and parameter shapes of a model.
    Inspect { model: String },
    /// Encode token id sequences and print the first values of each row.
    Embed {
        model: String,
        /// Comma separated token ids; repeat for more sequences.
        #[arg(long = "ids", required = true)]
        ids: Vec<String>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let args = cmd::LoadArgs {
        cache_dir: cmd::cache_dir_arg(cli.cache_dir.as_deref()),
        load_format: cli.load_format,
        revision: cli.revision,
        cpu: cli.cpu,
    };

    let result = match cli.command {
        Commands::Inspect { model } => cmd::inspect(&model, &args),
        Commands::Embed { model, ids } => cmd::embed(&model, &ids, &args),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}
