use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ppgs::config::AppConfig;
use ppgs::paths::resolve_inputs;
use ppgs::{
    BatchOrchestrator, Device, FailurePolicy, InferenceEngine, ModelIdentity, PipelineConfig,
};

/// ppgs - phonetic posteriorgram extraction
///
/// Computes a per-frame phoneme probability matrix for each input audio file
/// and writes it next to the input (or to the matching output path).
#[derive(Parser, Debug)]
#[command(name = "ppgs")]
#[command(version = "0.1.0")]
#[command(about = "Compute phonetic posteriorgrams from speech audio", long_about = None)]
struct Args {
    /// Audio files or directories to process
    #[arg(long, value_name = "PATH", num_args = 1.., required = true)]
    input_paths: Vec<PathBuf>,

    /// Output files, one per resolved input (defaults to <input>.ppg)
    #[arg(long, value_name = "PATH", num_args = 1..)]
    output_paths: Vec<PathBuf>,

    /// Extensions searched for inside input directories
    #[arg(long, value_name = "EXT", num_args = 1..)]
    extensions: Vec<String>,

    /// Model checkpoint (defaults to $PPGS_CHECKPOINT or the bundled checkpoint)
    #[arg(long, value_name = "PATH")]
    checkpoint: Option<PathBuf>,

    /// Number of files processed concurrently
    #[arg(long, value_name = "N")]
    num_workers: Option<usize>,

    /// Accelerator index to run inference on
    #[arg(long, value_name = "INDEX")]
    gpu: Option<usize>,

    /// Pipeline configuration JSON file
    #[arg(long, value_name = "JSON")]
    config: Option<PathBuf>,

    /// Process every file and report failures at the end
    #[arg(long)]
    keep_going: bool,
}

impl Args {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)
                .with_context(|| format!("Failed to load pipeline config {:?}", path)),
            None => Ok(PipelineConfig::default()),
        }
    }

    fn checkpoint(&self) -> Result<PathBuf> {
        if let Some(path) = &self.checkpoint {
            return Ok(path.clone());
        }
        let app = AppConfig::from_override(None)
            .context("No --checkpoint given and no assets directory found")?;
        Ok(app.default_checkpoint())
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.pipeline_config()?;
    let workers = args.num_workers.unwrap_or(config.num_workers);
    let identity = ModelIdentity::new(args.checkpoint()?, Device::from_index(args.gpu));

    let inputs = resolve_inputs(&args.input_paths, &args.extensions)
        .context("Failed to resolve input paths")?;
    if inputs.is_empty() {
        bail!("No audio files found under {:?}", args.input_paths);
    }
    let outputs = (!args.output_paths.is_empty()).then_some(args.output_paths.as_slice());

    let engine = InferenceEngine::new(config).context("Failed to initialise inference engine")?;
    let policy = if args.keep_going {
        FailurePolicy::Isolate
    } else {
        FailurePolicy::FailFast
    };
    let report = BatchOrchestrator::new(&engine)
        .workers(workers)
        .policy(policy)
        .run_paths(&inputs, outputs, &identity)
        .context("Failed to compute ppgs")?;

    for failure in &report.failures {
        eprintln!("failed: {:?}: {}", failure.input, failure.error);
    }
    info!(written = report.completed.len(), "done");

    if !report.is_success() {
        bail!(
            "{} of {} files failed",
            report.failures.len() + report.skipped.len(),
            inputs.len()
        );
    }
    Ok(())
}
