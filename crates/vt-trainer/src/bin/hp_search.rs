use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use vt_data::CaptionDataset;
use vt_model::{
    FramePreprocessor, ModelFactory, SpecialTokens, DEFAULT_DECODER, DEFAULT_ENCODER,
    DEFAULT_FRAMES_PER_VIDEO,
};
use vt_trainer::{CaptionTrainer, SearchSettings, TrainingArguments};
use vt_types::Device;

/// Everything the launch needs, assembled once at startup.
struct LaunchConfig {
    dataset_dir: PathBuf,
    output_dir: PathBuf,
    subsample_ratio: usize,
    n_trials: usize,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            dataset_dir: PathBuf::from("/data/video-caption/processed/frames8_pt1"),
            output_dir: PathBuf::from("training/hp_tuning"),
            subsample_ratio: 20,
            n_trials: 25,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = LaunchConfig::default();
    let device = Device::detect();
    info!("Running on {}", device);

    let dataset = CaptionDataset::load_from_disk(&config.dataset_dir)?
        .subsample_one_in(config.subsample_ratio)?;
    info!(
        "Loaded {} train / {} validation examples from {}",
        dataset.train.len(),
        dataset.validation.len(),
        config.dataset_dir.display()
    );

    let factory = ModelFactory::new(DEFAULT_ENCODER, DEFAULT_DECODER, device)
        .with_special_tokens(SpecialTokens::gpt2().with_pad_aliased_to_eos())
        .with_preprocessor(FramePreprocessor::videomae_base(DEFAULT_FRAMES_PER_VIDEO));

    let args = TrainingArguments {
        output_dir: config.output_dir.clone(),
        ..TrainingArguments::default()
    };
    let trainer = Arc::new(CaptionTrainer::new(args, factory, dataset)?);

    let settings = SearchSettings {
        n_trials: config.n_trials,
        ..SearchSettings::default()
    };
    let outcome = trainer.hyperparameter_search(settings).await?;

    let best = outcome.report.require_best()?;
    info!(
        "Best trial {}: {} = {:.4}, parameters {:?}",
        best.number,
        outcome.report.metric,
        best.objective.unwrap_or(f64::NAN),
        best.parameters
    );
    Ok(())
}
