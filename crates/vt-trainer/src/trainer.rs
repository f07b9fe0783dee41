//! The caption fine-tuning trainer and its hyperparameter search entrypoint.

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use vt_data::{BatchLoader, CaptionDataset, Split};
use vt_model::ModelFactory;
use vt_optimizer::{
    HostResources, LocalTuneDriver, ObjectiveDirection, SchedulerDecision, SearchOutcome, Trial,
    TrialContext, TrialEvaluator, TrialResources, TrialResult, TuneDriver, TuneRequest,
};
use vt_types::{internal_error, VtResult};

use crate::args::{IntervalStrategy, TrainingArguments};
use crate::backend::{EpochContext, EpochMetrics, SurrogateBackend, TrainingBackend};
use crate::checkpoint::{write_checkpoint, TrainerState};
use crate::hyper::{caption_search_space, CaptionHyperparameters};
use crate::schedule::LrSchedule;

/// File name of the per-trial CSV table written at the end of a search.
pub const TRIAL_TABLE_FILE: &str = "tune_results.csv";
/// File name of the best-trial JSON summary written at the end of a search.
pub const BEST_TRIAL_FILE: &str = "best_trial.json";

/// Settings for a hyperparameter search run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Number of trials to draw from the search space.
    pub n_trials: usize,
    /// Whether the objective is minimized or maximized.
    pub direction: ObjectiveDirection,
    /// Seed for the searcher. `None` leaves the draw order nondeterministic.
    pub seed: Option<u64>,
    /// Halt unpromising trials at rung boundaries instead of running every
    /// trial to the final epoch.
    pub early_stopping: bool,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            n_trials: 25,
            direction: ObjectiveDirection::Minimize,
            seed: None,
            early_stopping: true,
        }
    }
}

/// Fine-tunes one caption model per trial and reports epoch-level
/// evaluation losses back to the scheduler.
///
/// The trainer owns the dataset splits and the model factory. Each trial
/// builds a fresh model, derives its learning-rate schedule from the trial
/// parameters, and walks the epoch loop with the configured backend.
pub struct CaptionTrainer {
    args: TrainingArguments,
    factory: ModelFactory,
    backend: Arc<dyn TrainingBackend>,
    driver: Arc<dyn TuneDriver>,
    train: Arc<Split>,
    validation: Arc<Split>,
}

impl CaptionTrainer {
    pub fn new(
        args: TrainingArguments,
        factory: ModelFactory,
        dataset: CaptionDataset,
    ) -> VtResult<Self> {
        args.validate()?;
        factory.validate()?;
        Ok(Self {
            args,
            factory,
            backend: Arc::new(SurrogateBackend),
            driver: Arc::new(LocalTuneDriver::new()),
            train: Arc::new(dataset.train),
            validation: Arc::new(dataset.validation),
        })
    }

    /// Swap the epoch backend. The default backend scores configurations
    /// analytically; a device-backed implementation plugs in here.
    pub fn with_backend(mut self, backend: Arc<dyn TrainingBackend>) -> Self {
        self.backend = backend;
        self
    }

    /// Swap the search driver. The default runs trials in-process.
    pub fn with_driver(mut self, driver: Arc<dyn TuneDriver>) -> Self {
        self.driver = driver;
        self
    }

    pub fn args(&self) -> &TrainingArguments {
        &self.args
    }

    /// Run the full search through the configured driver and persist the
    /// trial table and best-trial summary under the output directory.
    pub async fn hyperparameter_search(
        self: Arc<Self>,
        settings: SearchSettings,
    ) -> VtResult<SearchOutcome> {
        let host = HostResources::detect();
        info!(
            "Tuning {} trials with the {} driver on {} CPUs / {} GPUs",
            settings.n_trials,
            self.driver.name(),
            host.num_cpus,
            host.num_gpus
        );

        let request = TuneRequest {
            space: caption_search_space(),
            n_trials: settings.n_trials,
            metric: "eval_loss".to_string(),
            direction: settings.direction,
            resources: TrialResources::whole_host(&host),
            seed: settings.seed,
            early_stopping: settings.early_stopping,
            evaluator: Arc::clone(&self) as Arc<dyn TrialEvaluator>,
        };
        let outcome = self.driver.run(request).await?;

        fs::create_dir_all(&self.args.output_dir)?;
        outcome
            .report
            .save_csv(&self.args.output_dir.join(TRIAL_TABLE_FILE))?;
        match outcome.report.best_trial() {
            Some(best) => {
                let json = serde_json::to_string_pretty(best)?;
                fs::write(self.args.output_dir.join(BEST_TRIAL_FILE), json)?;
                info!(
                    "Best trial {} reached {} = {:.4}",
                    best.number,
                    outcome.report.metric,
                    best.objective.unwrap_or(f64::NAN)
                );
            }
            None => warn!("Search finished without a completed trial"),
        }
        Ok(outcome)
    }
}

#[async_trait]
impl TrialEvaluator for CaptionTrainer {
    async fn evaluate(&self, trial: &Trial, ctx: TrialContext) -> VtResult<TrialResult> {
        let started = Instant::now();
        let hp = CaptionHyperparameters::from_params(&trial.parameters)?;
        // Each trial fine-tunes a fresh model instance.
        let model = self.factory.build()?;

        let total_steps = self.args.total_steps(self.train.len());
        let schedule = LrSchedule::new(
            hp.lr_scheduler_type,
            hp.learning_rate,
            hp.warmup_ratio,
            total_steps,
        );
        let train_loader = BatchLoader::new(self.args.per_device_train_batch_size)
            .with_workers(self.args.dataloader_num_workers);
        let eval_loader = BatchLoader::new(self.args.per_device_eval_batch_size);

        info!(
            "Trial {}: lr={:.3e} scheduler={} warmup_ratio={:.3} weight_decay={:.2e}",
            trial.number, hp.learning_rate, hp.lr_scheduler_type, hp.warmup_ratio, hp.weight_decay
        );

        let mut global_step = 0u64;
        let mut next_save = self.args.save_steps.max(1);
        let mut last: Option<EpochMetrics> = None;
        let mut epochs_completed = 0u32;
        let mut early_stopped = false;

        for epoch in 1..=self.args.num_train_epochs {
            let epoch_ctx = EpochContext {
                model: &model,
                hyperparameters: &hp,
                schedule: &schedule,
                epoch,
                global_step,
            };
            let metrics = self.backend.run_epoch(
                &epoch_ctx,
                train_loader.batches(&self.train),
                eval_loader.batches(&self.validation),
            )?;
            global_step = metrics.global_step;
            epochs_completed = epoch;

            if self.args.logging_strategy == IntervalStrategy::Epoch {
                info!(
                    "Trial {} epoch {}/{}: train_loss={:.4} eval_loss={:.4} lr={:.3e}",
                    trial.number,
                    epoch,
                    self.args.num_train_epochs,
                    metrics.train_loss,
                    metrics.eval_loss,
                    metrics.learning_rate
                );
            }

            if self.args.save_strategy == IntervalStrategy::Steps && global_step >= next_save {
                let state = TrainerState {
                    run_id: trial.run_id,
                    trial_number: trial.number,
                    model_id: model.id,
                    epoch,
                    global_step,
                    eval_loss: Some(metrics.eval_loss),
                    learning_rate: metrics.learning_rate,
                    saved_at: chrono::Utc::now(),
                };
                write_checkpoint(&self.args.output_dir, &state)?;
                while next_save <= global_step {
                    next_save += self.args.save_steps.max(1);
                }
            }

            let eval_loss = metrics.eval_loss;
            last = Some(metrics);

            if self.args.eval_strategy == IntervalStrategy::Epoch
                && ctx.report(u64::from(epoch), eval_loss) == SchedulerDecision::Stop
            {
                info!(
                    "Trial {} stopped by the scheduler after epoch {}",
                    trial.number, epoch
                );
                early_stopped = epoch < self.args.num_train_epochs;
                break;
            }
        }

        let last = match last {
            Some(metrics) => metrics,
            None => return Err(internal_error!("trial {} ran zero epochs", trial.number)),
        };

        let mut metrics = HashMap::new();
        metrics.insert("eval_loss".to_string(), last.eval_loss);
        metrics.insert("train_loss".to_string(), last.train_loss);
        metrics.insert("learning_rate".to_string(), last.learning_rate);

        Ok(TrialResult {
            trial_id: trial.id,
            objective: last.eval_loss,
            metrics,
            parameters: trial.parameters.clone(),
            epochs_completed,
            duration_seconds: Some(started.elapsed().as_secs()),
            early_stopped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use vt_data::{CaptionExample, DatasetManifest, FrameShape};
    use vt_model::{FramePreprocessor, SpecialTokens, DEFAULT_DECODER, DEFAULT_ENCODER};
    use vt_types::{Device, TrainError, TuneError, VtError};

    fn tiny_split(name: &str, n: usize) -> Split {
        let examples = (0..n)
            .map(|i| CaptionExample {
                pixel_values: vec![0.1; 4],
                labels: vec![i as i64, 1, 2],
            })
            .collect();
        Split::new(name, examples)
    }

    fn tiny_dataset() -> CaptionDataset {
        CaptionDataset {
            manifest: DatasetManifest::new("tiny", FrameShape::new(2, 3, 4, 4), 3),
            train: tiny_split("train", 8),
            validation: tiny_split("validation", 4),
        }
    }

    fn factory() -> ModelFactory {
        ModelFactory::new(DEFAULT_ENCODER, DEFAULT_DECODER, Device::Cpu)
            .with_special_tokens(SpecialTokens::gpt2().with_pad_aliased_to_eos())
            .with_preprocessor(FramePreprocessor::videomae_base(2))
    }

    #[test]
    fn new_rejects_invalid_arguments() {
        let args = TrainingArguments {
            num_train_epochs: 0,
            ..TrainingArguments::default()
        };
        let err = CaptionTrainer::new(args, factory(), tiny_dataset())
            .err()
            .unwrap();
        assert!(matches!(
            err,
            VtError::Train(TrainError::InvalidArguments { .. })
        ));
    }

    #[test]
    fn new_keeps_arguments_accessible() {
        let args = TrainingArguments {
            num_train_epochs: 3,
            ..TrainingArguments::default()
        };
        let trainer = CaptionTrainer::new(args, factory(), tiny_dataset()).unwrap();
        assert_eq!(trainer.args().num_train_epochs, 3);
    }

    #[test]
    fn default_settings_match_the_tuning_harness() {
        let settings = SearchSettings::default();
        assert_eq!(settings.n_trials, 25);
        assert_eq!(settings.direction, ObjectiveDirection::Minimize);
        assert!(settings.early_stopping);
        assert!(settings.seed.is_none());
    }

    #[tokio::test]
    async fn search_over_empty_trial_budget_has_no_best() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = Arc::new(
            CaptionTrainer::new(
                TrainingArguments {
                    output_dir: dir.path().join("out"),
                    ..TrainingArguments::default()
                },
                factory(),
                tiny_dataset(),
            )
            .unwrap(),
        );
        let settings = SearchSettings {
            n_trials: 0,
            seed: Some(7),
            ..SearchSettings::default()
        };
        let outcome = trainer.hyperparameter_search(settings).await.unwrap();
        assert!(outcome.best.is_none());
        assert!(outcome.report.trials.is_empty());
        assert!(matches!(
            outcome.report.require_best(),
            Err(VtError::Tune(TuneError::NoCompletedTrials))
        ));
    }
}
