// VidTune caption trainer
// Per-trial fine-tuning loop and the hyperparameter search harness

pub mod args;
pub mod backend;
pub mod checkpoint;
pub mod hyper;
pub mod schedule;
pub mod trainer;

// Re-export the trainer surface for direct use
pub use args::{IntervalStrategy, TrainingArguments};
pub use backend::{EpochContext, EpochMetrics, SurrogateBackend, TrainingBackend};
pub use checkpoint::{
    checkpoint_dir, list_checkpoints, read_trainer_state, write_checkpoint, TrainerState,
    TRAINER_STATE_FILE,
};
pub use hyper::{caption_search_space, CaptionHyperparameters, SchedulerKind};
pub use schedule::LrSchedule;
pub use trainer::{CaptionTrainer, SearchSettings, BEST_TRIAL_FILE, TRIAL_TABLE_FILE};

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::Utc;
    use uuid::Uuid;

    use vt_data::{CaptionDataset, CaptionExample, DatasetManifest, FrameShape, Split};
    use vt_model::{
        FramePreprocessor, ModelFactory, SpecialTokens, DEFAULT_DECODER, DEFAULT_ENCODER,
    };
    use vt_optimizer::{
        ObjectiveDirection, RunReport, SearchOutcome, TrialRow, TrialStatus, TuneDriver,
        TuneRequest,
    };
    use vt_types::{Device, VtResult};

    fn tiny_split(name: &str, n: usize) -> Split {
        let examples = (0..n)
            .map(|i| CaptionExample {
                pixel_values: vec![0.5; 8],
                labels: vec![i as i64, 2, 3],
            })
            .collect();
        Split::new(name, examples)
    }

    fn synthetic_dataset(train: usize, validation: usize) -> CaptionDataset {
        CaptionDataset {
            manifest: DatasetManifest::new("synthetic", FrameShape::new(2, 3, 4, 4), 3),
            train: tiny_split("train", train),
            validation: tiny_split("validation", validation),
        }
    }

    fn factory() -> ModelFactory {
        ModelFactory::new(DEFAULT_ENCODER, DEFAULT_DECODER, Device::Cpu)
            .with_special_tokens(SpecialTokens::gpt2().with_pad_aliased_to_eos())
            .with_preprocessor(FramePreprocessor::videomae_base(2))
    }

    /// Trainer over a tiny dataset: two train steps per epoch, five epochs,
    /// serial trials on a whole-host resource request.
    fn search_trainer(output_dir: &Path, save_steps: u64) -> Arc<CaptionTrainer> {
        let args = TrainingArguments {
            output_dir: output_dir.to_path_buf(),
            save_steps,
            ..TrainingArguments::default()
        };
        Arc::new(CaptionTrainer::new(args, factory(), synthetic_dataset(8, 4)).unwrap())
    }

    /// Records requests instead of running them.
    struct StubDriver {
        calls: AtomicUsize,
        seen: Mutex<Vec<(usize, Vec<String>)>>,
    }

    impl StubDriver {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TuneDriver for StubDriver {
        async fn run(&self, request: TuneRequest) -> VtResult<SearchOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let names = request
                .space
                .parameters
                .iter()
                .map(|p| p.name.clone())
                .collect();
            self.seen.lock().unwrap().push((request.n_trials, names));
            Ok(SearchOutcome {
                best: None,
                report: RunReport {
                    run_id: Uuid::new_v4(),
                    metric: request.metric,
                    direction: request.direction,
                    searcher: "stub".to_string(),
                    scheduler: "stub".to_string(),
                    started_at: Utc::now(),
                    finished_at: Utc::now(),
                    trials: Vec::new(),
                },
            })
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    #[tokio::test]
    async fn launch_pipeline_hands_the_driver_one_request() {
        let dataset = synthetic_dataset(100, 40).subsample_one_in(20).unwrap();
        assert_eq!(dataset.train.len(), 5);
        assert_eq!(dataset.validation.len(), 2);

        let dir = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubDriver::new());
        let args = TrainingArguments {
            output_dir: dir.path().join("out"),
            ..TrainingArguments::default()
        };
        let trainer = Arc::new(
            CaptionTrainer::new(args, factory(), dataset)
                .unwrap()
                .with_driver(Arc::clone(&stub) as Arc<dyn TuneDriver>),
        );
        trainer
            .hyperparameter_search(SearchSettings::default())
            .await
            .unwrap();

        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
        let seen = stub.seen.lock().unwrap();
        let (n_trials, names) = &seen[0];
        assert_eq!(*n_trials, 25);
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(
            sorted,
            vec![
                "learning_rate",
                "lr_scheduler_type",
                "warmup_ratio",
                "weight_decay"
            ]
        );
    }

    #[tokio::test]
    async fn search_produces_a_ranked_persisted_report() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = search_trainer(dir.path(), 5);
        let settings = SearchSettings {
            n_trials: 4,
            seed: Some(42),
            ..SearchSettings::default()
        };
        let outcome = trainer.hyperparameter_search(settings).await.unwrap();

        let report = &outcome.report;
        assert_eq!(report.trials.len(), 4);
        assert_eq!(report.metric, "eval_loss");
        assert_eq!(report.direction, ObjectiveDirection::Minimize);
        assert!(report.trials.iter().all(|row| {
            row.status == TrialStatus::Completed
                || row.status == TrialStatus::Stopped
                || row.status == TrialStatus::Failed
        }));

        let best = report.require_best().unwrap();
        assert!(best.objective.unwrap() > 0.0);
        assert_eq!(
            outcome.best.as_ref().unwrap().objective,
            best.objective.unwrap()
        );

        assert!(dir.path().join(TRIAL_TABLE_FILE).exists());
        let saved = fs::read_to_string(dir.path().join(BEST_TRIAL_FILE)).unwrap();
        let saved_best: TrialRow = serde_json::from_str(&saved).unwrap();
        assert_eq!(saved_best.number, best.number);
    }

    #[tokio::test]
    async fn completed_trials_leave_step_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = search_trainer(dir.path(), 5);
        let settings = SearchSettings {
            n_trials: 2,
            seed: Some(11),
            ..SearchSettings::default()
        };
        trainer.hyperparameter_search(settings).await.unwrap();

        // The first trial reaches every rung first, so it runs all five
        // epochs and crosses the save interval twice: ten train steps,
        // saved at steps 6 and 10.
        let checkpoints = list_checkpoints(dir.path(), 0).unwrap();
        assert_eq!(checkpoints.len(), 2);
        let state = read_trainer_state(&checkpoints[1]).unwrap();
        assert_eq!(state.trial_number, 0);
        assert_eq!(state.global_step, 10);
        assert_eq!(state.epoch, 5);
        assert!(state.eval_loss.is_some());
    }

    #[tokio::test]
    async fn disabling_early_stopping_runs_every_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = search_trainer(dir.path(), 50);
        let settings = SearchSettings {
            n_trials: 3,
            seed: Some(5),
            early_stopping: false,
            ..SearchSettings::default()
        };
        let outcome = trainer.hyperparameter_search(settings).await.unwrap();

        assert_eq!(outcome.report.trials.len(), 3);
        assert!(outcome
            .report
            .trials
            .iter()
            .all(|row| row.status == TrialStatus::Completed && row.epochs_completed == 5));
    }

    #[tokio::test]
    async fn report_rows_carry_the_search_space_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = search_trainer(dir.path(), 50);
        let settings = SearchSettings {
            n_trials: 2,
            seed: Some(3),
            ..SearchSettings::default()
        };
        let outcome = trainer.hyperparameter_search(settings).await.unwrap();

        for row in &outcome.report.trials {
            let lr = row.parameters["learning_rate"].as_f64().unwrap();
            assert!((1e-6..=1e-3).contains(&lr));
            let kind = row.parameters["lr_scheduler_type"].as_str().unwrap();
            assert!(kind == "linear" || kind == "cosine");
            assert!(row.parameters.contains_key("warmup_ratio"));
            assert!(row.parameters.contains_key("weight_decay"));
        }
    }
}
