//! Arguments for a fine-tuning run.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use vt_types::{TrainError, VtResult};

/// When periodic work (logging, evaluation, checkpointing) happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalStrategy {
    No,

    Steps,

    Epoch,
}

/// Harness-level knobs for one fine-tuning run. Searchable hyperparameters
/// live in [`crate::hyper::CaptionHyperparameters`] instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingArguments {
    /// Root directory for checkpoints and search reports.
    pub output_dir: PathBuf,

    pub num_train_epochs: u32,

    pub per_device_train_batch_size: usize,

    pub per_device_eval_batch_size: usize,

    /// Background workers feeding the batch loader.
    pub dataloader_num_workers: usize,

    pub logging_strategy: IntervalStrategy,

    /// Evaluation cadence; intermediate results reach the trial scheduler
    /// only when this is per-epoch.
    pub eval_strategy: IntervalStrategy,

    pub save_strategy: IntervalStrategy,

    /// Checkpoint every this many optimizer steps when saving by steps.
    pub save_steps: u64,

    /// Decode full captions during evaluation instead of scoring logits.
    pub predict_with_generate: bool,

    /// Allow TF32 matmul on Ampere and newer devices.
    pub allow_tf32: bool,

    pub seed: u64,
}

impl Default for TrainingArguments {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("training/hp_tuning"),
            num_train_epochs: 5,
            per_device_train_batch_size: 4,
            per_device_eval_batch_size: 4,
            dataloader_num_workers: 4,
            logging_strategy: IntervalStrategy::Epoch,
            eval_strategy: IntervalStrategy::Epoch,
            save_strategy: IntervalStrategy::Steps,
            save_steps: 500,
            predict_with_generate: true,
            allow_tf32: true,
            seed: 42,
        }
    }
}

impl TrainingArguments {
    pub fn validate(&self) -> VtResult<()> {
        if self.num_train_epochs == 0 {
            return Err(TrainError::InvalidArguments {
                message: "num_train_epochs must be at least 1".to_string(),
            }
            .into());
        }
        if self.per_device_train_batch_size == 0 {
            return Err(TrainError::InvalidArguments {
                message: "per_device_train_batch_size must be at least 1".to_string(),
            }
            .into());
        }
        if self.per_device_eval_batch_size == 0 {
            return Err(TrainError::InvalidArguments {
                message: "per_device_eval_batch_size must be at least 1".to_string(),
            }
            .into());
        }
        if self.save_strategy == IntervalStrategy::Steps && self.save_steps == 0 {
            return Err(TrainError::InvalidArguments {
                message: "save_steps must be at least 1 when saving by steps".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Optimizer steps one epoch takes for a training split of
    /// `num_examples` rows.
    pub fn steps_per_epoch(&self, num_examples: usize) -> u64 {
        ((num_examples + self.per_device_train_batch_size - 1) / self.per_device_train_batch_size)
            as u64
    }

    /// Total optimizer steps across the whole run.
    pub fn total_steps(&self, num_examples: usize) -> u64 {
        self.steps_per_epoch(num_examples) * u64::from(self.num_train_epochs)
    }
}
