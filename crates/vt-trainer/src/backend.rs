//! Training backends.
//!
//! The harness drives epochs through [`TrainingBackend`]. The surrogate
//! backend stands in for a gradient engine: it consumes the epoch's batches
//! and produces a deterministic loss trajectory from the hyperparameters,
//! so the search stack behaves realistically on any machine.

use serde::{Deserialize, Serialize};

use vt_data::BatchIter;
use vt_model::CaptionModel;
use vt_types::{DataError, VtResult};

use crate::hyper::{CaptionHyperparameters, SchedulerKind};
use crate::schedule::LrSchedule;

/// Metrics produced by one epoch of training plus evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: u32,

    pub train_loss: f64,

    pub eval_loss: f64,

    /// Learning rate at the last optimizer step of the epoch.
    pub learning_rate: f64,

    /// Optimizer steps completed since the start of the run.
    pub global_step: u64,
}

/// Everything a backend needs to run one epoch.
pub struct EpochContext<'a> {
    pub model: &'a CaptionModel,

    pub hyperparameters: &'a CaptionHyperparameters,

    pub schedule: &'a LrSchedule,

    /// One-based epoch number.
    pub epoch: u32,

    /// Optimizer steps completed before this epoch.
    pub global_step: u64,
}

/// Runs one epoch of updates over `train`, then scores `eval`.
pub trait TrainingBackend: Send + Sync {
    fn run_epoch(
        &self,
        ctx: &EpochContext<'_>,
        train: BatchIter,
        eval: BatchIter,
    ) -> VtResult<EpochMetrics>;
}

const BEST_LEARNING_RATE: f64 = 1e-4;
const BEST_WARMUP_RATIO: f64 = 0.06;
const BEST_WEIGHT_DECAY: f64 = 5e-4;

/// Deterministic stand-in for a gradient engine.
///
/// The loss surface has a basin around a known-good configuration and
/// decays epoch over epoch, dominated by the learning rate the way real
/// fine-tuning runs are.
pub struct SurrogateBackend;

impl SurrogateBackend {
    fn misfit(hp: &CaptionHyperparameters) -> f64 {
        let lr = hp.learning_rate.max(f64::MIN_POSITIVE);
        let lr_gap = (lr.ln() - BEST_LEARNING_RATE.ln()).powi(2) * 0.05;
        let warmup_gap = (hp.warmup_ratio - BEST_WARMUP_RATIO).abs() * 0.4;
        let decay_gap = (hp.weight_decay - BEST_WEIGHT_DECAY).abs() * 40.0;
        let schedule_gap = match hp.lr_scheduler_type {
            SchedulerKind::Cosine => 0.0,
            SchedulerKind::Linear => 0.02,
        };
        lr_gap + warmup_gap + decay_gap + schedule_gap
    }
}

impl TrainingBackend for SurrogateBackend {
    fn run_epoch(
        &self,
        ctx: &EpochContext<'_>,
        train: BatchIter,
        eval: BatchIter,
    ) -> VtResult<EpochMetrics> {
        let mut steps = 0u64;
        for _ in train {
            steps += 1;
        }
        if eval.count() == 0 {
            return Err(DataError::EmptySplit {
                split: "validation".to_string(),
            }
            .into());
        }

        let misfit = Self::misfit(ctx.hyperparameters);
        let eval_loss = 0.4 + misfit + 1.2 / f64::from(ctx.epoch.max(1));
        let train_loss = eval_loss * 0.92;
        let global_step = ctx.global_step + steps;
        let learning_rate = ctx.schedule.lr_at(global_step.saturating_sub(1));
        Ok(EpochMetrics {
            epoch: ctx.epoch,
            train_loss,
            eval_loss,
            learning_rate,
            global_step,
        })
    }
}
