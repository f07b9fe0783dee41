//! Checkpoint layout and trainer state persistence.
//!
//! Checkpoints land under `<output_dir>/run-<trial>/checkpoint-<step>/`,
//! one directory per save point, each holding a `trainer_state.json`.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vt_types::{TrainError, VtResult};

pub const TRAINER_STATE_FILE: &str = "trainer_state.json";

/// Snapshot of training progress saved with each checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerState {
    /// Search run this trial belongs to.
    pub run_id: Uuid,

    pub trial_number: usize,

    /// Model instance being fine-tuned.
    pub model_id: Uuid,

    pub epoch: u32,

    pub global_step: u64,

    pub eval_loss: Option<f64>,

    pub learning_rate: f64,

    pub saved_at: DateTime<Utc>,
}

pub fn checkpoint_dir(output_dir: &Path, trial_number: usize, global_step: u64) -> PathBuf {
    output_dir
        .join(format!("run-{trial_number}"))
        .join(format!("checkpoint-{global_step}"))
}

/// Write `state` under its checkpoint directory, creating it as needed.
/// Returns the checkpoint directory.
pub fn write_checkpoint(output_dir: &Path, state: &TrainerState) -> VtResult<PathBuf> {
    let dir = checkpoint_dir(output_dir, state.trial_number, state.global_step);
    fs::create_dir_all(&dir).map_err(|e| TrainError::CheckpointFailed {
        message: format!("Failed to create {}: {}", dir.display(), e),
    })?;

    let path = dir.join(TRAINER_STATE_FILE);
    let json = serde_json::to_string_pretty(state)?;
    fs::write(&path, json).map_err(|e| TrainError::CheckpointFailed {
        message: format!("Failed to write {}: {}", path.display(), e),
    })?;
    Ok(dir)
}

pub fn read_trainer_state(checkpoint_dir: &Path) -> VtResult<TrainerState> {
    let path = checkpoint_dir.join(TRAINER_STATE_FILE);
    let json = fs::read_to_string(&path).map_err(|e| TrainError::CheckpointFailed {
        message: format!("Failed to read {}: {}", path.display(), e),
    })?;
    Ok(serde_json::from_str(&json)?)
}

/// Checkpoint directories for one trial, ordered by step.
pub fn list_checkpoints(output_dir: &Path, trial_number: usize) -> VtResult<Vec<PathBuf>> {
    let run_dir = output_dir.join(format!("run-{trial_number}"));
    if !run_dir.exists() {
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    for entry in fs::read_dir(&run_dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(step) = name
            .strip_prefix("checkpoint-")
            .and_then(|s| s.parse::<u64>().ok())
        {
            if entry.path().is_dir() {
                found.push((step, entry.path()));
            }
        }
    }
    found.sort_by_key(|(step, _)| *step);
    Ok(found.into_iter().map(|(_, path)| path).collect())
}
