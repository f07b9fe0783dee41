//! Searchable hyperparameters for caption fine-tuning.

use serde::{Deserialize, Serialize};

use vt_optimizer::{ParamMap, SearchSpace};
use vt_types::{TuneError, VtResult};

/// Learning-rate decay family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerKind {
    Linear,

    Cosine,
}

impl SchedulerKind {
    pub fn parse(value: &str) -> VtResult<Self> {
        match value {
            "linear" => Ok(Self::Linear),
            "cosine" => Ok(Self::Cosine),
            other => Err(TuneError::InvalidParameter {
                name: "lr_scheduler_type".to_string(),
                message: format!("unknown scheduler '{}'", other),
            }
            .into()),
        }
    }
}

impl std::fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Linear => write!(f, "linear"),
            Self::Cosine => write!(f, "cosine"),
        }
    }
}

/// One sampled hyperparameter combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionHyperparameters {
    pub learning_rate: f64,
    pub lr_scheduler_type: SchedulerKind,
    pub warmup_ratio: f64,
    pub weight_decay: f64,
}

impl Default for CaptionHyperparameters {
    fn default() -> Self {
        Self {
            learning_rate: 5e-5,
            lr_scheduler_type: SchedulerKind::Linear,
            warmup_ratio: 0.0,
            weight_decay: 0.0,
        }
    }
}

/// Names the caption trainer knows how to apply.
const TUNED_NAMES: [&str; 4] = [
    "learning_rate",
    "lr_scheduler_type",
    "warmup_ratio",
    "weight_decay",
];

impl CaptionHyperparameters {
    /// Decode a searcher suggestion into typed hyperparameters. Names outside
    /// the tuned set are rejected rather than ignored.
    pub fn from_params(params: &ParamMap) -> VtResult<Self> {
        for name in params.keys() {
            if !TUNED_NAMES.contains(&name.as_str()) {
                return Err(TuneError::UnknownParameter { name: name.clone() }.into());
            }
        }
        let scheduler = match params.get("lr_scheduler_type") {
            None => {
                return Err(TuneError::MissingParameter {
                    name: "lr_scheduler_type".to_string(),
                }
                .into())
            }
            Some(value) => match value.as_str() {
                Some(s) => SchedulerKind::parse(s)?,
                None => {
                    return Err(TuneError::InvalidParameter {
                        name: "lr_scheduler_type".to_string(),
                        message: format!("expected a string, got {}", value),
                    }
                    .into())
                }
            },
        };
        Ok(Self {
            learning_rate: require_f64(params, "learning_rate")?,
            lr_scheduler_type: scheduler,
            warmup_ratio: require_f64(params, "warmup_ratio")?,
            weight_decay: require_f64(params, "weight_decay")?,
        })
    }
}

fn require_f64(params: &ParamMap, name: &str) -> VtResult<f64> {
    match params.get(name) {
        None => Err(TuneError::MissingParameter {
            name: name.to_string(),
        }
        .into()),
        Some(value) => value.as_f64().ok_or_else(|| {
            TuneError::InvalidParameter {
                name: name.to_string(),
                message: format!("expected a number, got {}", value),
            }
            .into()
        }),
    }
}

/// The space swept during hyperparameter search: log-uniform learning rate,
/// scheduler family, warmup ratio and weight decay.
pub fn caption_search_space() -> SearchSpace {
    SearchSpace::new()
        .add_log_uniform("learning_rate", 1e-6, 1e-3)
        .add_choice(
            "lr_scheduler_type",
            vec![serde_json::json!("linear"), serde_json::json!("cosine")],
        )
        .add_float("warmup_ratio", 0.0, 0.2)
        .add_float("weight_decay", 0.0, 1e-3)
}
