//! Search space definitions and baseline sampling strategies.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use vt_types::{TuneError, VtResult};

/// Sampled parameters for one trial, keyed by parameter name.
pub type ParamMap = HashMap<String, ParameterValue>;

/// A single parameter dimension in the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    /// Parameter name as the trainer consumes it (e.g. "learning_rate").
    pub name: String,
    /// The kind of search range.
    pub kind: ParameterKind,
}

/// Describes how a parameter is sampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterKind {
    /// Continuous uniform range [low, high].
    FloatRange { low: f64, high: f64 },
    /// Log-uniform range (sampled in log-space then exponentiated).
    LogUniform { low: f64, high: f64 },
    /// Categorical choices.
    Choice { values: Vec<serde_json::Value> },
}

/// A concrete parameter value produced by a search strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Float(f64),
    Json(serde_json::Value),
}

impl ParameterValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Json(v) => v.as_f64(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Float(_) => None,
            Self::Json(v) => v.as_str(),
        }
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

/// The full search space: an ordered list of parameter definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub parameters: Vec<ParameterDef>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
        }
    }

    pub fn add_float(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::FloatRange { low, high },
        });
        self
    }

    pub fn add_log_uniform(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::LogUniform { low, high },
        });
        self
    }

    pub fn add_choice(mut self, name: impl Into<String>, values: Vec<serde_json::Value>) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::Choice { values },
        });
        self
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn param(&self, name: &str) -> Option<&ParameterDef> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Reject spaces no strategy could sample sensibly.
    pub fn validate(&self) -> VtResult<()> {
        if self.parameters.is_empty() {
            return Err(TuneError::EmptySearchSpace.into());
        }
        let mut seen = std::collections::HashSet::new();
        for param in &self.parameters {
            if !seen.insert(param.name.as_str()) {
                return Err(TuneError::InvalidBounds {
                    name: param.name.clone(),
                    message: "duplicate parameter name".to_string(),
                }
                .into());
            }
            match &param.kind {
                ParameterKind::FloatRange { low, high } => {
                    if !(low < high) {
                        return Err(TuneError::InvalidBounds {
                            name: param.name.clone(),
                            message: format!("low {} must be below high {}", low, high),
                        }
                        .into());
                    }
                }
                ParameterKind::LogUniform { low, high } => {
                    if !(*low > 0.0 && low < high) {
                        return Err(TuneError::InvalidBounds {
                            name: param.name.clone(),
                            message: format!(
                                "log-uniform needs 0 < low < high, got [{}, {}]",
                                low, high
                            ),
                        }
                        .into());
                    }
                }
                ParameterKind::Choice { values } => {
                    if values.is_empty() {
                        return Err(TuneError::InvalidBounds {
                            name: param.name.clone(),
                            message: "choice has no values".to_string(),
                        }
                        .into());
                    }
                }
            }
        }
        Ok(())
    }
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self::new()
    }
}

/// Draw one value for a single dimension.
pub(crate) fn sample_kind(kind: &ParameterKind, rng: &mut StdRng) -> ParameterValue {
    match kind {
        ParameterKind::FloatRange { low, high } => {
            ParameterValue::Float(rng.random_range(*low..=*high))
        }
        ParameterKind::LogUniform { low, high } => {
            let log_val: f64 = rng.random_range(low.ln()..=high.ln());
            ParameterValue::Float(log_val.exp())
        }
        ParameterKind::Choice { values } => {
            let idx = rng.random_range(0..values.len());
            ParameterValue::Json(values[idx].clone())
        }
    }
}

pub(crate) fn sample_space(space: &SearchSpace, rng: &mut StdRng) -> ParamMap {
    space
        .parameters
        .iter()
        .map(|p| (p.name.clone(), sample_kind(&p.kind, rng)))
        .collect()
}

// ---------------------------------------------------------------------------
// Search strategies
// ---------------------------------------------------------------------------

/// Common trait for all search strategies.
pub trait SearchStrategy: Send + Sync {
    /// Generate the next batch of parameter combinations to evaluate.
    fn suggest(&mut self, count: usize) -> Vec<ParamMap>;

    /// Report completed trial results so adaptive strategies can learn.
    fn report(&mut self, _params: &ParamMap, _objective: f64) {}

    /// Human-readable strategy name.
    fn name(&self) -> &str;
}

// ---- Random search ----

/// Independent random sampling across the search space.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    space: SearchSpace,
    rng: StdRng,
}

impl RandomSearch {
    pub fn new(space: SearchSpace) -> Self {
        Self::with_seed(space, rand::random())
    }

    pub fn with_seed(space: SearchSpace, seed: u64) -> Self {
        Self {
            space,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl SearchStrategy for RandomSearch {
    fn suggest(&mut self, count: usize) -> Vec<ParamMap> {
        (0..count)
            .map(|_| sample_space(&self.space, &mut self.rng))
            .collect()
    }

    fn name(&self) -> &str {
        "random"
    }
}
