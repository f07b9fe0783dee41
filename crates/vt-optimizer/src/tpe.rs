//! Tree-of-Parzen-estimators style adaptive search.
//!
//! Observations split into a good and a bad set by objective quantile; new
//! candidates are drawn near good points and scored by the ratio of Parzen
//! window densities, so sampling drifts toward regions where good trials
//! cluster and bad ones do not. Continuous dimensions are modeled
//! independently, log-uniform ones in log space.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::search::{
    sample_space, ParamMap, ParameterKind, ParameterValue, SearchSpace, SearchStrategy,
};
use crate::trial::ObjectiveDirection;

const DEFAULT_STARTUP_TRIALS: usize = 10;
const DEFAULT_GAMMA: f64 = 0.25;
const DEFAULT_CANDIDATES: usize = 24;

/// Adaptive searcher with a random startup phase.
pub struct TpeSearch {
    space: SearchSpace,
    direction: ObjectiveDirection,
    n_startup_trials: usize,
    gamma: f64,
    n_candidates: usize,
    observations: Vec<(ParamMap, f64)>,
    rng: StdRng,
}

enum DimObs {
    Continuous {
        good: Vec<f64>,
        bad: Vec<f64>,
        low: f64,
        high: f64,
        log: bool,
    },
    Categorical {
        good_counts: Vec<usize>,
        bad_counts: Vec<usize>,
        values: Vec<serde_json::Value>,
    },
}

impl TpeSearch {
    pub fn new(space: SearchSpace) -> Self {
        Self {
            space,
            direction: ObjectiveDirection::Minimize,
            n_startup_trials: DEFAULT_STARTUP_TRIALS,
            gamma: DEFAULT_GAMMA,
            n_candidates: DEFAULT_CANDIDATES,
            observations: Vec::new(),
            rng: StdRng::seed_from_u64(rand::random()),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_startup_trials(mut self, n: usize) -> Self {
        self.n_startup_trials = n;
        self
    }

    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn with_direction(mut self, direction: ObjectiveDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn observation_count(&self) -> usize {
        self.observations.len()
    }

    /// Good/bad observation values per dimension, good first by objective.
    fn dimension_splits(&self) -> Vec<(String, DimObs)> {
        let n = self.observations.len();
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| {
            let ord = self.observations[a]
                .1
                .partial_cmp(&self.observations[b].1)
                .unwrap_or(std::cmp::Ordering::Equal);
            match self.direction {
                ObjectiveDirection::Minimize => ord,
                ObjectiveDirection::Maximize => ord.reverse(),
            }
        });
        let n_good = ((self.gamma * n as f64).ceil() as usize).clamp(1, n - 1);
        let (good_idx, bad_idx) = order.split_at(n_good);

        self.space
            .parameters
            .iter()
            .map(|param| {
                let obs = match &param.kind {
                    ParameterKind::FloatRange { low, high } => {
                        let collect = |idx: &[usize]| {
                            idx.iter()
                                .filter_map(|&i| {
                                    self.observations[i]
                                        .0
                                        .get(&param.name)
                                        .and_then(ParameterValue::as_f64)
                                })
                                .collect::<Vec<f64>>()
                        };
                        DimObs::Continuous {
                            good: collect(good_idx),
                            bad: collect(bad_idx),
                            low: *low,
                            high: *high,
                            log: false,
                        }
                    }
                    ParameterKind::LogUniform { low, high } => {
                        let collect = |idx: &[usize]| {
                            idx.iter()
                                .filter_map(|&i| {
                                    self.observations[i]
                                        .0
                                        .get(&param.name)
                                        .and_then(ParameterValue::as_f64)
                                })
                                .filter(|v| *v > 0.0)
                                .map(f64::ln)
                                .collect::<Vec<f64>>()
                        };
                        DimObs::Continuous {
                            good: collect(good_idx),
                            bad: collect(bad_idx),
                            low: *low,
                            high: *high,
                            log: true,
                        }
                    }
                    ParameterKind::Choice { values } => {
                        let count = |idx: &[usize]| {
                            let mut counts = vec![0usize; values.len()];
                            for &i in idx {
                                if let Some(ParameterValue::Json(v)) =
                                    self.observations[i].0.get(&param.name)
                                {
                                    if let Some(pos) = values.iter().position(|c| c == v) {
                                        counts[pos] += 1;
                                    }
                                }
                            }
                            counts
                        };
                        DimObs::Categorical {
                            good_counts: count(good_idx),
                            bad_counts: count(bad_idx),
                            values: values.clone(),
                        }
                    }
                };
                (param.name.clone(), obs)
            })
            .collect()
    }

    fn sample_model(&mut self) -> ParamMap {
        let dims = self.dimension_splits();
        let mut params = ParamMap::new();
        for (name, obs) in dims {
            let value = match obs {
                DimObs::Continuous {
                    good,
                    bad,
                    low,
                    high,
                    log,
                } => {
                    if log {
                        let x = self.sample_continuous(&good, &bad, low.ln(), high.ln());
                        ParameterValue::Float(x.exp().clamp(low, high))
                    } else {
                        ParameterValue::Float(self.sample_continuous(&good, &bad, low, high))
                    }
                }
                DimObs::Categorical {
                    good_counts,
                    bad_counts,
                    values,
                } => self.sample_categorical(&good_counts, &bad_counts, &values),
            };
            params.insert(name, value);
        }
        params
    }

    /// Candidates perturb a random good point; the best density ratio wins.
    fn sample_continuous(&mut self, good: &[f64], bad: &[f64], low: f64, high: f64) -> f64 {
        if good.is_empty() {
            return self.rng.random_range(low..=high);
        }

        // Window half-width shrinks as evidence accumulates.
        let width = (high - low) / (1.0 + good.len() as f64);
        let mut best_x = good[0].clamp(low, high);
        let mut best_score = f64::NEG_INFINITY;
        for _ in 0..self.n_candidates {
            let center = good[self.rng.random_range(0..good.len())];
            let x = (center + self.rng.random_range(-width..=width)).clamp(low, high);
            let score = window_rate(x, good, width) / window_rate(x, bad, width);
            if score > best_score {
                best_score = score;
                best_x = x;
            }
        }
        best_x
    }

    /// Weighted draw by the ratio of smoothed category rates.
    fn sample_categorical(
        &mut self,
        good_counts: &[usize],
        bad_counts: &[usize],
        values: &[serde_json::Value],
    ) -> ParameterValue {
        let k = values.len() as f64;
        let total_good: usize = good_counts.iter().sum();
        let total_bad: usize = bad_counts.iter().sum();

        let weights: Vec<f64> = good_counts
            .iter()
            .zip(bad_counts)
            .map(|(&g, &b)| {
                let good_rate = (g as f64 + 1.0) / (total_good as f64 + k);
                let bad_rate = (b as f64 + 1.0) / (total_bad as f64 + k);
                good_rate / bad_rate
            })
            .collect();

        let total: f64 = weights.iter().sum();
        let mut draw = self.rng.random::<f64>() * total;
        for (i, weight) in weights.iter().enumerate() {
            if draw < *weight {
                return ParameterValue::Json(values[i].clone());
            }
            draw -= weight;
        }
        ParameterValue::Json(values[values.len() - 1].clone())
    }
}

/// Smoothed fraction of windows around `centers` that cover `x`.
fn window_rate(x: f64, centers: &[f64], width: f64) -> f64 {
    let hits = centers.iter().filter(|&&c| (c - x).abs() <= width).count();
    (hits as f64 + 1.0) / (centers.len() as f64 + 2.0)
}

impl SearchStrategy for TpeSearch {
    fn suggest(&mut self, count: usize) -> Vec<ParamMap> {
        (0..count)
            .map(|_| {
                // The split needs at least two observations to be meaningful.
                if self.observations.len() < self.n_startup_trials.max(2) {
                    sample_space(&self.space, &mut self.rng)
                } else {
                    self.sample_model()
                }
            })
            .collect()
    }

    fn report(&mut self, params: &ParamMap, objective: f64) {
        self.observations.push((params.clone(), objective));
    }

    fn name(&self) -> &str {
        "tpe"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lr_space() -> SearchSpace {
        SearchSpace::new().add_log_uniform("learning_rate", 1e-6, 1e-3)
    }

    fn lr_params(v: f64) -> ParamMap {
        let mut p = ParamMap::new();
        p.insert("learning_rate".into(), ParameterValue::Float(v));
        p
    }

    #[test]
    fn startup_phase_samples_randomly_within_bounds() {
        let mut tpe = TpeSearch::new(lr_space()).with_seed(11);
        let suggestions = tpe.suggest(10);
        assert_eq!(suggestions.len(), 10);
        for params in &suggestions {
            let v = params
                .get("learning_rate")
                .and_then(ParameterValue::as_f64)
                .unwrap();
            assert!((1e-6..=1e-3).contains(&v));
        }
    }

    #[test]
    fn model_phase_draws_stay_within_bounds() {
        let space = SearchSpace::new()
            .add_log_uniform("learning_rate", 1e-6, 1e-3)
            .add_choice(
                "lr_scheduler_type",
                vec![serde_json::json!("linear"), serde_json::json!("cosine")],
            )
            .add_float("warmup_ratio", 0.0, 0.2)
            .add_float("weight_decay", 0.0, 1e-3);
        let mut tpe = TpeSearch::new(space).with_seed(17).with_startup_trials(6);

        for i in 0..12 {
            let mut p = ParamMap::new();
            p.insert(
                "learning_rate".into(),
                ParameterValue::Float(1e-6 * 10f64.powf(i as f64 / 4.0)),
            );
            p.insert(
                "lr_scheduler_type".into(),
                ParameterValue::Json(serde_json::json!(if i % 2 == 0 {
                    "linear"
                } else {
                    "cosine"
                })),
            );
            p.insert(
                "warmup_ratio".into(),
                ParameterValue::Float(0.2 * i as f64 / 11.0),
            );
            p.insert(
                "weight_decay".into(),
                ParameterValue::Float(1e-3 * i as f64 / 11.0),
            );
            tpe.report(&p, 0.1 + 0.05 * i as f64);
        }

        for params in tpe.suggest(1000) {
            let lr = params
                .get("learning_rate")
                .and_then(ParameterValue::as_f64)
                .unwrap();
            assert!((1e-6..=1e-3).contains(&lr));
            let warmup = params
                .get("warmup_ratio")
                .and_then(ParameterValue::as_f64)
                .unwrap();
            assert!((0.0..=0.2).contains(&warmup));
            let decay = params
                .get("weight_decay")
                .and_then(ParameterValue::as_f64)
                .unwrap();
            assert!((0.0..=1e-3).contains(&decay));
            let kind = params
                .get("lr_scheduler_type")
                .and_then(|v| v.as_str())
                .unwrap();
            assert!(["linear", "cosine"].contains(&kind));
        }
    }

    #[test]
    fn model_concentrates_near_good_observations() {
        let mut tpe = TpeSearch::new(lr_space())
            .with_seed(5)
            .with_startup_trials(5);

        tpe.report(&lr_params(9e-5), 0.10);
        tpe.report(&lr_params(1.2e-4), 0.12);
        tpe.report(&lr_params(1e-6), 1.00);
        tpe.report(&lr_params(1e-3), 1.10);
        tpe.report(&lr_params(2e-6), 0.95);
        assert_eq!(tpe.observation_count(), 5);

        let good_center = (1e-4f64).ln();
        let worst = (1e-6f64).ln();
        let mut near_good = 0;
        for params in tpe.suggest(20) {
            let v = params
                .get("learning_rate")
                .and_then(ParameterValue::as_f64)
                .unwrap();
            assert!((1e-6..=1e-3).contains(&v));
            if (v.ln() - good_center).abs() <= (v.ln() - worst).abs() {
                near_good += 1;
            }
        }
        assert!(near_good >= 12, "only {} of 20 near the good cluster", near_good);
    }

    #[test]
    fn categorical_dimension_prefers_good_category() {
        let space = SearchSpace::new().add_choice(
            "lr_scheduler_type",
            vec![serde_json::json!("linear"), serde_json::json!("cosine")],
        );
        let mut tpe = TpeSearch::new(space).with_seed(3).with_startup_trials(4);

        let cat = |s: &str| {
            let mut p = ParamMap::new();
            p.insert(
                "lr_scheduler_type".into(),
                ParameterValue::Json(serde_json::json!(s)),
            );
            p
        };
        tpe.report(&cat("cosine"), 0.10);
        tpe.report(&cat("cosine"), 0.11);
        tpe.report(&cat("cosine"), 0.50);
        tpe.report(&cat("linear"), 1.00);
        tpe.report(&cat("linear"), 1.05);
        tpe.report(&cat("linear"), 1.10);

        let mut cosine = 0;
        for params in tpe.suggest(40) {
            if params.get("lr_scheduler_type").and_then(|v| v.as_str()) == Some("cosine") {
                cosine += 1;
            }
        }
        assert!(cosine > 24, "only {} of 40 suggestions were cosine", cosine);
    }

    #[test]
    fn maximize_direction_flips_good_set() {
        let space = SearchSpace::new().add_float("score_weight", 0.0, 1.0);
        let mut tpe = TpeSearch::new(space)
            .with_seed(9)
            .with_startup_trials(2)
            .with_direction(ObjectiveDirection::Maximize);

        let p = |v: f64| {
            let mut m = ParamMap::new();
            m.insert("score_weight".into(), ParameterValue::Float(v));
            m
        };
        tpe.report(&p(0.9), 1.0);
        tpe.report(&p(0.1), 0.0);

        let mut high_side = 0;
        for params in tpe.suggest(10) {
            let v = params
                .get("score_weight")
                .and_then(ParameterValue::as_f64)
                .unwrap();
            assert!((0.0..=1.0).contains(&v));
            if v > 0.5 {
                high_side += 1;
            }
        }
        assert!(high_side >= 6, "only {} of 10 above 0.5", high_side);
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let build = || {
            let mut tpe = TpeSearch::new(lr_space()).with_seed(21).with_startup_trials(3);
            tpe.report(&lr_params(5e-5), 0.2);
            tpe.report(&lr_params(8e-6), 0.9);
            tpe.report(&lr_params(2e-4), 0.3);
            tpe
        };
        assert_eq!(build().suggest(8), build().suggest(8));
    }
}
