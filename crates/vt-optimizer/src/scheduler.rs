//! Trial schedulers.
//!
//! A scheduler sees every intermediate result of every running trial and
//! decides whether the trial keeps training. [`FifoScheduler`] never stops
//! anything; [`AshaScheduler`] implements asynchronous successive halving
//! with geometrically spaced rungs.

use std::collections::HashMap;

use crate::trial::ObjectiveDirection;

const DEFAULT_GRACE_PERIOD: u64 = 1;
const DEFAULT_REDUCTION_FACTOR: u64 = 4;
const DEFAULT_MAX_T: u64 = 100;

/// Verdict for an in-flight trial after an intermediate report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerDecision {
    Continue,

    Stop,
}

/// Decides after each intermediate result whether a trial keeps training.
pub trait TrialScheduler: Send {
    /// `t` is the training time consumed so far in scheduler units
    /// (epochs here), `value` the objective at that point.
    fn on_result(&mut self, trial_id: u64, t: u64, value: f64) -> SchedulerDecision;

    fn name(&self) -> &str;
}

/// Runs every trial to completion.
#[derive(Debug, Default)]
pub struct FifoScheduler;

impl TrialScheduler for FifoScheduler {
    fn on_result(&mut self, _trial_id: u64, _t: u64, _value: f64) -> SchedulerDecision {
        SchedulerDecision::Continue
    }

    fn name(&self) -> &str {
        "fifo"
    }
}

struct Rung {
    milestone: u64,
    recorded: HashMap<u64, f64>,
}

/// Asynchronous successive halving.
///
/// Rungs sit at `grace_period * reduction_factor^k` below `max_t`. When a
/// trial first reaches a rung its objective is recorded there, and the trial
/// continues only if it ranks within the top `1 / reduction_factor` of the
/// values recorded so far. The first arrival at a rung always continues.
pub struct AshaScheduler {
    direction: ObjectiveDirection,
    reduction_factor: u64,
    max_t: u64,
    /// Descending by milestone; a result is judged at the highest rung
    /// it has reached and not yet been recorded at.
    rungs: Vec<Rung>,
}

impl AshaScheduler {
    pub fn new() -> Self {
        Self::with_config(DEFAULT_GRACE_PERIOD, DEFAULT_REDUCTION_FACTOR, DEFAULT_MAX_T)
    }

    pub fn with_config(grace_period: u64, reduction_factor: u64, max_t: u64) -> Self {
        let grace_period = grace_period.max(1);
        let reduction_factor = reduction_factor.max(2);
        let max_t = max_t.max(grace_period);

        let mut milestones = Vec::new();
        let mut milestone = grace_period;
        while milestone < max_t {
            milestones.push(milestone);
            match milestone.checked_mul(reduction_factor) {
                Some(next) => milestone = next,
                None => break,
            }
        }
        milestones.reverse();

        Self {
            direction: ObjectiveDirection::Minimize,
            reduction_factor,
            max_t,
            rungs: milestones
                .into_iter()
                .map(|milestone| Rung {
                    milestone,
                    recorded: HashMap::new(),
                })
                .collect(),
        }
    }

    pub fn with_direction(mut self, direction: ObjectiveDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Rung milestones in ascending order.
    pub fn milestones(&self) -> Vec<u64> {
        self.rungs.iter().rev().map(|r| r.milestone).collect()
    }

    fn beats_cutoff(&self, rung: &Rung, value: f64) -> bool {
        let recorded = rung.recorded.len();
        if recorded == 0 {
            return true;
        }
        let mut values: Vec<f64> = rung.recorded.values().copied().collect();
        values.sort_by(|a, b| {
            let ord = a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal);
            match self.direction {
                ObjectiveDirection::Minimize => ord,
                ObjectiveDirection::Maximize => ord.reverse(),
            }
        });
        let n_keep = (recorded / self.reduction_factor as usize).max(1);
        let cutoff = values[n_keep - 1];
        match self.direction {
            ObjectiveDirection::Minimize => value <= cutoff,
            ObjectiveDirection::Maximize => value >= cutoff,
        }
    }
}

impl Default for AshaScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TrialScheduler for AshaScheduler {
    fn on_result(&mut self, trial_id: u64, t: u64, value: f64) -> SchedulerDecision {
        if !value.is_finite() {
            return SchedulerDecision::Stop;
        }
        if t >= self.max_t {
            return SchedulerDecision::Stop;
        }

        let mut decision = SchedulerDecision::Continue;
        for i in 0..self.rungs.len() {
            if t < self.rungs[i].milestone || self.rungs[i].recorded.contains_key(&trial_id) {
                continue;
            }
            if !self.beats_cutoff(&self.rungs[i], value) {
                decision = SchedulerDecision::Stop;
            }
            self.rungs[i].recorded.insert(trial_id, value);
            break;
        }
        decision
    }

    fn name(&self) -> &str {
        "asha"
    }
}
