//! Learning-rate schedules with linear warmup.

use serde::{Deserialize, Serialize};

use crate::hyper::SchedulerKind;

/// Per-step learning-rate curve: linear warmup from zero, then decay to
/// zero over the remaining steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LrSchedule {
    kind: SchedulerKind,
    base_lr: f64,
    warmup_steps: u64,
    total_steps: u64,
}

impl LrSchedule {
    pub fn new(kind: SchedulerKind, base_lr: f64, warmup_ratio: f64, total_steps: u64) -> Self {
        let total_steps = total_steps.max(1);
        let warmup_steps = ((warmup_ratio.clamp(0.0, 1.0) * total_steps as f64).ceil() as u64)
            .min(total_steps);
        Self {
            kind,
            base_lr,
            warmup_steps,
            total_steps,
        }
    }

    pub fn warmup_steps(&self) -> u64 {
        self.warmup_steps
    }

    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }

    /// Learning rate at a zero-based optimizer step.
    pub fn lr_at(&self, step: u64) -> f64 {
        self.base_lr * self.multiplier(step)
    }

    fn multiplier(&self, step: u64) -> f64 {
        if step < self.warmup_steps {
            return step as f64 / self.warmup_steps as f64;
        }
        let decay_steps = self.total_steps.saturating_sub(self.warmup_steps).max(1);
        let progress = ((step - self.warmup_steps) as f64 / decay_steps as f64).min(1.0);
        match self.kind {
            SchedulerKind::Linear => 1.0 - progress,
            SchedulerKind::Cosine => 0.5 * (1.0 + (std::f64::consts::PI * progress).cos()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warmup_rises_linearly_to_base() {
        let schedule = LrSchedule::new(SchedulerKind::Linear, 1e-4, 0.1, 100);
        assert_eq!(schedule.warmup_steps(), 10);
        assert_eq!(schedule.lr_at(0), 0.0);
        assert!((schedule.lr_at(5) - 5e-5).abs() < 1e-12);
        assert!((schedule.lr_at(10) - 1e-4).abs() < 1e-12);
    }

    #[test]
    fn linear_decays_to_zero_at_the_end() {
        let schedule = LrSchedule::new(SchedulerKind::Linear, 1e-4, 0.0, 100);
        assert!((schedule.lr_at(0) - 1e-4).abs() < 1e-12);
        assert!((schedule.lr_at(50) - 5e-5).abs() < 1e-12);
        assert_eq!(schedule.lr_at(100), 0.0);
        assert_eq!(schedule.lr_at(500), 0.0);
    }

    #[test]
    fn cosine_passes_through_half_at_midpoint() {
        let schedule = LrSchedule::new(SchedulerKind::Cosine, 2e-4, 0.0, 100);
        assert!((schedule.lr_at(0) - 2e-4).abs() < 1e-12);
        assert!((schedule.lr_at(50) - 1e-4).abs() < 1e-10);
        assert!(schedule.lr_at(100).abs() < 1e-10);
    }

    #[test]
    fn cosine_decay_is_monotonic_after_warmup() {
        let schedule = LrSchedule::new(SchedulerKind::Cosine, 1e-4, 0.05, 200);
        let mut previous = f64::INFINITY;
        for step in schedule.warmup_steps()..=schedule.total_steps() {
            let lr = schedule.lr_at(step);
            assert!(lr <= previous + 1e-15);
            previous = lr;
        }
    }

    #[test]
    fn full_warmup_never_divides_by_zero() {
        // Warmup covering every step leaves a single synthetic decay step.
        let schedule = LrSchedule::new(SchedulerKind::Linear, 1e-4, 1.0, 10);
        assert_eq!(schedule.warmup_steps(), 10);
        assert!((schedule.lr_at(9) - 9e-5).abs() < 1e-12);
        assert!((schedule.lr_at(10) - 1e-4).abs() < 1e-12);
        assert_eq!(schedule.lr_at(11), 0.0);
    }
}
