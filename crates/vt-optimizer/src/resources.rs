//! Host resource detection and per-trial concurrency planning.

use serde::{Deserialize, Serialize};

use vt_types::device::{accelerator_count, logical_cpu_count};

/// Resources one trial claims while it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResources {
    /// CPUs per trial (fractional ok).
    pub num_cpus: f64,

    /// GPUs per trial (0 = CPU only).
    pub num_gpus: f64,
}

impl Default for TrialResources {
    fn default() -> Self {
        Self {
            num_cpus: 1.0,
            num_gpus: 0.0,
        }
    }
}

impl TrialResources {
    pub fn new(num_cpus: f64, num_gpus: f64) -> Self {
        Self { num_cpus, num_gpus }
    }

    /// Claim every CPU and accelerator the host exposes, which serializes
    /// trials: the next one starts only after the previous releases the
    /// machine.
    pub fn whole_host(host: &HostResources) -> Self {
        Self {
            num_cpus: host.num_cpus as f64,
            num_gpus: host.num_gpus as f64,
        }
    }
}

/// What the current machine offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostResources {
    pub num_cpus: usize,
    pub num_gpus: usize,
}

impl HostResources {
    pub fn detect() -> Self {
        Self {
            num_cpus: logical_cpu_count(),
            num_gpus: accelerator_count(),
        }
    }
}

/// How many trials may run at once given per-trial requirements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcurrencyPlan {
    /// Upper bound on simultaneously running trials.
    pub max_concurrent: usize,

    /// Per-trial resource spec the bound was derived from.
    pub per_trial: TrialResources,

    /// Host capacity the bound was derived from.
    pub host: HostResources,
}

impl ConcurrencyPlan {
    /// Derive the concurrency bound from host capacity and per-trial needs,
    /// capped at the number of trials in the run.
    pub fn new(host: HostResources, per_trial: TrialResources, total_trials: usize) -> Self {
        let cpu_slots = slots(host.num_cpus as f64, per_trial.num_cpus);
        let gpu_slots = slots(host.num_gpus as f64, per_trial.num_gpus);
        let raw = cpu_slots.min(gpu_slots);
        if raw == 0 {
            tracing::warn!(
                requested_cpus = per_trial.num_cpus,
                requested_gpus = per_trial.num_gpus,
                host_cpus = host.num_cpus,
                host_gpus = host.num_gpus,
                "per-trial request exceeds host capacity, running one trial at a time"
            );
        }
        let max_concurrent = raw.max(1).min(total_trials.max(1));
        Self {
            max_concurrent,
            per_trial,
            host,
        }
    }
}

fn slots(available: f64, requested: f64) -> usize {
    if requested <= 0.0 {
        usize::MAX
    } else {
        (available / requested).floor() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_host_request_serializes_trials() {
        let host = HostResources {
            num_cpus: 8,
            num_gpus: 1,
        };
        let plan = ConcurrencyPlan::new(host, TrialResources::whole_host(&host), 25);
        assert_eq!(plan.max_concurrent, 1);
    }

    #[test]
    fn fractional_gpu_shares_a_device() {
        let host = HostResources {
            num_cpus: 8,
            num_gpus: 1,
        };
        let plan = ConcurrencyPlan::new(host, TrialResources::new(1.0, 0.5), 25);
        assert_eq!(plan.max_concurrent, 2);
    }

    #[test]
    fn concurrency_caps_at_trial_count() {
        let host = HostResources {
            num_cpus: 16,
            num_gpus: 0,
        };
        let plan = ConcurrencyPlan::new(host, TrialResources::new(1.0, 0.0), 3);
        assert_eq!(plan.max_concurrent, 3);
    }

    #[test]
    fn oversubscribed_request_still_runs_one() {
        let host = HostResources {
            num_cpus: 4,
            num_gpus: 0,
        };
        let plan = ConcurrencyPlan::new(host, TrialResources::new(1.0, 1.0), 10);
        assert_eq!(plan.max_concurrent, 1);
    }

    #[test]
    fn detect_reports_at_least_one_cpu() {
        let host = HostResources::detect();
        assert!(host.num_cpus >= 1);
    }
}
