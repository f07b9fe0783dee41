//! Search run drivers.
//!
//! A [`TuneDriver`] takes one [`TuneRequest`] and runs it to completion.
//! The shipped [`LocalTuneDriver`] owns the suggest/evaluate/report loop
//! in-process: it asks the searcher for parameter combinations, spawns
//! trial evaluations up to the host concurrency bound, relays intermediate
//! results to the scheduler, and folds finished trials back into the
//! searcher and the run status.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use vt_types::{internal_error, VtResult};

use crate::report::{RunReport, TrialRow};
use crate::resources::{ConcurrencyPlan, HostResources, TrialResources};
use crate::scheduler::{AshaScheduler, FifoScheduler, SchedulerDecision, TrialScheduler};
use crate::search::{SearchSpace, SearchStrategy};
use crate::tpe::TpeSearch;
use crate::trial::{ObjectiveDirection, RunStatus, Trial, TrialResult};

/// Everything a driver needs to run one search.
pub struct TuneRequest {
    pub space: SearchSpace,

    /// Number of parameter combinations to evaluate.
    pub n_trials: usize,

    /// Metric the evaluator reports (e.g. "eval_loss").
    pub metric: String,

    pub direction: ObjectiveDirection,

    /// Compute one trial asks for; concurrency slots come from dividing the
    /// host by this request.
    pub resources: TrialResources,

    /// Seed for the searcher. `None` leaves sampling nondeterministic.
    pub seed: Option<u64>,

    /// Stop trailing trials at rung boundaries instead of running every
    /// trial to its final epoch.
    pub early_stopping: bool,

    pub evaluator: Arc<dyn TrialEvaluator>,
}

/// What a finished run hands back.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Result of the trial with the best objective, when any trial finished.
    pub best: Option<TrialResult>,
    pub report: RunReport,
}

/// Handle a running trial uses to report intermediate results.
#[derive(Clone)]
pub struct TrialContext {
    number: usize,
    scheduler: Arc<Mutex<Box<dyn TrialScheduler>>>,
}

impl TrialContext {
    /// Report the objective after `t` scheduler units (epochs here). The
    /// caller must stop training when the verdict is
    /// [`SchedulerDecision::Stop`].
    pub fn report(&self, t: u64, value: f64) -> SchedulerDecision {
        self.scheduler.lock().on_result(self.number as u64, t, value)
    }
}

/// Evaluates one parameter combination end to end.
#[async_trait]
pub trait TrialEvaluator: Send + Sync {
    async fn evaluate(&self, trial: &Trial, ctx: TrialContext) -> VtResult<TrialResult>;
}

/// Runs a search request to completion.
#[async_trait]
pub trait TuneDriver: Send + Sync {
    async fn run(&self, request: TuneRequest) -> VtResult<SearchOutcome>;

    fn name(&self) -> &str;
}

/// In-process driver: a TPE searcher over the request space, successive
/// halving when early stopping is on (FIFO otherwise), and a `JoinSet`
/// bounded by the host concurrency plan.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTuneDriver;

impl LocalTuneDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TuneDriver for LocalTuneDriver {
    async fn run(&self, request: TuneRequest) -> VtResult<SearchOutcome> {
        let TuneRequest {
            space,
            n_trials,
            metric,
            direction,
            resources,
            seed,
            early_stopping,
            evaluator,
        } = request;
        space.validate()?;

        let mut tpe = TpeSearch::new(space).with_direction(direction);
        if let Some(seed) = seed {
            tpe = tpe.with_seed(seed);
        }
        let searcher: Box<dyn SearchStrategy + Send> = Box::new(tpe);

        let scheduler: Box<dyn TrialScheduler> = if early_stopping {
            Box::new(AshaScheduler::new().with_direction(direction))
        } else {
            Box::new(FifoScheduler)
        };

        let host = HostResources::detect();
        let plan = ConcurrencyPlan::new(host, resources, n_trials);
        info!(
            num_cpus = host.num_cpus,
            num_gpus = host.num_gpus,
            max_concurrent = plan.max_concurrent,
            "planned trial concurrency"
        );

        let run = RunLoop::new(
            metric,
            direction,
            n_trials,
            plan.max_concurrent,
            searcher,
            scheduler,
        );
        run.run(evaluator).await
    }

    fn name(&self) -> &str {
        "local"
    }
}

/// State of one in-flight run.
struct RunLoop {
    n_trials: usize,
    max_concurrent: usize,
    searcher: Box<dyn SearchStrategy + Send>,
    scheduler: Arc<Mutex<Box<dyn TrialScheduler>>>,
    status: RunStatus,
    trials: Vec<Trial>,
}

impl RunLoop {
    fn new(
        metric: String,
        direction: ObjectiveDirection,
        n_trials: usize,
        max_concurrent: usize,
        searcher: Box<dyn SearchStrategy + Send>,
        scheduler: Box<dyn TrialScheduler>,
    ) -> Self {
        let status = RunStatus::new(Uuid::new_v4(), metric, direction);
        Self {
            n_trials,
            max_concurrent: max_concurrent.max(1),
            searcher,
            scheduler: Arc::new(Mutex::new(scheduler)),
            status,
            trials: Vec::new(),
        }
    }

    /// Run the whole search. A failed trial is recorded and the run moves
    /// on; only a panicked trial task aborts the run.
    async fn run(mut self, evaluator: Arc<dyn TrialEvaluator>) -> VtResult<SearchOutcome> {
        self.status.mark_running();
        info!(
            run_id = %self.status.run_id,
            n_trials = self.n_trials,
            max_concurrent = self.max_concurrent,
            searcher = self.searcher.name(),
            scheduler = self.scheduler.lock().name(),
            "starting search run"
        );

        let mut join_set: JoinSet<(usize, VtResult<TrialResult>)> = JoinSet::new();
        let mut next = 0usize;

        while next < self.n_trials || !join_set.is_empty() {
            while next < self.n_trials && join_set.len() < self.max_concurrent {
                let params = self
                    .searcher
                    .suggest(1)
                    .into_iter()
                    .next()
                    .ok_or_else(|| internal_error!("searcher returned no suggestion"))?;
                let mut trial = Trial::new(self.status.run_id, next, params);
                trial.mark_running();
                debug!(trial = trial.number, params = ?trial.parameters, "starting trial");

                let ctx = TrialContext {
                    number: trial.number,
                    scheduler: Arc::clone(&self.scheduler),
                };
                let task_evaluator = Arc::clone(&evaluator);
                let task_trial = trial.clone();
                join_set.spawn(async move {
                    let outcome = task_evaluator.evaluate(&task_trial, ctx).await;
                    (task_trial.number, outcome)
                });
                self.trials.push(trial);
                next += 1;
            }

            match join_set.join_next().await {
                Some(Ok((number, outcome))) => self.finish_trial(number, outcome),
                Some(Err(join_err)) => {
                    let message = format!("Trial task aborted: {}", join_err);
                    self.status.mark_failed(message.clone());
                    return Err(internal_error!("{}", message));
                }
                None => break,
            }
        }

        self.status.mark_completed();
        match &self.status.best_trial {
            Some(best) => info!(
                run_id = %self.status.run_id,
                objective = best.objective,
                "search run finished"
            ),
            None => warn!(run_id = %self.status.run_id, "search run finished with no result"),
        }
        let report = self.build_report();
        Ok(SearchOutcome {
            best: self.status.best_trial.clone(),
            report,
        })
    }

    fn finish_trial(&mut self, number: usize, outcome: VtResult<TrialResult>) {
        match outcome {
            Ok(result) => {
                self.searcher.report(&result.parameters, result.objective);
                self.status.update_best(&result);
                if result.early_stopped {
                    self.status.trials_stopped += 1;
                } else {
                    self.status.trials_completed += 1;
                }
                debug!(
                    trial = number,
                    objective = result.objective,
                    epochs = result.epochs_completed,
                    early_stopped = result.early_stopped,
                    "trial finished"
                );
                if let Some(trial) = self.trials.get_mut(number) {
                    if result.early_stopped {
                        trial.mark_stopped(result);
                    } else {
                        trial.mark_completed(result);
                    }
                }
            }
            Err(e) => {
                warn!(trial = number, error = %e, "trial failed");
                self.status.trials_failed += 1;
                if let Some(trial) = self.trials.get_mut(number) {
                    trial.mark_failed(e.to_string());
                }
            }
        }
    }

    fn build_report(&self) -> RunReport {
        RunReport {
            run_id: self.status.run_id,
            metric: self.status.metric.clone(),
            direction: self.status.direction,
            searcher: self.searcher.name().to_string(),
            scheduler: self.scheduler.lock().name().to_string(),
            started_at: self.status.started_at.unwrap_or_else(Utc::now),
            finished_at: self.status.finished_at.unwrap_or_else(Utc::now),
            trials: self.trials.iter().map(TrialRow::from_trial).collect(),
        }
    }
}
