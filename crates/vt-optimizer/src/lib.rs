//! # vt-optimizer
//!
//! Hyperparameter search orchestration for VidTune.
//!
//! Provides search space definitions, sweep strategies (random, TPE), trial
//! tracking, successive-halving schedulers, host resource planning, and the
//! async driver that runs a whole search against a trial evaluator.

mod driver;
mod report;
mod resources;
mod scheduler;
mod search;
mod tpe;
mod trial;

pub use driver::{
    LocalTuneDriver, SearchOutcome, TrialContext, TrialEvaluator, TuneDriver, TuneRequest,
};
pub use report::{RunReport, TrialRow};
pub use resources::{ConcurrencyPlan, HostResources, TrialResources};
pub use scheduler::{AshaScheduler, FifoScheduler, SchedulerDecision, TrialScheduler};
pub use search::{
    ParamMap, ParameterDef, ParameterKind, ParameterValue, RandomSearch, SearchSpace,
    SearchStrategy,
};
pub use tpe::TpeSearch;
pub use trial::{
    ObjectiveDirection, RunId, RunState, RunStatus, Trial, TrialResult, TrialStatus,
};
