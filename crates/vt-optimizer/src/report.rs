//! Run reports: ranking, best-trial extraction and export.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vt_types::{TuneError, VtResult};

use crate::search::ParamMap;
use crate::trial::{ObjectiveDirection, RunId, Trial, TrialStatus};

/// One row of the per-trial summary table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRow {
    pub number: usize,
    pub status: TrialStatus,
    /// Last reported objective, absent for trials that never reported.
    pub objective: Option<f64>,
    pub epochs_completed: u32,
    pub duration_seconds: Option<u64>,
    pub parameters: ParamMap,
}

impl TrialRow {
    pub fn from_trial(trial: &Trial) -> Self {
        Self {
            number: trial.number,
            status: trial.status,
            objective: trial.result.as_ref().map(|r| r.objective),
            epochs_completed: trial.result.as_ref().map(|r| r.epochs_completed).unwrap_or(0),
            duration_seconds: trial.duration_seconds(),
            parameters: trial.parameters.clone(),
        }
    }
}

/// Summary of a finished search run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub metric: String,
    pub direction: ObjectiveDirection,
    pub searcher: String,
    pub scheduler: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub trials: Vec<TrialRow>,
}

impl RunReport {
    /// Rows sorted best-first under the run direction; rows without an
    /// objective sort last.
    pub fn ranked(&self) -> Vec<&TrialRow> {
        let mut rows: Vec<&TrialRow> = self.trials.iter().collect();
        rows.sort_by(|a, b| match (a.objective, b.objective) {
            (Some(x), Some(y)) => {
                let ord = x.partial_cmp(&y).unwrap_or(Ordering::Equal);
                match self.direction {
                    ObjectiveDirection::Minimize => ord,
                    ObjectiveDirection::Maximize => ord.reverse(),
                }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
        rows
    }

    /// Best trial that reported an objective. Early-stopped trials compete
    /// with completed ones; failed trials never win.
    pub fn best_trial(&self) -> Option<&TrialRow> {
        self.ranked()
            .into_iter()
            .find(|row| row.objective.is_some() && row.status != TrialStatus::Failed)
    }

    pub fn require_best(&self) -> VtResult<&TrialRow> {
        self.best_trial()
            .ok_or_else(|| TuneError::NoCompletedTrials.into())
    }

    pub fn save_json(&self, path: &Path) -> VtResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load_json(path: &Path) -> VtResult<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Flat per-trial table with one column per parameter.
    pub fn save_csv(&self, path: &Path) -> VtResult<()> {
        let mut columns: BTreeSet<String> = BTreeSet::new();
        for row in &self.trials {
            columns.extend(row.parameters.keys().cloned());
        }

        let report_err = |e: csv::Error| TuneError::ReportFailed {
            message: format!("Failed to write CSV report to {}: {}", path.display(), e),
        };

        let mut writer = csv::Writer::from_path(path).map_err(report_err)?;
        let mut header = vec![
            "trial_number".to_string(),
            "status".to_string(),
            "objective".to_string(),
            "epochs_completed".to_string(),
            "duration_seconds".to_string(),
        ];
        header.extend(columns.iter().cloned());
        writer.write_record(&header).map_err(report_err)?;

        for row in &self.trials {
            let mut record = vec![
                row.number.to_string(),
                row.status.to_string(),
                row.objective.map(|v| v.to_string()).unwrap_or_default(),
                row.epochs_completed.to_string(),
                row.duration_seconds.map(|s| s.to_string()).unwrap_or_default(),
            ];
            for name in &columns {
                record.push(
                    row.parameters
                        .get(name)
                        .map(|v| v.to_string())
                        .unwrap_or_default(),
                );
            }
            writer.write_record(&record).map_err(report_err)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::ParameterValue;
    use uuid::Uuid;

    fn row(number: usize, status: TrialStatus, objective: Option<f64>) -> TrialRow {
        let mut parameters = ParamMap::new();
        parameters.insert("learning_rate".into(), ParameterValue::Float(1e-4));
        parameters.insert(
            "lr_scheduler_type".into(),
            ParameterValue::Json(serde_json::json!("cosine")),
        );
        TrialRow {
            number,
            status,
            objective,
            epochs_completed: 5,
            duration_seconds: Some(42),
            parameters,
        }
    }

    fn report(trials: Vec<TrialRow>) -> RunReport {
        RunReport {
            run_id: Uuid::new_v4(),
            metric: "eval_loss".into(),
            direction: ObjectiveDirection::Minimize,
            searcher: "tpe".into(),
            scheduler: "asha".into(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            trials,
        }
    }

    #[test]
    fn best_trial_is_lowest_objective_when_minimizing() {
        let report = report(vec![
            row(0, TrialStatus::Completed, Some(0.5)),
            row(1, TrialStatus::Completed, Some(0.3)),
            row(2, TrialStatus::Failed, None),
        ]);
        let best = report.best_trial().unwrap();
        assert_eq!(best.number, 1);
    }

    #[test]
    fn early_stopped_trial_can_win() {
        let report = report(vec![
            row(0, TrialStatus::Completed, Some(0.5)),
            row(1, TrialStatus::Stopped, Some(0.2)),
        ]);
        assert_eq!(report.best_trial().unwrap().number, 1);
    }

    #[test]
    fn ranked_puts_unscored_rows_last() {
        let report = report(vec![
            row(0, TrialStatus::Failed, None),
            row(1, TrialStatus::Completed, Some(0.9)),
            row(2, TrialStatus::Completed, Some(0.1)),
        ]);
        let numbers: Vec<usize> = report.ranked().iter().map(|r| r.number).collect();
        assert_eq!(numbers, vec![2, 1, 0]);
    }

    #[test]
    fn require_best_fails_without_scored_trials() {
        let report = report(vec![row(0, TrialStatus::Failed, None)]);
        match report.require_best() {
            Err(vt_types::VtError::Tune(TuneError::NoCompletedTrials)) => {}
            other => panic!("Expected NoCompletedTrials, got: {:?}", other),
        }
    }

    #[test]
    fn csv_export_has_one_column_per_parameter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trials.csv");
        let report = report(vec![
            row(0, TrialStatus::Completed, Some(0.5)),
            row(1, TrialStatus::Stopped, Some(0.3)),
        ]);
        report.save_csv(&path).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        let header = lines.next().unwrap();
        assert_eq!(
            header,
            "trial_number,status,objective,epochs_completed,duration_seconds,learning_rate,lr_scheduler_type"
        );
        assert_eq!(lines.count(), 2);
    }

    #[test]
    fn json_round_trip_preserves_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let report = report(vec![row(0, TrialStatus::Completed, Some(0.4))]);
        report.save_json(&path).unwrap();
        let back = RunReport::load_json(&path).unwrap();
        assert_eq!(report, back);
    }
}
