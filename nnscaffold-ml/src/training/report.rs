//! Run reports and the planner summary.

use chrono::{DateTime, Utc};
use nnscaffold_core::persistence::{atomic_write_json, load_json};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::MlError;

/// File written in `out_dir` by the planner.
pub const PLANNER_SUMMARY_FILE: &str = "planner-summary.json";

/// Outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
    Skipped,
}

/// What happened during one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub name: String,
    pub directory: PathBuf,
    pub status: RunStatus,
    pub accuracy: Option<f64>,
    pub duration_secs: f64,
    pub error: Option<String>,
}

impl RunReport {
    pub fn skipped(name: &str, directory: &Path) -> Self {
        Self {
            name: name.to_string(),
            directory: directory.to_path_buf(),
            status: RunStatus::Skipped,
            accuracy: None,
            duration_secs: 0.0,
            error: None,
        }
    }

    pub fn failed(name: &str, directory: &Path, error: &MlError) -> Self {
        Self {
            name: name.to_string(),
            directory: directory.to_path_buf(),
            status: RunStatus::Failed,
            accuracy: None,
            duration_secs: 0.0,
            error: Some(error.chain()),
        }
    }
}

/// Every run started by one planner execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerSummary {
    pub id: String,
    pub planned_runs: usize,
    pub runs: Vec<RunReport>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PlannerSummary {
    pub fn new(planned_runs: usize) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            planned_runs,
            runs: Vec::new(),
            started_at: now,
            updated_at: now,
        }
    }

    pub fn add(&mut self, report: RunReport) {
        self.runs.push(report);
        self.updated_at = Utc::now();
    }

    pub fn find(&self, name: &str) -> Option<&RunReport> {
        self.runs.iter().find(|r| r.name == name)
    }

    pub fn list_by_status(&self, status: RunStatus) -> Vec<&RunReport> {
        self.runs.iter().filter(|r| r.status == status).collect()
    }

    pub fn count(&self, status: RunStatus) -> usize {
        self.runs.iter().filter(|r| r.status == status).count()
    }

    /// Completed run with the highest accuracy.
    pub fn best_run(&self) -> Option<&RunReport> {
        self.runs
            .iter()
            .filter(|r| r.status == RunStatus::Completed)
            .filter_map(|r| r.accuracy.map(|accuracy| (r, accuracy)))
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(r, _)| r)
    }

    pub fn load(path: &Path) -> Result<Option<Self>, MlError> {
        Ok(load_json(path)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), MlError> {
        atomic_write_json(path, self)?;
        Ok(())
    }
}
