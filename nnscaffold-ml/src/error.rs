//! Error types for the nnscaffold-ml crate.

use nnscaffold_core::{CoreError, OutputError, SettingsError};
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for datasets, networks, runs, and planners.
#[derive(Debug, Error)]
pub enum MlError {
    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Planner error: {0}")]
    Planner(#[from] PlannerError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl MlError {
    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }

    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }

    /// The message and every source below it, joined on one line.
    pub fn chain(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            let text = cause.to_string();
            if !message.contains(&text) {
                message.push_str(": ");
                message.push_str(&text);
            }
            source = cause.source();
        }
        message
    }
}

/// Errors detected while building or loading a plan, before any run starts.
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("Empty planners list for {kind} planner")]
    EmptyPlanners { kind: &'static str },

    #[error("No values to iterate for setting '{setting}'")]
    EmptyValues { setting: String },

    #[error(
        "Impossible to run parallel planner if all sub-planners don't have the same length \
         (expected {expected}, found {found})"
    )]
    LengthMismatch { expected: usize, found: usize },

    #[error("Invalid settings for run '{run}': {source}")]
    InvalidRun {
        run: String,
        #[source]
        source: SettingsError,
    },

    #[error("Duplicate run name in plan: {name}")]
    DuplicateRunName { name: String },

    #[error("Plan file not found: {}", path.display())]
    PlanFileNotFound { path: PathBuf },

    #[error("Invalid plan file {}: {source}", path.display())]
    InvalidPlanFile {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for ML results.
pub type Result<T> = std::result::Result<T, MlError>;
