//! # nnscaffold-ml
//!
//! Plug-points and drivers of a training project:
//!
//! 1. **Datasets**: [`RunDataset`](data::RunDataset), with a mock gaussian-blob dataset
//! 2. **Networks**: [`Network`](network::Network), with a burn MLP classifier
//! 3. **Experiment**: the pair of them, as used by a run
//! 4. **Runs**: [`start_run`] trains then tests under one settings snapshot
//! 5. **Planners**: [`start_planner`] sweeps settings snapshots, one run each

pub mod data;
pub mod error;
pub mod experiment;
pub mod network;
pub mod run;
pub mod training;

pub use error::{MlError, PlannerError};
pub use experiment::{Experiment, MockExperiment};
pub use run::start_run;
pub use training::{PlanFile, Planner, PlannerSummary, RunReport, RunStatus, start_planner};
