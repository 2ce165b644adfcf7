//! Training infrastructure: train and test loops, metrics, callbacks,
//! checkpoints, seeds, and runs planners.

pub mod callbacks;
pub mod checkpoint;
pub mod evaluate;
pub mod metrics;
pub mod planner;
pub mod report;
pub mod reproducibility;
pub mod train;

pub use evaluate::{TestOutcome, test_network};
pub use metrics::{AccuracyCheckpoint, ConfusionMatrix, TrainingMetrics};
pub use planner::{PlanFile, PlannedRun, Planner, start_planner};
pub use report::{PlannerSummary, RunReport, RunStatus};
pub use reproducibility::SeedManager;
pub use train::train;
