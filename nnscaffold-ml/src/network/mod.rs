//! Network plug-point.

pub mod simple_classifier;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::data::Batch;
use crate::error::MlError;

pub use simple_classifier::{SimpleClassifier, SimpleClassifierConfig};

/// Description of a network, saved as `network_info.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub name: String,
    pub input_size: usize,
    pub nb_classes: usize,
    pub parameter_count: usize,
    pub layers: Vec<String>,
    pub optimizer: String,
    pub learning_rate: f64,
}

/// A trainable classifier driven by the run driver.
pub trait Network {
    /// Forward, backward, and one optimizer step on a batch. Returns the loss.
    fn training_step(&mut self, batch: &Batch) -> Result<f64, MlError>;

    /// Predicted label of every item in the batch, without gradient tracking.
    fn predict(&self, batch: &Batch) -> Result<Vec<usize>, MlError>;

    fn info(&self) -> NetworkInfo;

    /// Save the parameters under `path`, whose extension the network chooses.
    /// Returns the file actually written.
    fn save(&self, path: &Path) -> Result<PathBuf, MlError>;

    /// Replace the parameters with the ones saved at `path`.
    fn load(&mut self, path: &Path) -> Result<(), MlError>;
}
