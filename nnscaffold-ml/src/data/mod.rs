//! Dataset plug-point.
//!
//! A run consumes classification items through [`RunDataset`], a burn
//! [`Dataset`] that also knows its class names and feature size. Replace
//! [`MockClassificationDataset`] with your own implementation.

pub mod loader;
pub mod mock;

use burn::data::dataset::Dataset;

pub use loader::{Batch, BatchLoader};
pub use mock::MockClassificationDataset;

/// One labelled feature vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationItem {
    pub features: Vec<f32>,
    pub label: usize,
}

/// A classification dataset usable by the run driver.
pub trait RunDataset: Dataset<ClassificationItem> {
    /// Human-readable class names, indexed by label.
    fn class_names(&self) -> Vec<String>;

    /// Length of every item's feature vector.
    fn feature_size(&self) -> usize;

    fn nb_classes(&self) -> usize {
        self.class_names().len()
    }
}

/// The datasets of one run.
pub struct Datasets {
    pub train: Box<dyn RunDataset>,
    pub test: Box<dyn RunDataset>,
}
