//! Experiment plug-point: which datasets and which network a run uses.

use burn::backend::{Autodiff, NdArray};
use burn::tensor::backend::Backend;
use nnscaffold_core::Settings;

use crate::data::{Datasets, MockClassificationDataset};
use crate::error::MlError;
use crate::network::simple_classifier::sgd_optimizer;
use crate::network::{Network, SimpleClassifier, SimpleClassifierConfig};
use crate::training::reproducibility::{
    NETWORK_COMPONENT, SeedManager, TEST_DATASET_COMPONENT, TRAIN_DATASET_COMPONENT,
};

/// CPU backend with automatic differentiation, used by the example network.
pub type TrainBackend = Autodiff<NdArray>;

/// Provides the datasets and the network of a run.
///
/// Implement this for your project and hand it to
/// [`start_run`](crate::run::start_run) or
/// [`start_planner`](crate::training::planner::start_planner).
pub trait Experiment {
    fn name(&self) -> &str;

    fn load_datasets(&self, settings: &Settings, seeds: &SeedManager) -> Result<Datasets, MlError>;

    fn build_network(
        &self,
        settings: &Settings,
        seeds: &SeedManager,
        input_size: usize,
        nb_classes: usize,
    ) -> Result<Box<dyn Network>, MlError>;
}

/// Gaussian-blob dataset classified by [`SimpleClassifier`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MockExperiment;

impl Experiment for MockExperiment {
    fn name(&self) -> &str {
        "mock classification"
    }

    fn load_datasets(&self, settings: &Settings, seeds: &SeedManager) -> Result<Datasets, MlError> {
        let train = MockClassificationDataset::generate(
            settings.nb_classes,
            settings.train_point_per_class,
            &mut seeds.rng_for(TRAIN_DATASET_COMPONENT),
        )?;
        let test = MockClassificationDataset::generate(
            settings.nb_classes,
            settings.test_point_per_class,
            &mut seeds.rng_for(TEST_DATASET_COMPONENT),
        )?;
        Ok(Datasets {
            train: Box::new(train),
            test: Box::new(test),
        })
    }

    fn build_network(
        &self,
        settings: &Settings,
        seeds: &SeedManager,
        input_size: usize,
        nb_classes: usize,
    ) -> Result<Box<dyn Network>, MlError> {
        let device = Default::default();
        TrainBackend::seed(&device, seeds.seed_for(NETWORK_COMPONENT));

        let optimizer_name = if settings.momentum > 0.0 {
            format!("sgd (momentum {})", settings.momentum)
        } else {
            "sgd".to_string()
        };
        Ok(Box::new(SimpleClassifier::<TrainBackend, _>::new(
            SimpleClassifierConfig::new(input_size, nb_classes),
            sgd_optimizer::<TrainBackend>(settings.momentum),
            optimizer_name,
            settings.learning_rate,
            device,
        )))
    }
}
