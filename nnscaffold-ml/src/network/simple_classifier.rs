//! Example network: a fully connected classifier with two hidden layers.

use burn::module::AutodiffModule;
use burn::nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig};
use burn::nn::{Linear, LinearConfig};
use burn::optim::momentum::MomentumConfig;
use burn::optim::{GradientsParams, Optimizer, SgdConfig};
use burn::prelude::*;
use burn::record::DefaultRecorder;
use burn::tensor::ElementConversion;
use burn::tensor::activation::relu;
use burn::tensor::backend::AutodiffBackend;
use std::path::{Path, PathBuf};

use super::{Network, NetworkInfo};
use crate::data::Batch;
use crate::error::MlError;

/// Extension added by the default burn file recorder.
pub const RECORD_EXTENSION: &str = "mpk";

#[derive(Module, Debug)]
pub struct ClassifierModel<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    fc3: Linear<B>,
}

impl<B: Backend> ClassifierModel<B> {
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = relu(self.fc1.forward(x));
        let x = relu(self.fc2.forward(x));
        self.fc3.forward(x)
    }
}

#[derive(Config, Debug)]
pub struct SimpleClassifierConfig {
    pub input_size: usize,
    pub nb_classes: usize,
    #[config(default = 50)]
    pub hidden_size: usize,
}

impl SimpleClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ClassifierModel<B> {
        ClassifierModel {
            fc1: LinearConfig::new(self.input_size, self.hidden_size).init(device),
            fc2: LinearConfig::new(self.hidden_size, self.hidden_size).init(device),
            fc3: LinearConfig::new(self.hidden_size, self.nb_classes).init(device),
        }
    }
}

/// SGD, with momentum when `momentum > 0`.
pub fn sgd_optimizer<B: AutodiffBackend>(momentum: f64) -> impl Optimizer<ClassifierModel<B>, B> {
    let momentum = (momentum > 0.0).then(|| MomentumConfig::new().with_momentum(momentum));
    SgdConfig::new()
        .with_momentum(momentum)
        .init::<B, ClassifierModel<B>>()
}

/// [`ClassifierModel`] with its loss and optimizer, trained with cross-entropy.
pub struct SimpleClassifier<B: AutodiffBackend, O> {
    model: ClassifierModel<B>,
    optimizer: O,
    loss: CrossEntropyLoss<B>,
    config: SimpleClassifierConfig,
    optimizer_name: String,
    learning_rate: f64,
    device: B::Device,
}

impl<B, O> SimpleClassifier<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<ClassifierModel<B>, B>,
{
    pub fn new(
        config: SimpleClassifierConfig,
        optimizer: O,
        optimizer_name: impl Into<String>,
        learning_rate: f64,
        device: B::Device,
    ) -> Self {
        Self {
            model: config.init(&device),
            loss: CrossEntropyLossConfig::new().init(&device),
            optimizer,
            config,
            optimizer_name: optimizer_name.into(),
            learning_rate,
            device,
        }
    }

    pub fn model(&self) -> &ClassifierModel<B> {
        &self.model
    }
}

fn features_tensor<B: Backend>(batch: &Batch, device: &B::Device) -> Tensor<B, 2> {
    let data = TensorData::new(batch.features.clone(), [batch.len(), batch.feature_size]);
    Tensor::from_data(data, device)
}

fn labels_tensor<B: Backend>(batch: &Batch, device: &B::Device) -> Tensor<B, 1, Int> {
    let labels: Vec<i64> = batch.labels.iter().map(|&l| l as i64).collect();
    Tensor::from_data(TensorData::new(labels, [batch.len()]), device)
}

impl<B, O> Network for SimpleClassifier<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<ClassifierModel<B>, B>,
{
    fn training_step(&mut self, batch: &Batch) -> Result<f64, MlError> {
        if batch.is_empty() {
            return Err(MlError::training("empty batch"));
        }
        if let Some(&label) = batch.labels.iter().find(|&&l| l >= self.config.nb_classes) {
            return Err(MlError::training(format!(
                "label {label} out of range for {} classes",
                self.config.nb_classes
            )));
        }

        let inputs = features_tensor::<B>(batch, &self.device);
        let targets = labels_tensor::<B>(batch, &self.device);

        let output = self.model.forward(inputs);
        let loss = self.loss.forward(output, targets);
        let loss_value = loss.clone().into_scalar().elem::<f64>();

        let grads = GradientsParams::from_grads(loss.backward(), &self.model);
        self.model = self
            .optimizer
            .step(self.learning_rate, self.model.clone(), grads);

        Ok(loss_value)
    }

    fn predict(&self, batch: &Batch) -> Result<Vec<usize>, MlError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let model = self.model.valid();
        let inputs = features_tensor::<B::InnerBackend>(batch, &self.device);
        let predictions = model.forward(inputs).argmax(1).into_data();
        Ok(predictions
            .iter::<i64>()
            .map(|prediction| prediction as usize)
            .collect())
    }

    fn info(&self) -> NetworkInfo {
        let hidden = self.config.hidden_size;
        NetworkInfo {
            name: "SimpleClassifier".to_string(),
            input_size: self.config.input_size,
            nb_classes: self.config.nb_classes,
            parameter_count: self.model.num_params(),
            layers: vec![
                format!("linear {} -> {hidden}, relu", self.config.input_size),
                format!("linear {hidden} -> {hidden}, relu"),
                format!("linear {hidden} -> {}", self.config.nb_classes),
            ],
            optimizer: self.optimizer_name.clone(),
            learning_rate: self.learning_rate,
        }
    }

    fn save(&self, path: &Path) -> Result<PathBuf, MlError> {
        let recorder = DefaultRecorder::new();
        self.model
            .clone()
            .save_file(path.to_path_buf(), &recorder)
            .map_err(|e| MlError::network(format!("failed to save {}: {e}", path.display())))?;
        Ok(path.with_extension(RECORD_EXTENSION))
    }

    fn load(&mut self, path: &Path) -> Result<(), MlError> {
        let file = path.with_extension(RECORD_EXTENSION);
        if !file.is_file() {
            return Err(MlError::network(format!(
                "network file not found: {}",
                file.display()
            )));
        }
        let recorder = DefaultRecorder::new();
        self.model = self
            .model
            .clone()
            .load_file(file, &recorder, &self.device)
            .map_err(|e| MlError::network(format!("failed to load {}: {e}", path.display())))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    type TestBackend = Autodiff<NdArray>;

    fn classifier(momentum: f64) -> Box<dyn Network> {
        let device = Default::default();
        let config = SimpleClassifierConfig::new(2, 3);
        Box::new(SimpleClassifier::<TestBackend, _>::new(
            config,
            sgd_optimizer::<TestBackend>(momentum),
            "sgd",
            0.05,
            device,
        ))
    }

    fn batch() -> Batch {
        Batch {
            features: vec![0.0, 0.0, 2.0, 2.0, 4.0, 4.0, 0.1, -0.1],
            feature_size: 2,
            labels: vec![0, 1, 2, 0],
        }
    }

    #[test]
    fn test_info_counts_parameters() {
        let info = classifier(0.9).info();
        assert_eq!(info.name, "SimpleClassifier");
        assert_eq!(info.input_size, 2);
        assert_eq!(info.nb_classes, 3);
        // (2*50 + 50) + (50*50 + 50) + (50*3 + 3)
        assert_eq!(info.parameter_count, 150 + 2550 + 153);
        assert_eq!(info.layers.len(), 3);
    }

    #[test]
    fn test_training_reduces_loss() {
        let mut network = classifier(0.9);
        let batch = batch();
        let first = network.training_step(&batch).unwrap();
        let mut last = first;
        for _ in 0..50 {
            last = network.training_step(&batch).unwrap();
        }
        assert!(first.is_finite());
        assert!(last < first, "loss did not decrease: {first} -> {last}");
    }

    #[test]
    fn test_predict_returns_one_label_per_item() {
        let network = classifier(0.0);
        let predictions = network.predict(&batch()).unwrap();
        assert_eq!(predictions.len(), 4);
        assert!(predictions.iter().all(|&p| p < 3));
    }

    #[test]
    fn test_out_of_range_label_is_an_error() {
        let mut network = classifier(0.9);
        let mut batch = batch();
        batch.labels[0] = 7;
        assert!(network.training_step(&batch).is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut trained = classifier(0.9);
        for _ in 0..5 {
            trained.training_step(&batch()).unwrap();
        }
        let path = trained.save(&dir.path().join("trained_network")).unwrap();
        assert_eq!(path, dir.path().join("trained_network.mpk"));
        assert!(path.is_file());

        let mut fresh = classifier(0.9);
        fresh.load(&path).unwrap();
        assert_eq!(
            fresh.predict(&batch()).unwrap(),
            trained.predict(&batch()).unwrap()
        );
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let mut network = classifier(0.9);
        let err = network.load(&dir.path().join("nothing")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
