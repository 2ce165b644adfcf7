//! Network testing.

use nnscaffold_core::{RunDirectory, Settings, Timers};
use serde::Serialize;
use tracing::Level;

use crate::data::{BatchLoader, RunDataset};
use crate::error::MlError;
use crate::network::Network;
use crate::training::metrics::{ConfusionMatrix, TrainingMetrics};

/// Result of a test pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestOutcome {
    pub accuracy: f64,
    pub classes_accuracy: Vec<f64>,
    #[serde(skip)]
    pub confusion_matrix: ConfusionMatrix,
}

/// Predict every item of `dataset`, in order, and count the outcomes.
pub fn confusion_matrix(
    network: &dyn Network,
    dataset: &dyn RunDataset,
    batch_size: usize,
) -> Result<ConfusionMatrix, MlError> {
    let mut matrix = ConfusionMatrix::new(dataset.class_names());
    let loader = BatchLoader::sequential(dataset, batch_size);
    for batch in loader.iter() {
        let batch = batch?;
        let predictions = network.predict(&batch)?;
        if predictions.len() != batch.len() {
            return Err(MlError::evaluation(format!(
                "network returned {} predictions for a batch of {}",
                predictions.len(),
                batch.len()
            )));
        }
        for (&label, prediction) in batch.labels.iter().zip(predictions) {
            matrix.record(label, prediction)?;
        }
    }
    Ok(matrix)
}

/// Overall accuracy of `network` on `dataset`, in `[0, 1]`.
pub fn evaluate_accuracy(
    network: &dyn Network,
    dataset: &dyn RunDataset,
    batch_size: usize,
) -> Result<f64, MlError> {
    Ok(confusion_matrix(network, dataset, batch_size)?.accuracy())
}

/// Test the network on `dataset` and log the overall and per-class accuracy.
///
/// On the final test the accuracies are appended to `results.yaml` and the
/// confusion matrix is kept in the run metrics.
pub fn test_network(
    network: &dyn Network,
    dataset: &dyn RunDataset,
    settings: &Settings,
    run_dir: &RunDirectory,
    timers: &Timers,
    metrics: &mut TrainingMetrics,
    final_test: bool,
) -> Result<TestOutcome, MlError> {
    let _timer = timers.section("network testing", Level::INFO);

    let matrix = confusion_matrix(network, dataset, settings.batch_size)?;
    if matrix.total() == 0 {
        tracing::warn!("Testing dataset is empty, accuracy reported as 0");
    }

    let outcome = TestOutcome {
        accuracy: matrix.accuracy(),
        classes_accuracy: matrix.class_accuracies(),
        confusion_matrix: matrix,
    };

    tracing::info!("Test overall accuracy: {:05.2}%", outcome.accuracy * 100.0);
    let per_class: Vec<String> = outcome
        .confusion_matrix
        .class_names
        .iter()
        .zip(&outcome.classes_accuracy)
        .map(|(name, accuracy)| format!("{name}: {:05.2}%", accuracy * 100.0))
        .collect();
    tracing::info!("Test accuracy per classes:\n\t{}", per_class.join("\n\t"));

    if final_test {
        run_dir.append_results(&outcome)?;
        metrics.confusion_matrix = Some(outcome.confusion_matrix.clone());
    }

    Ok(outcome)
}
