//! Training metrics tracking.

use serde::{Deserialize, Serialize};

use crate::error::MlError;

/// Train and validation accuracy measured in the middle of the training.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccuracyCheckpoint {
    /// Number of batches processed since the start of the training.
    pub batch_num: usize,
    pub epoch: usize,
    pub train_accuracy: f64,
    pub validation_accuracy: f64,
}

/// Training metrics of one run, saved as `metrics.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub epochs_completed: usize,
    /// Loss of every training batch.
    pub batch_losses: Vec<f64>,
    /// Average loss of every epoch.
    pub loss_history: Vec<f64>,
    pub best_epoch: Option<usize>,
    pub best_loss: Option<f64>,
    pub accuracy_evolution: Vec<AccuracyCheckpoint>,
    pub best_checkpoint: Option<AccuracyCheckpoint>,
    pub confusion_matrix: Option<ConfusionMatrix>,
    pub total_training_time_secs: f64,
    pub loaded_from_cache: bool,
    pub stop_reason: Option<String>,
}

impl TrainingMetrics {
    pub fn record_batch(&mut self, loss: f64) {
        self.batch_losses.push(loss);
    }

    pub fn record_epoch(&mut self, loss: f64) {
        self.loss_history.push(loss);
        self.epochs_completed += 1;

        let improved = loss.is_finite() && self.best_loss.is_none_or(|best| loss < best);
        if improved {
            self.best_loss = Some(loss);
            self.best_epoch = Some(self.epochs_completed);
        }
    }

    /// Record a checkpoint. Returns true when it is the new best by validation accuracy.
    pub fn record_checkpoint(&mut self, checkpoint: AccuracyCheckpoint) -> bool {
        self.accuracy_evolution.push(checkpoint);
        let is_best = self
            .best_checkpoint
            .is_none_or(|best| checkpoint.validation_accuracy > best.validation_accuracy);
        if is_best {
            self.best_checkpoint = Some(checkpoint);
        }
        is_best
    }

    pub fn last_epoch_loss(&self) -> Option<f64> {
        self.loss_history.last().copied()
    }
}

/// Counts of (true label, predicted label) pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub class_names: Vec<String>,
    /// `counts[label][prediction]`
    pub counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    pub fn new(class_names: Vec<String>) -> Self {
        let nb_classes = class_names.len();
        Self {
            class_names,
            counts: vec![vec![0; nb_classes]; nb_classes],
        }
    }

    pub fn nb_classes(&self) -> usize {
        self.class_names.len()
    }

    pub fn record(&mut self, label: usize, prediction: usize) -> Result<(), MlError> {
        let nb_classes = self.nb_classes();
        if label >= nb_classes || prediction >= nb_classes {
            return Err(MlError::evaluation(format!(
                "label {label} / prediction {prediction} out of range for {nb_classes} classes"
            )));
        }
        self.counts[label][prediction] += 1;
        Ok(())
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    pub fn correct(&self) -> usize {
        (0..self.nb_classes()).map(|i| self.counts[i][i]).sum()
    }

    /// Overall accuracy in `[0, 1]`; 0 when nothing was recorded.
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.correct() as f64 / total as f64
        }
    }

    /// Accuracy of each class; a class without samples scores 0.
    pub fn class_accuracies(&self) -> Vec<f64> {
        self.counts
            .iter()
            .enumerate()
            .map(|(class, row)| {
                let samples: usize = row.iter().sum();
                if samples == 0 {
                    0.0
                } else {
                    row[class] as f64 / samples as f64
                }
            })
            .collect()
    }
}
