//! Training callbacks: early stopping and divergence detection.

use nnscaffold_core::Settings;

use crate::training::metrics::TrainingMetrics;

/// Action a callback can request at the end of an epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    Continue,
    /// End the training normally, keeping the current parameters.
    Stop(String),
    /// Abort the training with an error.
    Fail(String),
}

/// Trait for training callbacks.
pub trait TrainingCallback {
    fn name(&self) -> &str;

    /// Called at the end of each epoch with the 1-based epoch number.
    fn on_epoch_end(&mut self, epoch: usize, metrics: &TrainingMetrics) -> CallbackAction;
}

/// Stop when the epoch loss has not improved by `min_delta` for `patience` epochs.
#[derive(Debug, Clone)]
pub struct EarlyStoppingCallback {
    pub patience: usize,
    pub min_delta: f64,
    counter: usize,
    best_loss: Option<f64>,
}

impl EarlyStoppingCallback {
    pub fn new(patience: usize, min_delta: f64) -> Self {
        Self {
            patience,
            min_delta,
            counter: 0,
            best_loss: None,
        }
    }

    fn observe(&mut self, epoch: usize, loss: f64) -> CallbackAction {
        match self.best_loss {
            None => {
                self.best_loss = Some(loss);
                CallbackAction::Continue
            }
            Some(best) if loss < best - self.min_delta => {
                self.best_loss = Some(loss);
                self.counter = 0;
                CallbackAction::Continue
            }
            Some(best) => {
                self.counter += 1;
                if self.counter >= self.patience {
                    CallbackAction::Stop(format!(
                        "early stopping at epoch {epoch}: no improvement over {best:.4} for {} epochs",
                        self.counter
                    ))
                } else {
                    CallbackAction::Continue
                }
            }
        }
    }
}

impl TrainingCallback for EarlyStoppingCallback {
    fn name(&self) -> &str {
        "early stopping"
    }

    fn on_epoch_end(&mut self, epoch: usize, metrics: &TrainingMetrics) -> CallbackAction {
        match metrics.last_epoch_loss() {
            Some(loss) => self.observe(epoch, loss),
            None => CallbackAction::Continue,
        }
    }
}

/// Fail the training as soon as the epoch loss is NaN or infinite.
#[derive(Debug, Clone, Default)]
pub struct DivergenceGuard;

impl TrainingCallback for DivergenceGuard {
    fn name(&self) -> &str {
        "divergence guard"
    }

    fn on_epoch_end(&mut self, epoch: usize, metrics: &TrainingMetrics) -> CallbackAction {
        match metrics.last_epoch_loss() {
            Some(loss) if !loss.is_finite() => {
                CallbackAction::Fail(format!("loss diverged at epoch {epoch} (loss = {loss})"))
            }
            _ => CallbackAction::Continue,
        }
    }
}

/// Callbacks enabled by the settings, in the order they run.
pub fn callbacks_from_settings(settings: &Settings) -> Vec<Box<dyn TrainingCallback>> {
    let mut callbacks: Vec<Box<dyn TrainingCallback>> = vec![Box::new(DivergenceGuard)];
    if let Some(patience) = settings.early_stopping_patience {
        callbacks.push(Box::new(EarlyStoppingCallback::new(patience, 0.0)));
    }
    callbacks
}
