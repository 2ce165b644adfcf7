//! Network training loop.

use nnscaffold_core::{RunDirectory, Settings, Timers, TrainingProgress};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tracing::Level;

use crate::data::{BatchLoader, Datasets, loader::batch_count};
use crate::error::MlError;
use crate::network::Network;
use crate::training::callbacks::{CallbackAction, callbacks_from_settings};
use crate::training::checkpoint::{CheckpointSchedule, NetworkFingerprint};
use crate::training::evaluate::evaluate_accuracy;
use crate::training::metrics::{AccuracyCheckpoint, TrainingMetrics};
use crate::training::reproducibility::{SHUFFLE_COMPONENT, SeedManager};

#[derive(Serialize)]
struct SavedNetworkResult<'a> {
    network_file: &'a PathBuf,
    network_sha256: &'a str,
}

/// Train `network` on the training dataset.
///
/// When `trained_network_cache_path` is set and loading from it succeeds, the
/// training is skipped. Checkpoints evaluate the accuracy on both datasets.
pub fn train(
    network: &mut dyn Network,
    datasets: &Datasets,
    settings: &Settings,
    seeds: &SeedManager,
    run_dir: &RunDirectory,
    timers: &Timers,
    metrics: &mut TrainingMetrics,
) -> Result<(), MlError> {
    if let Some(cache_path) = &settings.trained_network_cache_path {
        match network.load(cache_path) {
            Ok(()) => {
                tracing::info!(
                    "Network parameters loaded from cache ({}), training skipped",
                    cache_path.display()
                );
                metrics.loaded_from_cache = true;
                return Ok(());
            }
            Err(e) => tracing::warn!("Unable to load the network from cache, train it: {e}"),
        }
    }

    let started = Instant::now();
    let timer = timers.section("network training", Level::INFO);

    let train_dataset = datasets.train.as_ref();
    let nb_batches = batch_count(train_dataset.len(), settings.batch_size);
    if nb_batches == 0 {
        return Err(MlError::training("training dataset is empty"));
    }

    let schedule = CheckpointSchedule::new(settings.checkpoints_per_epoch, nb_batches);
    let mut callbacks = callbacks_from_settings(settings);
    let mut progress = TrainingProgress::new(
        "Training",
        settings.nb_epoch,
        nb_batches,
        settings.visual_progress_bar,
    );
    let mut shuffle_rng = seeds.rng_for(SHUFFLE_COMPONENT);
    let mut batch_num = 0;

    'epochs: for epoch in 1..=settings.nb_epoch {
        progress.start_epoch();
        tracing::info!(
            "Start epoch {epoch:03}/{} ({:05.2}%)",
            settings.nb_epoch,
            (epoch - 1) as f64 / settings.nb_epoch as f64 * 100.0
        );
        let epoch_timer = timers.section("epoch", Level::DEBUG);

        let loader = BatchLoader::shuffled(train_dataset, settings.batch_size, &mut shuffle_rng);
        let mut epoch_loss = 0.0;
        for (i, batch) in loader.iter().enumerate() {
            let batch = batch?;
            let loss = match network.training_step(&batch) {
                Ok(loss) => loss,
                Err(e) => {
                    progress.abandon();
                    return Err(e);
                }
            };
            metrics.record_batch(loss);
            epoch_loss += loss;
            batch_num += 1;
            progress.incr_batch();

            if schedule.is_due(i + 1) {
                let checkpoint = accuracy_checkpoint(
                    network, datasets, settings, timers, batch_num, epoch,
                )?;
                if metrics.record_checkpoint(checkpoint) {
                    tracing::debug!(
                        "New best checkpoint at batch {batch_num}: validation accuracy {:05.2}%",
                        checkpoint.validation_accuracy * 100.0
                    );
                }
            }
        }

        epoch_timer.stop();
        let average_loss = epoch_loss / nb_batches as f64;
        metrics.record_epoch(average_loss);
        tracing::info!("Epoch {epoch:03} average loss: {average_loss:.5}");

        for callback in callbacks.iter_mut() {
            match callback.on_epoch_end(epoch, metrics) {
                CallbackAction::Continue => {}
                CallbackAction::Stop(reason) => {
                    tracing::info!("Training stopped by {}: {reason}", callback.name());
                    metrics.stop_reason = Some(reason);
                    break 'epochs;
                }
                CallbackAction::Fail(reason) => {
                    progress.abandon();
                    metrics.stop_reason = Some(reason.clone());
                    return Err(MlError::training(reason));
                }
            }
        }
    }

    progress.finish();
    metrics.total_training_time_secs = started.elapsed().as_secs_f64();
    timer.stop();
    tracing::info!("Network training completed");

    if settings.save_network {
        let path = network.save(&run_dir.network_path())?;
        let fingerprint = NetworkFingerprint::compute(&path)?;
        tracing::info!(
            "Network saved in {} ({} bytes)",
            path.display(),
            fingerprint.size_bytes
        );
        run_dir.append_results(&SavedNetworkResult {
            network_file: &fingerprint.path,
            network_sha256: &fingerprint.sha256,
        })?;
    }

    Ok(())
}

fn accuracy_checkpoint(
    network: &dyn Network,
    datasets: &Datasets,
    settings: &Settings,
    timers: &Timers,
    batch_num: usize,
    epoch: usize,
) -> Result<AccuracyCheckpoint, MlError> {
    let _timer = timers.section("checkpoint", Level::DEBUG);
    let train_accuracy = evaluate_accuracy(network, datasets.train.as_ref(), settings.batch_size)?;
    let validation_accuracy =
        evaluate_accuracy(network, datasets.test.as_ref(), settings.batch_size)?;
    tracing::debug!(
        "Checkpoint at batch {batch_num}: train accuracy {:05.2}%, validation accuracy {:05.2}%",
        train_accuracy * 100.0,
        validation_accuracy * 100.0
    );
    Ok(AccuracyCheckpoint {
        batch_num,
        epoch,
        train_accuracy,
        validation_accuracy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Batch, MockClassificationDataset};
    use crate::network::NetworkInfo;
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::path::Path;
    use tempfile::TempDir;

    /// Replays a fixed loss sequence and counts what the loop asked of it.
    struct ScriptedNetwork {
        losses: Vec<f64>,
        steps: usize,
        loadable: bool,
    }

    impl ScriptedNetwork {
        fn new(losses: Vec<f64>) -> Self {
            Self {
                losses,
                steps: 0,
                loadable: false,
            }
        }
    }

    impl Network for ScriptedNetwork {
        fn training_step(&mut self, _batch: &Batch) -> Result<f64, MlError> {
            let loss = self.losses[self.steps.min(self.losses.len() - 1)];
            self.steps += 1;
            Ok(loss)
        }

        fn predict(&self, batch: &Batch) -> Result<Vec<usize>, MlError> {
            Ok(batch.labels.clone())
        }

        fn info(&self) -> NetworkInfo {
            NetworkInfo {
                name: "scripted".to_string(),
                input_size: 2,
                nb_classes: 2,
                parameter_count: 0,
                layers: Vec::new(),
                optimizer: "none".to_string(),
                learning_rate: 0.0,
            }
        }

        fn save(&self, path: &Path) -> Result<PathBuf, MlError> {
            let file = path.with_extension("bin");
            std::fs::write(&file, b"scripted")?;
            Ok(file)
        }

        fn load(&mut self, _path: &Path) -> Result<(), MlError> {
            if self.loadable {
                Ok(())
            } else {
                Err(MlError::network("no cache"))
            }
        }
    }

    struct Fixture {
        _dir: TempDir,
        settings: Settings,
        run_dir: RunDirectory,
        datasets: Datasets,
    }

    fn fixture(configure: impl FnOnce(&mut Settings)) -> Fixture {
        let dir = TempDir::new().unwrap();
        let mut settings = Settings {
            run_name: Some("train".to_string()),
            out_dir: dir.path().to_path_buf(),
            visual_progress_bar: false,
            batch_size: 4,
            nb_epoch: 3,
            ..Settings::default()
        };
        configure(&mut settings);
        let run_dir = RunDirectory::create(&settings).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let datasets = Datasets {
            train: Box::new(MockClassificationDataset::generate(2, 4, &mut rng).unwrap()),
            test: Box::new(MockClassificationDataset::generate(2, 2, &mut rng).unwrap()),
        };
        Fixture {
            _dir: dir,
            settings,
            run_dir,
            datasets,
        }
    }

    fn run_train(
        fx: &Fixture,
        network: &mut ScriptedNetwork,
    ) -> (Result<(), MlError>, TrainingMetrics) {
        let mut metrics = TrainingMetrics::default();
        let result = train(
            network,
            &fx.datasets,
            &fx.settings,
            &SeedManager::new(1),
            &fx.run_dir,
            &Timers::new(),
            &mut metrics,
        );
        (result, metrics)
    }

    #[test]
    fn test_every_epoch_and_batch_is_trained() {
        let fx = fixture(|_| {});
        let mut network = ScriptedNetwork::new(vec![1.0, 0.5]);
        let (result, metrics) = run_train(&fx, &mut network);

        result.unwrap();
        // 8 training items in batches of 4, over 3 epochs.
        assert_eq!(network.steps, 6);
        assert_eq!(metrics.batch_losses.len(), 6);
        assert_eq!(metrics.loss_history, vec![0.75, 0.5, 0.5]);
        assert_eq!(metrics.epochs_completed, 3);
        assert!(fx.run_dir.artifact_path("trained_network.bin").is_file());

        let results = fx.run_dir.load_results().unwrap();
        assert!(results.get("network_sha256").is_some());
    }

    #[test]
    fn test_checkpoints_are_recorded() {
        let fx = fixture(|s| s.checkpoints_per_epoch = 2);
        let mut network = ScriptedNetwork::new(vec![0.3]);
        let (result, metrics) = run_train(&fx, &mut network);

        result.unwrap();
        let batch_nums: Vec<usize> = metrics
            .accuracy_evolution
            .iter()
            .map(|c| c.batch_num)
            .collect();
        assert_eq!(batch_nums, vec![1, 2, 3, 4, 5, 6]);
        // The scripted network always predicts the right label.
        assert_eq!(metrics.best_checkpoint.unwrap().validation_accuracy, 1.0);
    }

    #[test]
    fn test_divergence_fails_training() {
        let fx = fixture(|_| {});
        let mut network = ScriptedNetwork::new(vec![f64::NAN]);
        let (result, metrics) = run_train(&fx, &mut network);

        assert!(matches!(result, Err(MlError::Training(_))));
        assert_eq!(metrics.epochs_completed, 1);
        assert!(!fx.run_dir.artifact_path("trained_network.bin").exists());
    }

    #[test]
    fn test_early_stopping_ends_training() {
        let fx = fixture(|s| {
            s.nb_epoch = 10;
            s.early_stopping_patience = Some(2);
        });
        let mut network = ScriptedNetwork::new(vec![0.4]);
        let (result, metrics) = run_train(&fx, &mut network);

        result.unwrap();
        assert_eq!(metrics.epochs_completed, 3);
        assert!(metrics.stop_reason.unwrap().contains("early stopping"));
    }

    #[test]
    fn test_cache_hit_skips_training() {
        let fx = fixture(|s| s.trained_network_cache_path = Some(PathBuf::from("cached")));
        let mut network = ScriptedNetwork::new(vec![0.1]);
        network.loadable = true;
        let (result, metrics) = run_train(&fx, &mut network);

        result.unwrap();
        assert_eq!(network.steps, 0);
        assert!(metrics.loaded_from_cache);
    }

    #[test]
    fn test_cache_miss_trains_normally() {
        let fx = fixture(|s| {
            s.trained_network_cache_path = Some(PathBuf::from("missing"));
            s.save_network = false;
        });
        let mut network = ScriptedNetwork::new(vec![0.1]);
        let (result, metrics) = run_train(&fx, &mut network);

        result.unwrap();
        assert_eq!(network.steps, 6);
        assert!(!metrics.loaded_from_cache);
        assert!(fx.run_dir.load_results().unwrap().is_empty());
    }
}
