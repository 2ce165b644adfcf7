//! Run driver: prepare the run directory, train, test, and clean up.

use nnscaffold_core::{RunDirectory, RunLogFile, Settings, Timers};
use serde::Serialize;
use std::time::Instant;
use tracing::Level;

use crate::error::MlError;
use crate::experiment::Experiment;
use crate::training::evaluate::test_network;
use crate::training::metrics::{AccuracyCheckpoint, TrainingMetrics};
use crate::training::reproducibility::SeedManager;
use crate::training::report::{RunReport, RunStatus};
use crate::training::train::train;

#[derive(Serialize)]
struct SuccessResult {
    success_run: bool,
}

#[derive(Serialize)]
struct FailureResult {
    success_run: bool,
    error: String,
}

#[derive(Serialize)]
struct BestCheckpointResult {
    best_checkpoint: AccuracyCheckpoint,
}

#[derive(Serialize)]
struct SeedResult {
    seed: u64,
}

/// Start a run with the given settings snapshot.
///
/// Errors while preparing the run (e.g. the directory already exists) are
/// returned. Errors while training or testing are logged, recorded in
/// `results.yaml` with `success_run: false` and reported as
/// [`RunStatus::Failed`]. Timers and metrics are saved and the run log is
/// closed in every case.
pub fn start_run(
    experiment: &dyn Experiment,
    settings: &Settings,
    log_file: &RunLogFile,
) -> Result<RunReport, MlError> {
    let started = Instant::now();
    let run_dir = RunDirectory::create(settings)?;

    let prepared = prepare(settings, &run_dir, log_file);
    let seeds = match prepared {
        Ok(seeds) => seeds,
        Err(e) => {
            close_log(log_file);
            return Err(e);
        }
    };

    let timers = Timers::new();
    let mut metrics = TrainingMetrics::default();
    let outcome = execute(experiment, settings, &seeds, &run_dir, &timers, &mut metrics);

    let report = match outcome {
        Ok(accuracy) => RunReport {
            name: run_dir.name().to_string(),
            directory: run_dir.path().to_path_buf(),
            status: RunStatus::Completed,
            accuracy: Some(accuracy),
            duration_secs: started.elapsed().as_secs_f64(),
            error: None,
        },
        Err(e) => {
            let message = e.chain();
            tracing::error!("Run '{}' failed: {message}", run_dir.name());
            let failure = FailureResult {
                success_run: false,
                error: message.clone(),
            };
            if let Err(save_error) = run_dir.append_results(&failure) {
                tracing::error!("Unable to save the failure in the results: {save_error}");
            }
            RunReport {
                name: run_dir.name().to_string(),
                directory: run_dir.path().to_path_buf(),
                status: RunStatus::Failed,
                accuracy: None,
                duration_secs: started.elapsed().as_secs_f64(),
                error: Some(message),
            }
        }
    };

    clean_up(&run_dir, &timers, &metrics, log_file);
    Ok(report)
}

/// Open the run log, save the settings snapshot, and derive the seeds.
fn prepare(
    settings: &Settings,
    run_dir: &RunDirectory,
    log_file: &RunLogFile,
) -> Result<SeedManager, MlError> {
    if let Err(e) = log_file.set_console_level(settings.console_level()) {
        tracing::warn!("Unable to apply the console log level: {e}");
    }
    if settings.logger_file_enable {
        let path = log_file.open(run_dir.path(), settings.file_level())?;
        tracing::debug!("Run log file: {}", path.display());
    }
    tracing::info!("Run '{}' started", run_dir.name());
    tracing::debug!("{settings}");
    run_dir.save_settings(settings)?;

    let seeds = SeedManager::from_setting(settings.seed);
    if seeds.user_defined {
        tracing::debug!("Seed: {}", seeds.global_seed);
    } else {
        tracing::debug!("No seed set, using random seed {}", seeds.global_seed);
    }
    run_dir.append_results(&SeedResult {
        seed: seeds.global_seed,
    })?;
    Ok(seeds)
}

fn execute(
    experiment: &dyn Experiment,
    settings: &Settings,
    seeds: &SeedManager,
    run_dir: &RunDirectory,
    timers: &Timers,
    metrics: &mut TrainingMetrics,
) -> Result<f64, MlError> {
    let _run_timer = timers.section("run", Level::INFO);

    let datasets = {
        let _timer = timers.section("datasets loading", Level::DEBUG);
        experiment.load_datasets(settings, seeds)?
    };
    tracing::info!(
        "Datasets loaded ({}): {} training items, {} testing items, {} classes",
        experiment.name(),
        datasets.train.len(),
        datasets.test.len(),
        datasets.train.nb_classes()
    );

    let mut network = experiment.build_network(
        settings,
        seeds,
        datasets.train.feature_size(),
        datasets.train.nb_classes(),
    )?;
    let info = network.info();
    run_dir.save_network_info(&info)?;
    tracing::info!(
        "Network ready: {} ({} parameters)",
        info.name,
        info.parameter_count
    );

    train(
        network.as_mut(),
        &datasets,
        settings,
        seeds,
        run_dir,
        timers,
        metrics,
    )?;

    if let Some(best_checkpoint) = metrics.best_checkpoint {
        run_dir.append_results(&BestCheckpointResult { best_checkpoint })?;
    }

    let outcome = test_network(
        network.as_ref(),
        datasets.test.as_ref(),
        settings,
        run_dir,
        timers,
        metrics,
        true,
    )?;

    run_dir.append_results(&SuccessResult { success_run: true })?;
    Ok(outcome.accuracy)
}

/// Save what the run measured and release the run log, whatever happened.
fn clean_up(
    run_dir: &RunDirectory,
    timers: &Timers,
    metrics: &TrainingMetrics,
    log_file: &RunLogFile,
) {
    if let Err(e) = run_dir.save_metrics(metrics) {
        tracing::warn!("Unable to save the metrics: {e}");
    }
    if let Err(e) = run_dir.save_timers(timers) {
        tracing::warn!("Unable to save the timers: {e}");
    }
    tracing::info!("Run '{}' ended", run_dir.name());
    close_log(log_file);
}

fn close_log(log_file: &RunLogFile) {
    if let Err(e) = log_file.close() {
        tracing::warn!("Unable to close the run log: {e}");
    }
}
