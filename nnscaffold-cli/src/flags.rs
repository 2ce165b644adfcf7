//! Command-line flags overriding settings.

use clap::Args;
use nnscaffold_core::SettingsOverrides;
use serde::Serialize;
use std::path::PathBuf;

/// One optional flag per setting. Only the flags given on the command line
/// override the settings file and the environment.
#[derive(Args, Debug, Clone, Default, Serialize)]
pub struct SettingFlags {
    /// Name of the run directory ("tmp" is recycled on every run)
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_name: Option<String>,

    /// Parent directory of the run directories
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_dir: Option<PathBuf>,

    /// Seed for datasets, shuffling and initialization (random when unset)
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Console log level: trace, debug, info, warning, error
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger_console_level: Option<String>,

    /// Write run.log in the run directory
    #[arg(long, value_name = "BOOL")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger_file_enable: Option<bool>,

    /// run.log level: trace, debug, info, warning, error
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger_file_level: Option<String>,

    /// Show the training progress bar
    #[arg(long, value_name = "BOOL")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visual_progress_bar: Option<bool>,

    /// Save the trained parameters in the run directory
    #[arg(long, value_name = "BOOL")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_network: Option<bool>,

    /// Load trained parameters from this file instead of training
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trained_network_cache_path: Option<PathBuf>,

    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nb_classes: Option<usize>,

    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub train_point_per_class: Option<usize>,

    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_point_per_class: Option<usize>,

    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,

    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nb_epoch: Option<usize>,

    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learning_rate: Option<f64>,

    /// SGD momentum, in [0, 1)
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub momentum: Option<f64>,

    /// Evaluation checkpoints per epoch (0 disables them)
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoints_per_epoch: Option<usize>,

    /// Stop after this many epochs without loss improvement
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub early_stopping_patience: Option<usize>,
}

impl SettingFlags {
    pub fn to_overrides(&self) -> anyhow::Result<SettingsOverrides> {
        Ok(SettingsOverrides::from_serializable(self)?)
    }
}
