//! Run output directory management.
//!
//! Every run owns `<out_dir>/<run_name>`, created at run start. The reserved
//! `tmp` name is recycled: its previous artifacts are removed first. Any other
//! existing directory is an error so that results are never overwritten.

use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::OutputError;
use crate::logging::RUN_LOG_FILE;
use crate::persistence::{atomic_write_json, atomic_write_yaml};
use crate::settings::{Settings, TMP_RUN_NAME};
use crate::timer::Timers;

pub const SETTINGS_FILE: &str = "settings.yaml";
pub const RESULTS_FILE: &str = "results.yaml";
pub const NETWORK_INFO_FILE: &str = "network_info.yaml";
pub const METRICS_FILE: &str = "metrics.json";
pub const TIMERS_FILE: &str = "timers.yaml";
pub const NETWORK_FILE_STEM: &str = "trained_network";
pub const NETWORK_FILE: &str = "trained_network.mpk";

/// Files the scaffold itself writes into a run directory.
const KNOWN_ARTIFACTS: [&str; 7] = [
    SETTINGS_FILE,
    RESULTS_FILE,
    NETWORK_INFO_FILE,
    METRICS_FILE,
    TIMERS_FILE,
    NETWORK_FILE,
    RUN_LOG_FILE,
];

/// The directory of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDirectory {
    name: String,
    path: PathBuf,
}

impl RunDirectory {
    /// Create the directory for a run described by `settings`.
    pub fn create(settings: &Settings) -> Result<Self, OutputError> {
        let name = settings.resolved_run_name();
        let path = settings.out_dir.join(&name);

        if name == TMP_RUN_NAME {
            tracing::warn!("Using temporary directory to save this run results.");
            if path.exists() {
                clear_temporary_run(&path)?;
                tracing::warn!("Previous temporary files removed: {}", path.display());
            }
        }

        if path.exists() {
            return Err(OutputError::RunDirectoryExists { path });
        }

        std::fs::create_dir_all(&path)?;
        tracing::info!("Output directory created: {}", path.display());

        Ok(Self { name, path })
    }

    /// Where a run with these settings would write, without creating anything.
    pub fn planned_path(settings: &Settings) -> PathBuf {
        settings.out_dir.join(settings.resolved_run_name())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn artifact_path(&self, file_name: &str) -> PathBuf {
        self.path.join(file_name)
    }

    /// Save the settings snapshot used by the run.
    pub fn save_settings(&self, settings: &Settings) -> Result<PathBuf, OutputError> {
        let path = self.artifact_path(SETTINGS_FILE);
        atomic_write_yaml(&path, settings)?;
        tracing::debug!("Settings saved in {}", path.display());
        Ok(path)
    }

    pub fn save_network_info<T: Serialize + ?Sized>(
        &self,
        info: &T,
    ) -> Result<PathBuf, OutputError> {
        let path = self.artifact_path(NETWORK_INFO_FILE);
        atomic_write_yaml(&path, info)?;
        tracing::debug!("Network info saved in {}", path.display());
        Ok(path)
    }

    /// Append entries to the results file, creating it if needed.
    ///
    /// `results` must serialize to a mapping; keys should be unique across
    /// appends to keep the file a single YAML mapping.
    pub fn append_results<T: Serialize + ?Sized>(&self, results: &T) -> Result<(), OutputError> {
        let path = self.artifact_path(RESULTS_FILE);
        let yaml = serde_yaml::to_string(results)?;
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(yaml.as_bytes())?;
        tracing::debug!("Result(s) saved in {}", path.display());
        Ok(())
    }

    /// Read back every result appended so far.
    pub fn load_results(&self) -> Result<serde_yaml::Mapping, OutputError> {
        let path = self.artifact_path(RESULTS_FILE);
        if !path.exists() {
            return Ok(serde_yaml::Mapping::new());
        }
        let content = std::fs::read_to_string(&path)?;
        if content.trim().is_empty() {
            return Ok(serde_yaml::Mapping::new());
        }
        Ok(serde_yaml::from_str(&content)?)
    }

    pub fn save_metrics<T: Serialize + ?Sized>(&self, metrics: &T) -> Result<PathBuf, OutputError> {
        let path = self.artifact_path(METRICS_FILE);
        atomic_write_json(&path, metrics)?;
        tracing::debug!("Metrics saved in {}", path.display());
        Ok(path)
    }

    pub fn save_timers(&self, timers: &Timers) -> Result<PathBuf, OutputError> {
        let path = self.artifact_path(TIMERS_FILE);
        atomic_write_yaml(&path, &timers.snapshot())?;
        tracing::debug!("Timers saved in {}", path.display());
        Ok(path)
    }

    /// Path (without extension) under which the trained network is recorded.
    pub fn network_path(&self) -> PathBuf {
        self.artifact_path(NETWORK_FILE_STEM)
    }
}

/// Remove the artifacts of a previous `tmp` run, then the directory itself.
///
/// Files the scaffold did not write are left alone and reported as an error.
fn clear_temporary_run(path: &Path) -> Result<(), OutputError> {
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        let file_path = entry.path();
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        let is_leftover_tmp = file_path.extension().is_some_and(|ext| ext == "tmp");

        if entry.file_type()?.is_file()
            && (KNOWN_ARTIFACTS.contains(&file_name.as_ref()) || is_leftover_tmp)
        {
            std::fs::remove_file(&file_path)?;
        } else {
            return Err(OutputError::UnexpectedFile { path: file_path });
        }
    }
    std::fs::remove_dir(path)?;
    Ok(())
}
