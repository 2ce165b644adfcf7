//! File persistence helpers for run artifacts.
//!
//! Every artifact is written to a `.tmp` sibling first and then renamed, so a
//! run interrupted mid-write never leaves a truncated settings or metrics file.

use serde::{Serialize, de::DeserializeOwned};
use std::io;
use std::path::Path;

use crate::error::OutputError;

/// Atomically write raw bytes, creating parent directories as needed.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Atomically write a value as pretty-printed JSON.
pub fn atomic_write_json<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<(), OutputError> {
    let json = serde_json::to_string_pretty(data)?;
    atomic_write(path, json.as_bytes())?;
    Ok(())
}

/// Atomically write a value as YAML.
pub fn atomic_write_yaml<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<(), OutputError> {
    let yaml = serde_yaml::to_string(data)?;
    atomic_write(path, yaml.as_bytes())?;
    Ok(())
}

/// Load a JSON file. Returns `Ok(None)` when the file does not exist.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, OutputError> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&data)?))
}

/// Load a YAML file. Returns `Ok(None)` when the file does not exist.
pub fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, OutputError> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path)?;
    Ok(Some(serde_yaml::from_str(&data)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct EpochSummary {
        epoch: usize,
        loss: f64,
    }

    #[test]
    fn test_json_write_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metrics.json");
        let data = EpochSummary {
            epoch: 3,
            loss: 0.25,
        };

        atomic_write_json(&path, &data).unwrap();
        let loaded: Option<EpochSummary> = load_json(&path).unwrap();
        assert_eq!(loaded, Some(data));
    }

    #[test]
    fn test_yaml_write_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("runs").join("baseline").join("timers.yaml");

        atomic_write_yaml(&path, &EpochSummary { epoch: 1, loss: 1.0 }).unwrap();
        let loaded: Option<EpochSummary> = load_yaml(&path).unwrap();
        assert_eq!(loaded.unwrap().epoch, 1);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let loaded: Option<EpochSummary> = load_json(&dir.path().join("missing.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_atomic_write_no_tmp_leftover() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.yaml");

        atomic_write(&path, b"accuracy: 0.9\n").unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());
    }
}
