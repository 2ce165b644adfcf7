//! Evaluation checkpoints and saved-network fingerprints.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::error::MlError;

/// Positions, within an epoch, at which the accuracy is evaluated.
///
/// With `per_epoch` checkpoints over `batches_per_epoch` batches, checkpoint
/// `j` falls after batch `ceil(j * batches / per_epoch)`, so the last one
/// always closes the epoch. More checkpoints than batches means one per batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointSchedule {
    positions: Vec<usize>,
}

impl CheckpointSchedule {
    pub fn new(per_epoch: usize, batches_per_epoch: usize) -> Self {
        let count = per_epoch.min(batches_per_epoch);
        let positions = (1..=count)
            .map(|j| (j * batches_per_epoch).div_ceil(count))
            .collect();
        Self { positions }
    }

    /// Whether a checkpoint follows the 1-based batch `batch_in_epoch`.
    pub fn is_due(&self, batch_in_epoch: usize) -> bool {
        self.positions.binary_search(&batch_in_epoch).is_ok()
    }

    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Identity of a saved network file, appended to the results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkFingerprint {
    pub path: PathBuf,
    pub sha256: String,
    pub size_bytes: u64,
}

impl NetworkFingerprint {
    pub fn compute(path: &Path) -> Result<Self, MlError> {
        let content = std::fs::read(path)?;
        let mut hasher = Sha256::new();
        hasher.update(&content);
        Ok(Self {
            path: path.to_path_buf(),
            sha256: format!("{:x}", hasher.finalize()),
            size_bytes: content.len() as u64,
        })
    }
}
