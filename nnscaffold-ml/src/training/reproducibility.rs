//! Seed management.
//!
//! Every random component of a run draws from its own generator, derived from
//! the global seed and the component name. Changing the number of draws in one
//! component (e.g. a different dataset size) does not shift the others.

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const TRAIN_DATASET_COMPONENT: &str = "train_dataset";
pub const TEST_DATASET_COMPONENT: &str = "test_dataset";
pub const SHUFFLE_COMPONENT: &str = "shuffle";
pub const NETWORK_COMPONENT: &str = "network";

/// Seed manager for reproducible runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedManager {
    pub global_seed: u64,
    /// False when no seed was configured and one was drawn at random.
    pub user_defined: bool,
}

impl SeedManager {
    pub fn new(global_seed: u64) -> Self {
        Self {
            global_seed,
            user_defined: true,
        }
    }

    /// Use the configured seed, or draw one so the run can still be replayed.
    pub fn from_setting(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::new(seed),
            None => Self {
                global_seed: rand::random(),
                user_defined: false,
            },
        }
    }

    pub fn seed_for(&self, component: &str) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(self.global_seed.to_le_bytes());
        hasher.update(b"/");
        hasher.update(component.as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(bytes)
    }

    pub fn rng_for(&self, component: &str) -> StdRng {
        StdRng::seed_from_u64(self.seed_for(component))
    }
}
