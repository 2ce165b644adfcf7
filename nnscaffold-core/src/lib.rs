//! # nnscaffold core
//!
//! Ambient pieces shared by every training project built on the scaffold:
//! layered settings, run directories, logging, section timers, progress bars,
//! and atomic artifact persistence.

pub mod error;
pub mod logging;
pub mod output;
pub mod persistence;
pub mod progress;
pub mod settings;
pub mod timer;

// Re-export commonly used types at the crate root.
pub use error::{CoreError, OutputError, Result, SettingsError};
pub use logging::{RunLogFile, init_logging, run_log_layer};
pub use output::RunDirectory;
pub use progress::TrainingProgress;
pub use settings::{Settings, SettingsOverrides, load_settings};
pub use timer::{SectionTimer, Timers, duration_to_str};
