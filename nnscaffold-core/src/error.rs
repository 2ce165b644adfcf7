//! Error types for the nnscaffold core library.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering settings, run-directory output, and logging.

use std::path::PathBuf;

/// Top-level error type for the nnscaffold core library.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("Logging error: {message}")]
    Logging { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from loading, merging, or overriding settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Settings file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("Failed to merge settings sources: {0}")]
    Merge(#[from] Box<figment::Error>),

    #[error("Unknown setting: {key}")]
    UnknownKey { key: String },

    #[error("Invalid value for setting '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Settings serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SettingsError {
    pub fn invalid(key: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors from run-directory management.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("Run directory already exists: {}", path.display())]
    RunDirectoryExists { path: PathBuf },

    #[error("Refusing to remove unexpected file from temporary run: {}", path.display())]
    UnexpectedFile { path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience type alias for nnscaffold core results.
pub type Result<T> = std::result::Result<T, CoreError>;
