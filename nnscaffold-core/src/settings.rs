//! Settings system for training runs.
//!
//! Uses `figment` for layered settings: defaults -> YAML file -> environment -> CLI flags.
//! The YAML file is either given explicitly or picked up from `./settings.yaml`.
//! Environment variables use the `NNSCAFFOLD_` prefix followed by the setting key
//! (`NNSCAFFOLD_NB_EPOCH=10`).

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;

use crate::error::SettingsError;

/// File looked up in the working directory when no settings file is given.
pub const DEFAULT_SETTINGS_FILE: &str = "settings.yaml";

/// Prefix of the environment variables overriding settings.
pub const ENV_PREFIX: &str = "NNSCAFFOLD_";

/// Reserved run name whose directory is wiped at the start of each run.
pub const TMP_RUN_NAME: &str = "tmp";

/// All settings of the program, read as an immutable snapshot during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Name of the run directory. A timestamped name is generated when unset.
    #[serde(deserialize_with = "text::optional_string")]
    pub run_name: Option<String>,
    /// Parent directory of every run directory.
    #[serde(deserialize_with = "text::path")]
    pub out_dir: PathBuf,
    /// Seed for dataset generation, shuffling, and parameter initialization.
    pub seed: Option<u64>,

    #[serde(deserialize_with = "text::string")]
    pub logger_console_level: String,
    pub logger_file_enable: bool,
    #[serde(deserialize_with = "text::string")]
    pub logger_file_level: String,
    pub visual_progress_bar: bool,

    /// Save the trained network parameters in the run directory.
    pub save_network: bool,
    /// Load network parameters from this file and skip the training if it succeeds.
    #[serde(deserialize_with = "text::optional_path")]
    pub trained_network_cache_path: Option<PathBuf>,

    pub nb_classes: usize,
    pub train_point_per_class: usize,
    pub test_point_per_class: usize,

    pub batch_size: usize,
    pub nb_epoch: usize,
    pub learning_rate: f64,
    pub momentum: f64,
    /// Number of evaluation checkpoints per epoch (0 disables them).
    pub checkpoints_per_epoch: usize,
    /// Stop training after this many epochs without loss improvement.
    pub early_stopping_patience: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            run_name: None,
            out_dir: PathBuf::from("out"),
            seed: None,
            logger_console_level: "info".to_string(),
            logger_file_enable: true,
            logger_file_level: "debug".to_string(),
            visual_progress_bar: true,
            save_network: true,
            trained_network_cache_path: None,
            nb_classes: 4,
            train_point_per_class: 200,
            test_point_per_class: 50,
            batch_size: 4,
            nb_epoch: 4,
            learning_rate: 0.001,
            momentum: 0.9,
            checkpoints_per_epoch: 0,
            early_stopping_patience: None,
        }
    }
}

impl Settings {
    /// Check every value. Called after each merge or override.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if let Some(name) = &self.run_name {
            validate_run_name(name)?;
        }
        parse_log_level(&self.logger_console_level)
            .map_err(|reason| SettingsError::invalid("logger_console_level", reason))?;
        parse_log_level(&self.logger_file_level)
            .map_err(|reason| SettingsError::invalid("logger_file_level", reason))?;

        if self.nb_classes == 0 {
            return Err(SettingsError::invalid(
                "nb_classes",
                "at least one class is required",
            ));
        }
        if self.train_point_per_class == 0 {
            return Err(SettingsError::invalid(
                "train_point_per_class",
                "at least one training point is required",
            ));
        }
        if self.test_point_per_class == 0 {
            return Err(SettingsError::invalid(
                "test_point_per_class",
                "at least one testing point is required",
            ));
        }
        if self.batch_size == 0 {
            return Err(SettingsError::invalid(
                "batch_size",
                "batch size should be a positive integer",
            ));
        }
        if self.nb_epoch == 0 {
            return Err(SettingsError::invalid(
                "nb_epoch",
                "number of epochs should be at least 1",
            ));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(SettingsError::invalid(
                "learning_rate",
                format!("must be a positive number, got {}", self.learning_rate),
            ));
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(SettingsError::invalid(
                "momentum",
                format!("must be in [0, 1), got {}", self.momentum),
            ));
        }
        if self.early_stopping_patience == Some(0) {
            return Err(SettingsError::invalid(
                "early_stopping_patience",
                "patience should be at least 1 epoch",
            ));
        }
        Ok(())
    }

    /// True when the user chose the run name.
    pub fn is_named_run(&self) -> bool {
        self.run_name.as_deref().is_some_and(|name| !name.is_empty())
    }

    /// The run name, or a timestamp-based one when unset.
    pub fn resolved_run_name(&self) -> String {
        match self.run_name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => chrono::Local::now()
                .format("run-%Y%m%d-%H%M%S-%3f")
                .to_string(),
        }
    }

    /// Console log level as a filter. Falls back to `info` on an invalid value.
    pub fn console_level(&self) -> LevelFilter {
        parse_log_level(&self.logger_console_level).unwrap_or(LevelFilter::INFO)
    }

    /// Run log file level as a filter. Falls back to `debug` on an invalid value.
    pub fn file_level(&self) -> LevelFilter {
        parse_log_level(&self.logger_file_level).unwrap_or(LevelFilter::DEBUG)
    }

    /// Return a new validated snapshot with one setting replaced.
    pub fn with_override(
        &self,
        key: &str,
        value: serde_json::Value,
    ) -> Result<Settings, SettingsError> {
        let mut fields = self.to_fields()?;
        if !fields.contains_key(key) {
            return Err(SettingsError::UnknownKey {
                key: key.to_string(),
            });
        }
        fields.insert(key.to_string(), value);

        let updated: Settings = serde_json::from_value(serde_json::Value::Object(fields))
            .map_err(|e| SettingsError::invalid(key, e.to_string()))?;
        updated.validate()?;
        Ok(updated)
    }

    /// Names of every setting key, in declaration-independent sorted order.
    pub fn keys() -> Vec<String> {
        Settings::default()
            .to_fields()
            .map(|fields| fields.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn to_fields(&self) -> Result<serde_json::Map<String, serde_json::Value>, SettingsError> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(fields) => Ok(fields),
            other => Err(SettingsError::invalid(
                "settings",
                format!("expected a mapping, got {other}"),
            )),
        }
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Settings:")?;
        let fields = self.to_fields().map_err(|_| fmt::Error)?;
        for (key, value) in fields {
            match value {
                serde_json::Value::String(s) => write!(f, "\n\t{key}: {s}")?,
                serde_json::Value::Null => write!(f, "\n\t{key}: -")?,
                other => write!(f, "\n\t{key}: {other}")?,
            }
        }
        Ok(())
    }
}

/// Explicit setting values, merged with the highest precedence.
///
/// Built from any serializable flag set: `null` values are dropped so that
/// absent flags do not shadow lower-precedence sources.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SettingsOverrides(serde_json::Map<String, serde_json::Value>);

impl SettingsOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_serializable<T: Serialize>(flags: &T) -> Result<Self, SettingsError> {
        match serde_json::to_value(flags)? {
            serde_json::Value::Object(fields) => Ok(Self(
                fields
                    .into_iter()
                    .filter(|(_, value)| !value.is_null())
                    .collect(),
            )),
            serde_json::Value::Null => Ok(Self::default()),
            other => Err(SettingsError::invalid(
                "overrides",
                format!("expected a mapping, got {other}"),
            )),
        }
    }

    pub fn set(&mut self, key: &str, value: serde_json::Value) -> &mut Self {
        self.0.insert(key.to_string(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Load settings from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (CLI flags)
/// 2. Environment variables (prefixed with `NNSCAFFOLD_`)
/// 3. YAML settings file (`settings_file`, or `./settings.yaml` when present)
/// 4. Built-in defaults
pub fn load_settings(
    settings_file: Option<&Path>,
    overrides: Option<&SettingsOverrides>,
) -> Result<Settings, SettingsError> {
    let mut figment = Figment::from(Serialized::defaults(Settings::default()));

    match settings_file {
        Some(path) if !path.exists() => {
            return Err(SettingsError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        Some(path) => figment = figment.merge(Yaml::file(path)),
        None => {
            let local = Path::new(DEFAULT_SETTINGS_FILE);
            if local.exists() {
                figment = figment.merge(Yaml::file(local));
            }
        }
    }

    figment = figment.merge(Env::prefixed(ENV_PREFIX));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let settings: Settings = figment.extract().map_err(|e| match &e.kind {
        figment::error::Kind::UnknownField(key, _) => {
            SettingsError::UnknownKey { key: key.clone() }
        }
        _ => SettingsError::from(Box::new(e)),
    })?;
    settings.validate()?;
    Ok(settings)
}

/// Parse a log level name, accepting the usual aliases (`warning`, `critical`).
pub fn parse_log_level(level: &str) -> Result<LevelFilter, String> {
    let normalized = level.trim().to_ascii_lowercase();
    let canonical = match normalized.as_str() {
        "warning" => "warn",
        "critical" | "fatal" => "error",
        "notset" => "trace",
        other => other,
    };
    canonical
        .parse::<LevelFilter>()
        .map_err(|_| format!("invalid log level '{level}'"))
}

/// Text settings that also accept bare scalars.
///
/// Environment values are parsed into typed values (`NNSCAFFOLD_RUN_NAME=42`
/// becomes an integer), so text settings take any scalar and keep its text.
mod text {
    use serde::Deserializer;
    use serde::de::{self, Visitor};
    use std::fmt;
    use std::path::PathBuf;

    struct TextVisitor;

    impl Visitor<'_> for TextVisitor {
        type Value = String;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a string or a scalar value")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_string<E: de::Error>(self, v: String) -> Result<String, E> {
            Ok(v)
        }

        fn visit_char<E: de::Error>(self, v: char) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_i128<E: de::Error>(self, v: i128) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_u128<E: de::Error>(self, v: u128) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_f32<E: de::Error>(self, v: f32) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<String, E> {
            Ok(v.to_string())
        }
    }

    struct OptionalTextVisitor;

    impl<'de> Visitor<'de> for OptionalTextVisitor {
        type Value = Option<String>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an optional string or scalar value")
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Self::Value, D::Error> {
            string(d).map(Some)
        }
    }

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        d.deserialize_string(TextVisitor)
    }

    pub fn optional_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        d.deserialize_option(OptionalTextVisitor)
    }

    pub fn path<'de, D: Deserializer<'de>>(d: D) -> Result<PathBuf, D::Error> {
        string(d).map(PathBuf::from)
    }

    pub fn optional_path<'de, D: Deserializer<'de>>(d: D) -> Result<Option<PathBuf>, D::Error> {
        optional_string(d).map(|text| text.map(PathBuf::from))
    }
}

fn validate_run_name(name: &str) -> Result<(), SettingsError> {
    if name.is_empty() {
        return Ok(());
    }
    if name == "." || name == ".." {
        return Err(SettingsError::invalid(
            "run_name",
            format!("'{name}' is not a valid directory name"),
        ));
    }
    if name.contains(['/', '\\']) || name.contains('\0') {
        return Err(SettingsError::invalid(
            "run_name",
            format!("'{name}' must not contain path separators"),
        ));
    }
    Ok(())
}
