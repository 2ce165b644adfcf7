//! Runs planners.
//!
//! A planner enumerates settings snapshots and the run driver executes one run
//! per snapshot, sequentially. Planners compose: [`Planner::Sequence`] chains
//! sub-planners, [`Planner::Parallel`] advances them in lock-step and
//! [`Planner::Combinator`] takes their cartesian product.
//!
//! ```yaml
//! skip_existing: true
//! planner:
//!   type: combinator
//!   planners:
//!     - type: values
//!       setting: batch_size
//!       values: [4, 16]
//!     - type: values
//!       setting: learning_rate
//!       values: [0.01, 0.001]
//! ```

use nnscaffold_core::{RunDirectory, RunLogFile, Settings, SettingsOverrides, Timers};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::Level;

use crate::error::{MlError, PlannerError};
use crate::experiment::Experiment;
use crate::run::start_run;
use crate::training::report::{PLANNER_SUMMARY_FILE, PlannerSummary, RunReport, RunStatus};

/// A description of the settings to iterate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Planner {
    /// One setting takes each value in turn.
    Values {
        setting: String,
        values: Vec<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        runs_basename: Option<String>,
    },
    /// Sub-planners one after the other. Overrides never leak between them.
    Sequence {
        planners: Vec<Planner>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        runs_basename: Option<String>,
    },
    /// Sub-planners of equal length, applied together.
    Parallel {
        planners: Vec<Planner>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        runs_basename: Option<String>,
    },
    /// Every combination of the sub-planners; the first one varies fastest.
    Combinator {
        planners: Vec<Planner>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        runs_basename: Option<String>,
    },
}

/// One step of a planner: a run name and the overrides to apply, in order.
#[derive(Debug, Clone, PartialEq)]
struct PlanStep {
    name: String,
    overrides: Vec<(String, serde_json::Value)>,
}

/// A validated run of a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedRun {
    pub name: String,
    pub overrides: SettingsOverrides,
    pub settings: Settings,
}

impl Planner {
    pub fn values(setting: &str, values: Vec<serde_json::Value>) -> Self {
        Self::Values {
            setting: setting.to_string(),
            values,
            runs_basename: None,
        }
    }

    pub fn sequence(planners: Vec<Planner>) -> Self {
        Self::Sequence {
            planners,
            runs_basename: None,
        }
    }

    pub fn parallel(planners: Vec<Planner>) -> Self {
        Self::Parallel {
            planners,
            runs_basename: None,
        }
    }

    pub fn combinator(planners: Vec<Planner>) -> Self {
        Self::Combinator {
            planners,
            runs_basename: None,
        }
    }

    /// Name runs `<basename>-001`, `<basename>-002`, ... instead of describing the settings.
    pub fn with_basename(mut self, basename: &str) -> Self {
        let name = Some(basename.to_string());
        match &mut self {
            Self::Values { runs_basename, .. }
            | Self::Sequence { runs_basename, .. }
            | Self::Parallel { runs_basename, .. }
            | Self::Combinator { runs_basename, .. } => *runs_basename = name,
        }
        self
    }

    fn runs_basename(&self) -> Option<&str> {
        match self {
            Self::Values { runs_basename, .. }
            | Self::Sequence { runs_basename, .. }
            | Self::Parallel { runs_basename, .. }
            | Self::Combinator { runs_basename, .. } => {
                runs_basename.as_deref().filter(|b| !b.is_empty())
            }
        }
    }

    /// Number of runs the planner produces.
    pub fn len(&self) -> usize {
        match self {
            Self::Values { values, .. } => values.len(),
            Self::Sequence { planners, .. } => planners.iter().map(Planner::len).sum(),
            Self::Parallel { planners, .. } => planners.first().map_or(0, Planner::len),
            Self::Combinator { planners, .. } if planners.is_empty() => 0,
            Self::Combinator { planners, .. } => planners.iter().map(Planner::len).product(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn steps(&self) -> Result<Vec<PlanStep>, PlannerError> {
        let steps = match self {
            Self::Values {
                setting, values, ..
            } => {
                if values.is_empty() {
                    return Err(PlannerError::EmptyValues {
                        setting: setting.clone(),
                    });
                }
                values
                    .iter()
                    .map(|value| PlanStep {
                        name: format!("{setting}-{}", format_value(value)),
                        overrides: vec![(setting.clone(), value.clone())],
                    })
                    .collect()
            }
            Self::Sequence { planners, .. } => {
                let mut steps = Vec::new();
                for planner in non_empty(planners, "sequence")? {
                    steps.extend(planner.steps()?);
                }
                steps
            }
            Self::Parallel { planners, .. } => {
                let sub_steps = non_empty(planners, "parallel")?
                    .iter()
                    .map(Planner::steps)
                    .collect::<Result<Vec<_>, _>>()?;
                let expected = sub_steps[0].len();
                if let Some(found) = sub_steps.iter().map(Vec::len).find(|&l| l != expected) {
                    return Err(PlannerError::LengthMismatch { expected, found });
                }
                (0..expected)
                    .map(|i| merge_steps(sub_steps.iter().map(|steps| &steps[i])))
                    .collect()
            }
            Self::Combinator { planners, .. } => {
                let sub_steps = non_empty(planners, "combinator")?
                    .iter()
                    .map(Planner::steps)
                    .collect::<Result<Vec<_>, _>>()?;
                let total: usize = sub_steps.iter().map(Vec::len).product();
                (0..total)
                    .map(|k| {
                        let mut stride = 1;
                        merge_steps(sub_steps.iter().map(|steps| {
                            let step = &steps[(k / stride) % steps.len()];
                            stride *= steps.len();
                            step
                        }))
                    })
                    .collect()
            }
        };

        Ok(match self.runs_basename() {
            Some(basename) => rename_with_basename(steps, basename),
            None => steps,
        })
    }

    /// Every run of the plan, applied on top of `base` and validated.
    ///
    /// Fails before anything runs when a value is invalid or two runs would
    /// share a name (and therefore a directory).
    pub fn plan(&self, base: &Settings) -> Result<Vec<PlannedRun>, PlannerError> {
        let mut names = HashSet::new();
        let mut runs = Vec::new();

        for step in self.steps()? {
            if !names.insert(step.name.clone()) {
                return Err(PlannerError::DuplicateRunName { name: step.name });
            }

            let invalid = |source| PlannerError::InvalidRun {
                run: step.name.clone(),
                source,
            };
            let mut settings = base.clone();
            let mut overrides = SettingsOverrides::new();
            for (key, value) in &step.overrides {
                settings = settings.with_override(key, value.clone()).map_err(invalid)?;
                overrides.set(key, value.clone());
            }
            settings = settings
                .with_override("run_name", serde_json::Value::String(step.name.clone()))
                .map_err(invalid)?;

            runs.push(PlannedRun {
                name: step.name,
                overrides,
                settings,
            });
        }

        Ok(runs)
    }
}

fn non_empty<'a>(
    planners: &'a [Planner],
    kind: &'static str,
) -> Result<&'a [Planner], PlannerError> {
    if planners.is_empty() {
        Err(PlannerError::EmptyPlanners { kind })
    } else {
        Ok(planners)
    }
}

fn merge_steps<'a>(steps: impl Iterator<Item = &'a PlanStep>) -> PlanStep {
    let mut names = Vec::new();
    let mut overrides = Vec::new();
    for step in steps {
        names.push(step.name.as_str());
        overrides.extend(step.overrides.iter().cloned());
    }
    PlanStep {
        name: names.join("_"),
        overrides,
    }
}

fn rename_with_basename(steps: Vec<PlanStep>, basename: &str) -> Vec<PlanStep> {
    steps
        .into_iter()
        .enumerate()
        .map(|(i, step)| PlanStep {
            name: format!("{basename}-{:03}", i + 1),
            ..step
        })
        .collect()
}

fn format_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "none".to_string(),
        other => other.to_string(),
    }
}

/// A plan file: the planner and how to treat runs that already exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanFile {
    pub planner: Planner,
    /// Skip runs whose directory already exists instead of failing them.
    #[serde(default)]
    pub skip_existing: bool,
}

impl PlanFile {
    pub fn new(planner: Planner) -> Self {
        Self {
            planner,
            skip_existing: false,
        }
    }

    pub fn load(path: &Path) -> Result<Self, PlannerError> {
        if !path.is_file() {
            return Err(PlannerError::PlanFileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|source| PlannerError::InvalidPlanFile {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Execute every run of the plan, one after the other.
///
/// The progress bar is disabled. A failing run is logged and recorded, then
/// the next one starts. The summary is rewritten after each run in
/// `<out_dir>/planner-summary.json`.
pub fn start_planner(
    experiment: &dyn Experiment,
    plan: &PlanFile,
    base: &Settings,
    log_file: &RunLogFile,
) -> Result<PlannerSummary, MlError> {
    let mut base = base.clone();
    base.visual_progress_bar = false;

    let runs = plan.planner.plan(&base)?;
    let nb_runs = runs.len();
    let summary_path = base.out_dir.join(PLANNER_SUMMARY_FILE);
    let mut summary = PlannerSummary::new(nb_runs);

    let timers = Timers::new();
    let _timer = timers.section("runs planner", Level::INFO);
    tracing::info!("Runs planner: {nb_runs} runs planned");

    for (i, run) in runs.iter().enumerate() {
        tracing::info!("Planner run {}/{nb_runs}: {}", i + 1, run.name);
        let directory = RunDirectory::planned_path(&run.settings);

        let report = if plan.skip_existing && directory.exists() {
            tracing::warn!("Run '{}' already exists, skipped", run.name);
            RunReport::skipped(&run.name, &directory)
        } else {
            match start_run(experiment, &run.settings, log_file) {
                Ok(report) => report,
                Err(e) => {
                    tracing::error!("Run '{}' could not start: {}", run.name, e.chain());
                    RunReport::failed(&run.name, &directory, &e)
                }
            }
        };
        summary.add(report);
        summary.save(&summary_path)?;
    }

    tracing::info!(
        "Runs planner completed: {} completed, {} failed, {} skipped",
        summary.count(RunStatus::Completed),
        summary.count(RunStatus::Failed),
        summary.count(RunStatus::Skipped)
    );
    if let Some(best) = summary.best_run() {
        tracing::info!(
            "Best run: {} ({:05.2}%)",
            best.name,
            best.accuracy.unwrap_or_default() * 100.0
        );
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    fn names(planner: &Planner) -> Vec<String> {
        planner
            .plan(&Settings::default())
            .unwrap()
            .into_iter()
            .map(|run| run.name)
            .collect()
    }

    #[test]
    fn test_values_planner() {
        let planner = Planner::values("nb_epoch", vec![json!(1), json!(5)]);
        let runs = planner.plan(&Settings::default()).unwrap();

        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].name, "nb_epoch-1");
        assert_eq!(runs[0].settings.nb_epoch, 1);
        assert_eq!(runs[0].settings.run_name.as_deref(), Some("nb_epoch-1"));
        assert_eq!(runs[1].settings.nb_epoch, 5);
        // Other settings keep the base values.
        assert_eq!(runs[1].settings.batch_size, Settings::default().batch_size);
    }

    #[test]
    fn test_values_planner_with_basename() {
        let planner =
            Planner::values("learning_rate", vec![json!(0.1), json!(0.01)]).with_basename("lr");
        assert_eq!(names(&planner), vec!["lr-001", "lr-002"]);
    }

    #[test]
    fn test_string_values_are_not_quoted() {
        let planner = Planner::values("logger_file_level", vec![json!("info")]);
        assert_eq!(names(&planner), vec!["logger_file_level-info"]);
    }

    #[test]
    fn test_sequence_does_not_leak_overrides() {
        let planner = Planner::sequence(vec![
            Planner::values("nb_epoch", vec![json!(2)]),
            Planner::values("batch_size", vec![json!(8), json!(16)]),
        ]);
        let runs = planner.plan(&Settings::default()).unwrap();

        assert_eq!(planner.len(), 3);
        let run_names: Vec<&str> = runs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(run_names, vec!["nb_epoch-2", "batch_size-8", "batch_size-16"]);
        assert_eq!(runs[1].settings.nb_epoch, Settings::default().nb_epoch);
        assert_eq!(runs[0].settings.batch_size, Settings::default().batch_size);
    }

    #[test]
    fn test_parallel_planner() {
        let planner = Planner::parallel(vec![
            Planner::values("batch_size", vec![json!(4), json!(8)]),
            Planner::values("nb_epoch", vec![json!(1), json!(2)]),
        ]);
        let runs = planner.plan(&Settings::default()).unwrap();

        assert_eq!(runs[0].name, "batch_size-4_nb_epoch-1");
        assert_eq!(runs[1].name, "batch_size-8_nb_epoch-2");
        assert_eq!(runs[1].settings.batch_size, 8);
        assert_eq!(runs[1].settings.nb_epoch, 2);
    }

    #[test]
    fn test_parallel_length_mismatch() {
        let planner = Planner::parallel(vec![
            Planner::values("batch_size", vec![json!(4), json!(8)]),
            Planner::values("nb_epoch", vec![json!(1)]),
        ]);
        let err = planner.plan(&Settings::default()).unwrap_err();
        assert!(matches!(
            err,
            PlannerError::LengthMismatch {
                expected: 2,
                found: 1
            }
        ));
    }

    #[test]
    fn test_combinator_first_planner_varies_fastest() {
        let planner = Planner::combinator(vec![
            Planner::values("batch_size", vec![json!(4), json!(8)]),
            Planner::values("nb_epoch", vec![json!(1), json!(2), json!(3)]),
        ]);
        assert_eq!(planner.len(), 6);
        assert_eq!(
            names(&planner),
            vec![
                "batch_size-4_nb_epoch-1",
                "batch_size-8_nb_epoch-1",
                "batch_size-4_nb_epoch-2",
                "batch_size-8_nb_epoch-2",
                "batch_size-4_nb_epoch-3",
                "batch_size-8_nb_epoch-3",
            ]
        );
    }

    #[test]
    fn test_nested_planners_with_basename() {
        let planner = Planner::combinator(vec![
            Planner::values("batch_size", vec![json!(4), json!(8)]).with_basename("bs"),
            Planner::values("nb_epoch", vec![json!(1), json!(2)]),
        ]);
        assert_eq!(
            names(&planner),
            vec![
                "bs-001_nb_epoch-1",
                "bs-002_nb_epoch-1",
                "bs-001_nb_epoch-2",
                "bs-002_nb_epoch-2",
            ]
        );
    }

    #[test]
    fn test_empty_planners_are_errors() {
        let err = Planner::sequence(Vec::new()).plan(&Settings::default()).unwrap_err();
        assert!(matches!(err, PlannerError::EmptyPlanners { kind: "sequence" }));

        let err = Planner::values("nb_epoch", Vec::new())
            .plan(&Settings::default())
            .unwrap_err();
        assert!(matches!(err, PlannerError::EmptyValues { .. }));
    }

    #[test]
    fn test_invalid_values_rejected_before_running() {
        let unknown = Planner::values("nb_layers", vec![json!(3)]);
        assert!(matches!(
            unknown.plan(&Settings::default()).unwrap_err(),
            PlannerError::InvalidRun { .. }
        ));

        let ill_typed = Planner::values("batch_size", vec![json!("large")]);
        assert!(matches!(
            ill_typed.plan(&Settings::default()).unwrap_err(),
            PlannerError::InvalidRun { .. }
        ));

        let invalid = Planner::values("batch_size", vec![json!(16), json!(0)]);
        let err = invalid.plan(&Settings::default()).unwrap_err();
        assert!(err.to_string().contains("batch_size-0"));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let planner = Planner::sequence(vec![
            Planner::values("nb_epoch", vec![json!(2)]),
            Planner::values("nb_epoch", vec![json!(2)]),
        ]);
        assert!(matches!(
            planner.plan(&Settings::default()).unwrap_err(),
            PlannerError::DuplicateRunName { .. }
        ));
    }

    #[test]
    fn test_plan_file_yaml() {
        let yaml = r#"
skip_existing: true
planner:
  type: combinator
  runs_basename: grid
  planners:
    - type: values
      setting: batch_size
      values: [4, 16]
    - type: values
      setting: learning_rate
      values: [0.01, 0.001]
"#;
        let plan: PlanFile = serde_yaml::from_str(yaml).unwrap();
        assert!(plan.skip_existing);
        assert_eq!(plan.planner.len(), 4);
        assert_eq!(names(&plan.planner)[3], "grid-004");

        let runs = plan.planner.plan(&Settings::default()).unwrap();
        assert_eq!(runs[3].settings.batch_size, 16);
        assert_eq!(runs[3].settings.learning_rate, 0.001);
    }

    #[test]
    fn test_plan_file_load_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("plan.yaml");
        assert!(matches!(
            PlanFile::load(&missing).unwrap_err(),
            PlannerError::PlanFileNotFound { .. }
        ));

        std::fs::write(&missing, "planner: [not, a, planner]").unwrap();
        assert!(matches!(
            PlanFile::load(&missing).unwrap_err(),
            PlannerError::InvalidPlanFile { .. }
        ));
    }

    fn values_planner() -> impl Strategy<Value = Planner> {
        (1usize..5).prop_map(|n| {
            Planner::values("nb_epoch", (1..=n).map(|v| json!(v)).collect())
        })
    }

    proptest! {
        #[test]
        fn test_combinator_length_is_product(lens in prop::collection::vec(1usize..4, 1..4)) {
            let settings = ["nb_epoch", "batch_size", "train_point_per_class"];
            let planners = lens
                .iter()
                .zip(settings)
                .map(|(&n, setting)| Planner::values(setting, (1..=n).map(|v| json!(v)).collect()))
                .collect();
            let planner = Planner::combinator(planners);
            let runs = planner.plan(&Settings::default()).unwrap();
            prop_assert_eq!(runs.len(), lens.iter().product::<usize>());
            prop_assert_eq!(runs.len(), planner.len());
        }

        #[test]
        fn test_sequence_length_is_sum(planners in prop::collection::vec(values_planner(), 1..4)) {
            let expected: usize = planners.iter().map(Planner::len).sum();
            let planner = Planner::sequence(planners).with_basename("seq");
            let runs = planner.plan(&Settings::default()).unwrap();
            prop_assert_eq!(runs.len(), expected);
            prop_assert_eq!(
                runs.last().map(|r| r.name.clone()),
                Some(format!("seq-{expected:03}"))
            );
        }
    }
}
