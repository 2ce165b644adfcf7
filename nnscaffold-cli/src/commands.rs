use anyhow::{Context, bail};
use nnscaffold_core::{RunLogFile, Settings, init_logging, load_settings};
use nnscaffold_ml::{MockExperiment, PlanFile, PlannerSummary, RunStatus, start_planner, start_run};
use std::path::Path;

use crate::flags::SettingFlags;
use crate::{Commands, SettingsAction};

/// Handle a CLI subcommand.
pub fn handle_command(command: Commands, settings_file: Option<&Path>) -> anyhow::Result<()> {
    match command {
        Commands::Run { flags } => handle_run(settings_file, &flags),
        Commands::Plan { plan, flags } => handle_plan(&plan, settings_file, &flags),
        Commands::Settings { action } => handle_settings(action, settings_file),
    }
}

fn load(settings_file: Option<&Path>, flags: &SettingFlags) -> anyhow::Result<Settings> {
    let overrides = flags.to_overrides()?;
    load_settings(settings_file, Some(&overrides)).context("Failed to load settings")
}

fn start_logging(settings: &Settings) -> anyhow::Result<RunLogFile> {
    init_logging(settings.console_level()).context("Failed to initialize logging")
}

fn handle_run(settings_file: Option<&Path>, flags: &SettingFlags) -> anyhow::Result<()> {
    let settings = load(settings_file, flags)?;
    let log_file = start_logging(&settings)?;

    let report = start_run(&MockExperiment, &settings, &log_file).context("Run failed to start")?;
    match report.status {
        RunStatus::Completed => {
            println!(
                "Run '{}' completed: accuracy {:05.2}% ({})",
                report.name,
                report.accuracy.unwrap_or_default() * 100.0,
                report.directory.display()
            );
            Ok(())
        }
        _ => bail!(
            "Run '{}' failed: {}",
            report.name,
            report.error.unwrap_or_default()
        ),
    }
}

fn handle_plan(
    plan: &Path,
    settings_file: Option<&Path>,
    flags: &SettingFlags,
) -> anyhow::Result<()> {
    let settings = load(settings_file, flags)?;
    let plan_file = PlanFile::load(plan)
        .with_context(|| format!("Failed to load plan {}", plan.display()))?;
    let log_file = start_logging(&settings)?;

    let summary = start_planner(&MockExperiment, &plan_file, &settings, &log_file)
        .context("Runs planner failed")?;
    print_summary(&summary);

    let failed = summary.count(RunStatus::Failed);
    if failed > 0 {
        bail!("{failed} of {} runs failed", summary.planned_runs);
    }
    Ok(())
}

fn print_summary(summary: &PlannerSummary) {
    println!("Runs ({}):", summary.runs.len());
    for run in &summary.runs {
        let accuracy = run
            .accuracy
            .map(|a| format!("{:05.2}%", a * 100.0))
            .unwrap_or_else(|| "-".to_string());
        let status = format!("{:?}", run.status);
        println!("  {:<40} {status:<10} {accuracy}", run.name);
    }
    if let Some(best) = summary.best_run() {
        println!("Best run: {}", best.name);
    }
}

fn handle_settings(action: SettingsAction, settings_file: Option<&Path>) -> anyhow::Result<()> {
    match action {
        SettingsAction::Show { flags } => {
            let settings = load(settings_file, &flags)?;
            print!("{}", serde_yaml::to_string(&settings)?);
            Ok(())
        }
        SettingsAction::Init { path, force } => {
            if path.exists() && !force {
                println!("Settings file already exists at: {}", path.display());
                return Ok(());
            }
            let content = serde_yaml::to_string(&Settings::default())?;
            std::fs::write(&path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Created default settings at: {}", path.display());
            Ok(())
        }
    }
}
