//! nnscaffold CLI: train and test a network, or sweep run configurations.

mod commands;
mod flags;

use clap::Parser;
use std::path::PathBuf;

use crate::flags::SettingFlags;

/// Neural-network training scaffold
#[derive(Parser, Debug)]
#[command(name = "nnscaffold", version, about, long_about = None)]
struct Cli {
    /// Settings file (defaults to ./settings.yaml when present)
    #[arg(short, long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Train then test the network in a new run directory
    Run {
        #[command(flatten)]
        flags: SettingFlags,
    },
    /// Execute every run of a plan file
    Plan {
        /// Plan file (YAML)
        plan: PathBuf,

        #[command(flatten)]
        flags: SettingFlags,
    },
    /// Inspect or create settings files
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum SettingsAction {
    /// Print the merged settings
    Show {
        #[command(flatten)]
        flags: SettingFlags,
    },
    /// Write a settings file holding the default values
    Init {
        /// Destination
        #[arg(long, default_value = "settings.yaml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    commands::handle_command(cli.command, cli.settings.as_deref())
}
