// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses arguments with clap, hands off to Layer 2 and prints
// the result. Nothing here knows how a task trains.
//
//   attrec run --config settings.json --mode train
//   attrec run --config settings.json --mode test --device gpu:0
//   attrec components

pub mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use commands::{Commands, RunArgs};

use crate::application::{
    registry::Registry,
    task::{TaskMode, TaskReport},
};
use crate::domain::{device::Device, error::ComponentKind, settings::SettingsBundle};

#[derive(Parser, Debug)]
#[command(
    name = "attrec",
    version,
    about = "Train and evaluate instance attribute recognition models from a settings file."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let registry = Registry::with_defaults();
        match self.command {
            Commands::Run(args)  => run_task(&registry, args),
            Commands::Components => {
                list_components(&registry);
                Ok(())
            }
        }
    }
}

fn run_task(registry: &Registry, args: RunArgs) -> Result<()> {
    let mode: TaskMode = args.mode.parse()?;
    if let Some(device) = &args.device {
        // fail on a bad device string before any component is built
        device.parse::<Device>()?;
    }

    let mut settings = SettingsBundle::from_path(&args.config)?;
    for (key, value) in args.task_overrides() {
        settings.task.set_option(key, value);
    }

    tracing::info!("Loaded settings from '{}'", args.config.display());
    let mut task = registry.build_task(mode, settings)?;
    tracing::info!("Running '{}' in {} mode", task.name(), task.mode());
    let report = task.run().with_context(|| format!("Task '{}' failed", task.name()))?;

    if let TaskReport::Test(eval) = &report {
        if !eval.checkpoint.is_loaded() {
            tracing::warn!("No usable checkpoint; the test mAP below is for the initial weights");
        }
    }
    tracing::info!("'{}' finished: test mAP {:.4}", task.name(), report.test_map());

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn list_components(registry: &Registry) {
    for kind in ComponentKind::ALL {
        println!("{kind}:");
        for name in registry.names(kind) {
            println!("  {name}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args_parse() {
        let cli = Cli::try_parse_from([
            "attrec", "run", "--config", "s.json", "--mode", "test", "--device", "gpu:1", "--d-weight", "w",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else { panic!("expected run") };
        assert_eq!(args.mode, "test");
        let overrides = args.task_overrides();
        assert_eq!(overrides[0], ("device", serde_json::json!("gpu:1")));
        assert_eq!(overrides[1], ("d_weight", serde_json::json!("w")));
    }

    #[test]
    fn test_bad_mode_is_rejected() {
        let cli = Cli::try_parse_from(["attrec", "run", "--config", "missing.json", "--mode", "predict"]).unwrap();
        let err = cli.run().unwrap_err();
        assert!(err.to_string().contains("mode must be"));
    }
}
