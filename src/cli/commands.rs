// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Two subcommands:
//
//   run         — prepare a task from a settings file and run it
//   components  — list the registered component names
//
// `--device` and `--d-weight` override the matching keys of the
// settings file's `task` section.

use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train or evaluate a task described by a settings file
    Run(RunArgs),

    /// List every registered task, model, pipeline, dataset, evaluation and train utility
    Components,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// JSON settings bundle (task, model, pipeline, dataset, eval, train)
    #[arg(long)]
    pub config: PathBuf,

    /// `train` or `test`
    #[arg(long, default_value = "train")]
    pub mode: String,

    /// Compute device, e.g. `cpu` or `gpu:0`
    #[arg(long)]
    pub device: Option<String>,

    /// Directory holding the best checkpoint
    #[arg(long)]
    pub d_weight: Option<PathBuf>,
}

impl RunArgs {
    /// Task-section keys the command line overrides.
    pub fn task_overrides(&self) -> Vec<(&'static str, serde_json::Value)> {
        let mut overrides = Vec::new();
        if let Some(device) = &self.device {
            overrides.push(("device", serde_json::Value::from(device.as_str())));
        }
        if let Some(dir) = &self.d_weight {
            overrides.push(("d_weight", serde_json::Value::from(dir.to_string_lossy().into_owned())));
        }
        overrides
    }
}
