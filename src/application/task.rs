// ============================================================
// Layer 2 — Task Contract
// ============================================================
// A task is prepared once for a mode and then run once:
//
//   prepare(mode, settings, registry) → run() → TaskReport
//
// The report is what the CLI prints; it serialises to JSON
// tagged by mode.

use anyhow::Result;
use serde::Serialize;
use std::{fmt, path::PathBuf, str::FromStr};

use crate::domain::{error::TaskError, state_dict::LoadReport};
use crate::infra::metrics::EpochMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskMode {
    Train,
    Test,
}

impl FromStr for TaskMode {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "train" => Ok(TaskMode::Train),
            "test"  => Ok(TaskMode::Test),
            other   => Err(TaskError::InvalidConfig(format!(
                "mode must be 'train' or 'test', got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for TaskMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskMode::Train => f.write_str("train"),
            TaskMode::Test  => f.write_str("test"),
        }
    }
}

pub trait Task {
    fn name(&self) -> &str;

    fn mode(&self) -> TaskMode;

    fn run(&mut self) -> Result<TaskReport>;
}

/// What a training run produced.
#[derive(Debug, Clone, Serialize)]
pub struct TrainReport {
    pub project:      String,
    pub epochs:       Vec<EpochMetrics>,
    /// Epoch of the checkpoint this run saved last, and its val mAP
    pub best_epoch:   usize,
    pub best_val_map: f64,
    /// mAP of the reloaded best checkpoint on the test split
    pub test_map:     f64,
    pub checkpoint:   PathBuf,
}

/// How the weights for an evaluation run were obtained.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CheckpointStatus {
    Loaded { path: PathBuf, report: LoadReport },
    /// The checkpoint could not be used; initial weights were evaluated.
    Fallback { path: PathBuf, reason: String },
}

impl CheckpointStatus {
    pub fn is_loaded(&self) -> bool {
        matches!(self, CheckpointStatus::Loaded { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EvalReport {
    pub project:    String,
    pub test_map:   f64,
    pub checkpoint: CheckpointStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum TaskReport {
    Train(TrainReport),
    Test(EvalReport),
}

impl TaskReport {
    pub fn test_map(&self) -> f64 {
        match self {
            TaskReport::Train(r) => r.test_map,
            TaskReport::Test(r)  => r.test_map,
        }
    }
}
