// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// One CSV row per training epoch, next to the checkpoint:
//
//   {d_weight}/{project}-metrics.csv
//
//   epoch,train_loss,val_map,learning_rate,improved
//   0,0.693100,0.512300,1.000000e-3,true
//   1,0.584200,0.498700,1.000000e-3,false
//
// `learning_rate` is the rate the epoch trained with; a plateau
// cut shows up on the following row. The file is appended to,
// so several runs of one project stack their rows.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

const HEADER: &str = "epoch,train_loss,val_map,learning_rate,improved";

/// One row of the metrics CSV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch:         usize,
    pub train_loss:    f64,
    pub val_map:       f64,
    pub learning_rate: f64,
    /// Whether this epoch beat every earlier validation mAP
    pub improved:      bool,
}

pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the header if the file doesn't exist yet.
    pub fn new(dir: impl AsRef<Path>, project: &str) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create metrics directory '{}'", dir.display()))?;

        let csv_path = dir.join(format!("{project}-metrics.csv"));
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "{HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }
        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;
        writeln!(
            f,
            "{},{:.6},{:.6},{:.6e},{}",
            m.epoch, m.train_loss, m.val_map, m.learning_rate, m.improved,
        )?;
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}
