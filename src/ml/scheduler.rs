// ============================================================
// Layer 5 — Reduce-on-Plateau Scheduler
// ============================================================
// Watches one metric per epoch and cuts the learning rate when
// it stops improving:
//
//   better(a)  max: a > best · (1 + threshold)   (relative)
//              max: a > best + threshold         (absolute)
//              min mirrors both
//
//   not better for more than `patience` epochs (outside cooldown)
//       → lr = max(lr · factor, min_lr)
//
// Defaults: max mode, factor 0.1, patience 0, threshold 0,
// cooldown 0, min_lr 0, so every non-improving epoch cuts the rate.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::domain::{error::TaskError, optimizer::OptimizerHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlateauMode {
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdMode {
    Rel,
    Abs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlateauConfig {
    pub mode:           PlateauMode,
    pub factor:         f64,
    pub patience:       usize,
    pub threshold:      f64,
    pub threshold_mode: ThresholdMode,
    pub cooldown:       usize,
    pub min_lr:         f64,
    /// Reductions smaller than this are skipped.
    pub eps:            f64,
}

impl Default for PlateauConfig {
    fn default() -> Self {
        Self {
            mode:           PlateauMode::Max,
            factor:         0.1,
            patience:       0,
            threshold:      0.0,
            threshold_mode: ThresholdMode::Rel,
            cooldown:       0,
            min_lr:         0.0,
            eps:            1e-8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlateauScheduler {
    config:           PlateauConfig,
    best:             f64,
    num_bad_epochs:   usize,
    cooldown_counter: usize,
}

impl PlateauScheduler {
    pub fn new(config: PlateauConfig) -> Result<Self> {
        if !(config.factor > 0.0 && config.factor < 1.0) {
            return Err(TaskError::InvalidConfig(format!(
                "scheduler factor must be in (0, 1), got {}",
                config.factor
            ))
            .into());
        }
        if config.threshold < 0.0 || config.min_lr < 0.0 {
            return Err(TaskError::InvalidConfig("scheduler threshold and min_lr must be >= 0".into()).into());
        }
        let best = match config.mode {
            PlateauMode::Max => f64::NEG_INFINITY,
            PlateauMode::Min => f64::INFINITY,
        };
        Ok(Self { config, best, num_bad_epochs: 0, cooldown_counter: 0 })
    }

    pub fn config(&self) -> &PlateauConfig {
        &self.config
    }

    pub fn best(&self) -> f64 {
        self.best
    }

    fn is_better(&self, metric: f64) -> bool {
        let PlateauConfig { mode, threshold, threshold_mode, .. } = self.config;
        match (mode, threshold_mode) {
            (PlateauMode::Max, ThresholdMode::Rel) => metric > self.best * (1.0 + threshold),
            (PlateauMode::Max, ThresholdMode::Abs) => metric > self.best + threshold,
            (PlateauMode::Min, ThresholdMode::Rel) => metric < self.best * (1.0 - threshold),
            (PlateauMode::Min, ThresholdMode::Abs) => metric < self.best - threshold,
        }
    }

    /// Feed one epoch's metric. Returns true when the rate was reduced.
    pub fn step(&mut self, metric: f64, optimizer: &mut OptimizerHandle) -> bool {
        if self.is_better(metric) {
            self.best           = metric;
            self.num_bad_epochs = 0;
        } else {
            self.num_bad_epochs += 1;
        }

        if self.cooldown_counter > 0 {
            self.cooldown_counter -= 1;
            self.num_bad_epochs   = 0;
        }

        if self.num_bad_epochs <= self.config.patience {
            return false;
        }

        let old_lr = optimizer.learning_rate();
        let new_lr = (old_lr * self.config.factor).max(self.config.min_lr);
        self.cooldown_counter = self.config.cooldown;
        self.num_bad_epochs   = 0;
        if old_lr - new_lr > self.config.eps {
            optimizer.set_learning_rate(new_lr);
            tracing::info!("Plateau at {:.4}: learning rate {:.2e} → {:.2e}", metric, old_lr, new_lr);
            true
        } else {
            false
        }
    }
}
