// ============================================================
// Layer 5 — Train Step
// ============================================================
// One epoch of optimisation over the train loader:
//
//   for batch in loader:
//       loss = model.train_step(batch, lr)
//       every `log_interval` batches → running-loss line
//
// The learning rate comes from the optimizer handle, which the
// task's plateau scheduler adjusts between epochs.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::sync::Arc;

use crate::domain::{
    error::TaskError,
    settings::ComponentSettings,
    traits::{EpochContext, EpochStats, TrainStep},
};

pub const ATTRIBUTE_TRAIN_EPOCH: &str = "AttributeTrainEpoch";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrainEpochSettings {
    pub log_interval: usize,
}

impl Default for TrainEpochSettings {
    fn default() -> Self {
        Self { log_interval: 20 }
    }
}

pub struct AttributeTrainEpoch {
    log_interval: usize,
}

impl AttributeTrainEpoch {
    pub fn new(log_interval: usize) -> Self {
        Self { log_interval: log_interval.max(1) }
    }
}

impl TrainStep for AttributeTrainEpoch {
    fn run_epoch(&self, ctx: EpochContext<'_>) -> Result<EpochStats> {
        let lr = ctx.optimizer.learning_rate();
        tracing::debug!(
            "Epoch {}/{} on {} (lr={:.2e}, {} samples)",
            ctx.epoch + 1, ctx.total_epochs, ctx.device, lr, ctx.loader.num_items()
        );

        let mut loss_sum = 0.0f64;
        let mut batches  = 0usize;

        for batch in ctx.loader.batches() {
            let loss = ctx
                .model
                .train_step(&batch, ctx.optimizer, ctx.amp)
                .with_context(|| format!("Train step failed at epoch {} batch {}", ctx.epoch, batches))?;
            loss_sum += loss as f64;
            batches  += 1;

            if batches % self.log_interval == 0 {
                tracing::info!(
                    "Epoch {:>3} | batch {:>5} | loss {:.4}",
                    ctx.epoch + 1, batches, loss_sum / batches as f64
                );
            }
        }

        let mean_loss = if batches > 0 { loss_sum / batches as f64 } else { f64::NAN };
        Ok(EpochStats { mean_loss, batches })
    }
}

/// Registry entry for `AttributeTrainEpoch`.
pub fn attribute_train_epoch(settings: &ComponentSettings) -> Result<Arc<dyn TrainStep>> {
    let cfg: TrainEpochSettings = settings.parse()?;
    if cfg.log_interval == 0 {
        return Err(TaskError::InvalidConfig("log_interval must be positive".into()).into());
    }
    Ok(Arc::new(AttributeTrainEpoch::new(cfg.log_interval)))
}
