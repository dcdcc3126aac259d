// ============================================================
// Layer 3 — Core Traits (Collaborator Abstractions)
// ============================================================
// The orchestrator builds its collaborators by name and then
// only ever talks to them through these traits:
//
//   Transform        ← pipelines (data::pipeline)
//   Collate          ← batchers (data::batcher)
//   AttributeDataset ← datasets (data::dataset)
//   BatchSource      ← loaders (data::loader)
//   AttributeModel   ← models (ml::model)
//   Evaluation       ← evaluators (ml::evaluation)
//   TrainStep        ← train utilities (ml::trainer)
//
// Tests swap any of them for in-memory stand-ins.

use anyhow::Result;
use std::sync::Arc;

use crate::domain::{
    device::Device,
    optimizer::OptimizerHandle,
    sample::{AttributeBatch, AttributeSample, Split},
    state_dict::{LoadReport, StateDict},
};

// ─── Transform ────────────────────────────────────────────────────────────────
/// A per-sample transform; pipelines compose several of them.
pub trait Transform: Send + Sync {
    fn apply(&self, sample: AttributeSample) -> AttributeSample;
}

// ─── Collate ──────────────────────────────────────────────────────────────────
/// Merges individual samples into one batch.
pub trait Collate: Send + Sync {
    fn collate(&self, items: Vec<AttributeSample>) -> AttributeBatch;
}

// ─── AttributeDataset ─────────────────────────────────────────────────────────
/// Random-access samples for one split, transform already applied.
pub trait AttributeDataset: Send + Sync {
    fn split(&self) -> Split;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, index: usize) -> Option<AttributeSample>;

    /// Dataset-specific collation. `None` means the loader's default
    /// batcher is good enough for this dataset.
    fn collate_fn(&self) -> Option<Arc<dyn Collate>> {
        None
    }
}

// ─── BatchSource ──────────────────────────────────────────────────────────────
/// A restartable, finite sequence of batches.
pub trait BatchSource {
    fn batches(&self) -> Box<dyn Iterator<Item = AttributeBatch> + '_>;

    /// Number of samples one pass yields.
    fn num_items(&self) -> usize;
}

// ─── AttributeModel ───────────────────────────────────────────────────────────
/// A trainable multi-label classifier.
pub trait AttributeModel: Send {
    fn num_attributes(&self) -> usize;

    /// Fresh optimizer for a training run. Resets any optimizer state
    /// the model accumulated before.
    fn optimizer(&mut self) -> OptimizerHandle;

    /// One forward/backward/update on `batch`; returns the batch loss.
    fn train_step(&mut self, batch: &AttributeBatch, optimizer: &OptimizerHandle, amp: bool) -> Result<f32>;

    /// Attribute probabilities, row-major `[batch.len(), num_attributes]`.
    fn predict(&self, batch: &AttributeBatch) -> Result<Vec<f32>>;

    fn state_dict(&self) -> Result<StateDict>;

    /// Replace parameters from `state`. Non-strict loading tolerates
    /// missing and unexpected keys and reports them.
    fn load_state_dict(&mut self, state: StateDict, strict: bool) -> Result<LoadReport>;

    fn to_device(&mut self, device: &Device) -> Result<()>;
}

// ─── Evaluation ───────────────────────────────────────────────────────────────
/// Scores a model over a full loader pass.
pub trait Evaluation: Send {
    /// Run one pass. Clears whatever the previous call accumulated.
    fn evaluate(&mut self, model: &dyn AttributeModel, loader: &dyn BatchSource) -> Result<()>;

    /// Mean Average Precision of the last pass.
    fn map(&self) -> f64;
}

// ─── TrainStep ────────────────────────────────────────────────────────────────
/// Everything one training epoch needs.
pub struct EpochContext<'a> {
    pub model:        &'a mut dyn AttributeModel,
    pub loader:       &'a dyn BatchSource,
    pub optimizer:    &'a OptimizerHandle,
    pub epoch:        usize,
    pub total_epochs: usize,
    pub device:       &'a Device,
    pub amp:          bool,
}

/// What an epoch reports back.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EpochStats {
    pub mean_loss: f64,
    pub batches:   usize,
}

/// Runs one epoch of optimisation.
pub trait TrainStep: Send + Sync {
    fn run_epoch(&self, ctx: EpochContext<'_>) -> Result<EpochStats>;
}
