// ============================================================
// Layer 4 — Attribute Loader
// ============================================================
// Wraps Burn's DataLoader for one split.
//
// Each loader gets its own immutable LoaderConfig:
//   split       — which dataset split it serves
//   batch_size  — shared across splits by the task
//   options     — per-split knobs from the dataset settings
//                 (`trainloader` / `valloader` / `testloader`)
//
// The loader iterates lazily and can be restarted any number
// of times; every call to `batches()` is a fresh pass.

use anyhow::Result;
use burn::data::{
    dataloader::{DataLoader, DataLoaderBuilder},
    dataset::Dataset,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::data::batcher::{CollateSource, LoaderBatcher};
use crate::domain::{
    error::TaskError,
    sample::{AttributeBatch, AttributeSample, Split},
    traits::{AttributeDataset, BatchSource, Collate},
};

/// Per-split loader options as written in the dataset settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderOptions {
    /// Reshuffle sample order (seeded) before batching
    pub shuffle: bool,
    /// Background batching threads; 0 batches on the caller's thread
    pub num_workers: usize,
    /// Seed for the shuffle
    pub seed: u64,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self { shuffle: false, num_workers: 0, seed: 42 }
    }
}

/// Everything needed to build one loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderConfig {
    pub split:      Split,
    pub batch_size: usize,
    pub options:    LoaderOptions,
}

/// Adapts a trait-object dataset to Burn's Dataset trait.
struct DatasetSource {
    inner: Arc<dyn AttributeDataset>,
}

impl Dataset<AttributeSample> for DatasetSource {
    fn get(&self, index: usize) -> Option<AttributeSample> {
        self.inner.get(index)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

pub struct AttributeLoader {
    config: LoaderConfig,
    source: CollateSource,
    inner:  Arc<dyn DataLoader<AttributeBatch>>,
}

impl AttributeLoader {
    /// Build a loader over `dataset`, collating with `collate` when given
    /// and with the default batcher otherwise.
    pub fn build(
        config:  LoaderConfig,
        dataset: Arc<dyn AttributeDataset>,
        collate: Option<Arc<dyn Collate>>,
    ) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(TaskError::InvalidConfig(format!(
                "batch_size for the {} loader must be positive",
                config.split
            ))
            .into());
        }

        let batcher = LoaderBatcher::new(collate);
        let source  = batcher.source();

        let mut builder = DataLoaderBuilder::new(batcher).batch_size(config.batch_size);
        if config.options.shuffle {
            builder = builder.shuffle(config.options.seed);
        }
        if config.options.num_workers > 0 {
            builder = builder.num_workers(config.options.num_workers);
        }
        let inner = builder.build(DatasetSource { inner: dataset });

        tracing::debug!(
            "Built {} loader: batch_size={}, shuffle={}, workers={}, collate={:?}",
            config.split,
            config.batch_size,
            config.options.shuffle,
            config.options.num_workers,
            source,
        );

        Ok(Self { config, source, inner })
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn split(&self) -> Split {
        self.config.split
    }

    pub fn collate_source(&self) -> CollateSource {
        self.source
    }
}

impl BatchSource for AttributeLoader {
    fn batches(&self) -> Box<dyn Iterator<Item = AttributeBatch> + '_> {
        Box::new(self.inner.iter())
    }

    fn num_items(&self) -> usize {
        self.inner.num_items()
    }
}
