// ============================================================
// Layer 4 — Batchers
// ============================================================
// Turns a Vec<AttributeSample> into one AttributeBatch.
//
// Two collation strategies exist:
//
//   StackBatcher  — the loader's default. Stacks rows, every
//                   label slot is supervised (unknown → 0).
//   MaskedCollate — supplied by datasets that carry partial
//                   annotations. Unknown labels get mask 0 so
//                   they count neither in the loss nor in AP.
//
// Rows are padded with zeros to the widest sample in the batch;
// padded label slots always get mask 0.
//
// LoaderBatcher adapts whichever strategy was chosen to Burn's
// Batcher trait so Burn's DataLoader can drive it.

use burn::data::dataloader::batcher::Batcher;
use std::sync::Arc;

use crate::domain::{
    sample::{AttributeBatch, AttributeSample},
    traits::Collate,
};

/// Which collation a loader ended up with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollateSource {
    Dataset,
    Default,
}

fn stack(items: Vec<AttributeSample>, supervise_unknown: bool) -> AttributeBatch {
    let feature_dim    = items.iter().map(|s| s.features.len()).max().unwrap_or(0);
    let num_attributes = items.iter().map(|s| s.labels.len()).max().unwrap_or(0);

    let mut batch = AttributeBatch {
        instance_ids:   Vec::with_capacity(items.len()),
        features:       Vec::with_capacity(items.len() * feature_dim),
        feature_dim,
        targets:        Vec::with_capacity(items.len() * num_attributes),
        mask:           Vec::with_capacity(items.len() * num_attributes),
        num_attributes,
    };

    for sample in items {
        let pad = feature_dim - sample.features.len();
        batch.features.extend_from_slice(&sample.features);
        batch.features.extend(std::iter::repeat(0.0).take(pad));

        for slot in 0..num_attributes {
            let (target, mask) = match sample.labels.get(slot) {
                Some(&l) if l > 0  => (1.0, 1.0),
                Some(&l) if l == 0 => (0.0, 1.0),
                Some(_)            => (0.0, if supervise_unknown { 1.0 } else { 0.0 }),
                None               => (0.0, 0.0),
            };
            batch.targets.push(target);
            batch.mask.push(mask);
        }
        batch.instance_ids.push(sample.instance_id);
    }
    batch
}

/// Default collation used when a dataset supplies none.
#[derive(Debug, Clone, Copy, Default)]
pub struct StackBatcher;

impl Collate for StackBatcher {
    fn collate(&self, items: Vec<AttributeSample>) -> AttributeBatch {
        stack(items, true)
    }
}

/// Collation that leaves unannotated attributes unsupervised.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaskedCollate;

impl Collate for MaskedCollate {
    fn collate(&self, items: Vec<AttributeSample>) -> AttributeBatch {
        stack(items, false)
    }
}

/// Burn-facing batcher wrapping the chosen collation.
#[derive(Clone)]
pub struct LoaderBatcher {
    collate: Arc<dyn Collate>,
    source:  CollateSource,
}

impl LoaderBatcher {
    /// Use the dataset's collation when there is one, otherwise the default.
    pub fn new(collate: Option<Arc<dyn Collate>>) -> Self {
        match collate {
            Some(collate) => Self { collate, source: CollateSource::Dataset },
            None          => Self { collate: Arc::new(StackBatcher), source: CollateSource::Default },
        }
    }

    pub fn source(&self) -> CollateSource {
        self.source
    }
}

impl Batcher<AttributeSample, AttributeBatch> for LoaderBatcher {
    fn batch(&self, items: Vec<AttributeSample>) -> AttributeBatch {
        self.collate.collate(items)
    }
}
