// ============================================================
// Layer 4 — Attribute Datasets
// ============================================================
// Two registered datasets:
//
//   InstanceAttributeDataset  — JSON-lines annotations, one
//       instance per line:
//         {"instance_id": "img7#2", "features": [...], "labels": [1, 0, -1]}
//       File per split: `{root}/{split}.jsonl`, or explicit paths
//       under `annotations.{train,val,test}` (relative to root).
//       Annotations may be partial, so it supplies MaskedCollate.
//
//   SyntheticAttributeDataset — seeded, linearly separable data
//       for smoke runs and demos. Uses the default batcher.
//
// Both keep samples in memory and apply their transform on
// every `get`, so augmentation differs from epoch to epoch.

use anyhow::{bail, Context, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::data::batcher::MaskedCollate;
use crate::domain::{
    sample::{AttributeSample, Split, UNKNOWN_LABEL},
    settings::ComponentSettings,
    traits::{AttributeDataset, Collate, Transform},
};

pub const INSTANCE_ATTRIBUTE_DATASET: &str = "InstanceAttributeDataset";
pub const SYNTHETIC_ATTRIBUTE_DATASET: &str = "SyntheticAttributeDataset";

// ─── InstanceAttributeDataset ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SplitFiles {
    pub train: Option<PathBuf>,
    pub val:   Option<PathBuf>,
    pub test:  Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstanceDatasetSettings {
    pub root: PathBuf,
    #[serde(default)]
    pub annotations: SplitFiles,
    /// Attribute names; when given every line must carry that many labels
    #[serde(default)]
    pub attributes: Vec<String>,
}

impl InstanceDatasetSettings {
    pub fn annotation_path(&self, split: Split) -> PathBuf {
        let explicit = match split {
            Split::Train => self.annotations.train.as_ref(),
            Split::Val   => self.annotations.val.as_ref(),
            Split::Test  => self.annotations.test.as_ref(),
        };
        match explicit {
            Some(p) => self.root.join(p),
            None    => self.root.join(format!("{split}.jsonl")),
        }
    }
}

pub struct InstanceAttributeDataset {
    split:     Split,
    samples:   Vec<AttributeSample>,
    transform: Arc<dyn Transform>,
}

impl InstanceAttributeDataset {
    pub fn load(
        split:     Split,
        transform: Arc<dyn Transform>,
        cfg:       &InstanceDatasetSettings,
    ) -> Result<Self> {
        let path    = cfg.annotation_path(split);
        let samples = read_annotations(&path, cfg.attributes.len())?;
        tracing::info!(
            "Loaded {} {} instances from '{}'",
            samples.len(),
            split,
            path.display()
        );
        Ok(Self { split, samples, transform })
    }
}

fn read_annotations(path: &Path, expected_attributes: usize) -> Result<Vec<AttributeSample>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Cannot read annotations from '{}'", path.display()))?;

    let mut samples: Vec<AttributeSample> = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let sample: AttributeSample = serde_json::from_str(line)
            .with_context(|| format!("{}:{}: malformed annotation", path.display(), lineno + 1))?;

        if let Some(first) = samples.first() {
            if first.features.len() != sample.features.len() {
                bail!(
                    "{}:{}: expected {} features, found {}",
                    path.display(), lineno + 1, first.features.len(), sample.features.len()
                );
            }
            if first.labels.len() != sample.labels.len() {
                bail!(
                    "{}:{}: expected {} labels, found {}",
                    path.display(), lineno + 1, first.labels.len(), sample.labels.len()
                );
            }
        }
        if expected_attributes > 0 && sample.labels.len() != expected_attributes {
            bail!(
                "{}:{}: {} attributes are configured but the line has {} labels",
                path.display(), lineno + 1, expected_attributes, sample.labels.len()
            );
        }
        if let Some(bad) = sample.labels.iter().find(|&&l| !(UNKNOWN_LABEL..=1).contains(&l)) {
            bail!("{}:{}: label {} is not one of -1, 0, 1", path.display(), lineno + 1, bad);
        }
        samples.push(sample);
    }
    Ok(samples)
}

impl AttributeDataset for InstanceAttributeDataset {
    fn split(&self) -> Split {
        self.split
    }

    fn len(&self) -> usize {
        self.samples.len()
    }

    fn get(&self, index: usize) -> Option<AttributeSample> {
        self.samples.get(index).cloned().map(|s| self.transform.apply(s))
    }

    fn collate_fn(&self) -> Option<Arc<dyn Collate>> {
        Some(Arc::new(MaskedCollate))
    }
}

/// Registry entry for `InstanceAttributeDataset`.
pub fn instance_attribute_dataset(
    split:     Split,
    transform: Arc<dyn Transform>,
    settings:  &ComponentSettings,
) -> Result<Arc<dyn AttributeDataset>> {
    let cfg: InstanceDatasetSettings = settings.parse()?;
    Ok(Arc::new(InstanceAttributeDataset::load(split, transform, &cfg)?))
}

// ─── SyntheticAttributeDataset ────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyntheticSettings {
    pub feature_dim:    usize,
    pub num_attributes: usize,
    pub train_size:     usize,
    pub val_size:       usize,
    pub test_size:      usize,
    pub seed:           u64,
}

impl Default for SyntheticSettings {
    fn default() -> Self {
        Self {
            feature_dim:    16,
            num_attributes: 4,
            train_size:     256,
            val_size:       64,
            test_size:      64,
            seed:           7,
        }
    }
}

pub struct SyntheticAttributeDataset {
    split:     Split,
    samples:   Vec<AttributeSample>,
    transform: Arc<dyn Transform>,
}

impl SyntheticAttributeDataset {
    /// Every split shares one random projection per attribute (so the
    /// task is learnable) but draws its own instances.
    pub fn generate(split: Split, transform: Arc<dyn Transform>, cfg: &SyntheticSettings) -> Self {
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let projections: Vec<Vec<f32>> = (0..cfg.num_attributes)
            .map(|_| (0..cfg.feature_dim).map(|_| rng.sample::<f32, _>(StandardNormal)).collect())
            .collect();

        let (offset, size) = match split {
            Split::Train => (1, cfg.train_size),
            Split::Val   => (2, cfg.val_size),
            Split::Test  => (3, cfg.test_size),
        };
        let mut rng = StdRng::seed_from_u64(cfg.seed.wrapping_add(offset));

        let samples = (0..size)
            .map(|i| {
                let features: Vec<f32> = (0..cfg.feature_dim)
                    .map(|_| rng.sample::<f32, _>(StandardNormal))
                    .collect();
                let labels = projections
                    .iter()
                    .map(|w| {
                        let score: f32 = w.iter().zip(&features).map(|(a, b)| a * b).sum();
                        i8::from(score > 0.0)
                    })
                    .collect();
                AttributeSample::new(format!("synthetic-{split}-{i}"), features, labels)
            })
            .collect();

        Self { split, samples, transform }
    }
}

impl AttributeDataset for SyntheticAttributeDataset {
    fn split(&self) -> Split {
        self.split
    }

    fn len(&self) -> usize {
        self.samples.len()
    }

    fn get(&self, index: usize) -> Option<AttributeSample> {
        self.samples.get(index).cloned().map(|s| self.transform.apply(s))
    }
}

/// Registry entry for `SyntheticAttributeDataset`.
pub fn synthetic_attribute_dataset(
    split:     Split,
    transform: Arc<dyn Transform>,
    settings:  &ComponentSettings,
) -> Result<Arc<dyn AttributeDataset>> {
    let cfg: SyntheticSettings = settings.parse()?;
    Ok(Arc::new(SyntheticAttributeDataset::generate(split, transform, &cfg)))
}
