// ============================================================
// Layer 4 — Transform Pipelines
// ============================================================
// Per-sample feature transforms, composed into two pipelines:
//
//   evalu:  Normalize
//   train:  Normalize → GaussianNoise → FeatureDropout
//
// Normalisation statistics are scalar or per-dimension. The
// two augmentation steps are random and only ever run on the
// training split; evaluation stays deterministic.
//
// Settings keys (all optional):
//   mean, std         — number or list of numbers
//   noise_std         — stddev of additive noise (0 disables)
//   feature_dropout   — probability of zeroing a feature (0 disables)

use anyhow::{anyhow, Result};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

use crate::domain::{
    error::TaskError,
    sample::AttributeSample,
    settings::ComponentSettings,
    traits::Transform,
};

pub const ATTRIBUTE_PIPELINE: &str = "AttributePipeline";

/// Which pipeline variant to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineMode {
    Train,
    Evalu,
}

impl fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineMode::Train => f.write_str("train"),
            PipelineMode::Evalu => f.write_str("evalu"),
        }
    }
}

/// A number or a per-dimension list in the settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Stat {
    Scalar(f32),
    PerDim(Vec<f32>),
}

impl Stat {
    fn at(&self, i: usize) -> f32 {
        match self {
            Stat::Scalar(v) => *v,
            // shorter lists repeat their last entry
            Stat::PerDim(v) => v.get(i).or(v.last()).copied().unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub mean:            Stat,
    pub std:             Stat,
    pub noise_std:       f32,
    pub feature_dropout: f32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            mean:            Stat::Scalar(0.0),
            std:             Stat::Scalar(1.0),
            noise_std:       0.0,
            feature_dropout: 0.0,
        }
    }
}

// ─── Transforms ───────────────────────────────────────────────────────────────

/// (x - mean) / std per feature.
pub struct Normalize {
    mean: Stat,
    std:  Stat,
}

impl Transform for Normalize {
    fn apply(&self, mut sample: AttributeSample) -> AttributeSample {
        for (i, x) in sample.features.iter_mut().enumerate() {
            let std = self.std.at(i);
            *x = (*x - self.mean.at(i)) / if std == 0.0 { 1.0 } else { std };
        }
        sample
    }
}

pub struct GaussianNoise {
    dist: Normal<f32>,
}

impl GaussianNoise {
    pub fn new(std: f32) -> Result<Self> {
        let dist = Normal::new(0.0, std).map_err(|e| anyhow!("noise_std {std}: {e}"))?;
        Ok(Self { dist })
    }
}

impl Transform for GaussianNoise {
    fn apply(&self, mut sample: AttributeSample) -> AttributeSample {
        let mut rng = rand::thread_rng();
        for x in sample.features.iter_mut() {
            *x += self.dist.sample(&mut rng);
        }
        sample
    }
}

/// Zeroes each feature with probability `p`.
pub struct FeatureDropout {
    p: f64,
}

impl Transform for FeatureDropout {
    fn apply(&self, mut sample: AttributeSample) -> AttributeSample {
        let mut rng = rand::thread_rng();
        for x in sample.features.iter_mut() {
            if rng.gen_bool(self.p) {
                *x = 0.0;
            }
        }
        sample
    }
}

/// Applies its transforms in order.
pub struct Compose {
    steps: Vec<Box<dyn Transform>>,
}

impl Compose {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Transform for Compose {
    fn apply(&self, sample: AttributeSample) -> AttributeSample {
        self.steps.iter().fold(sample, |s, step| step.apply(s))
    }
}

/// Build the train or evalu pipeline from settings.
pub fn build_pipeline(mode: PipelineMode, cfg: &PipelineSettings) -> Result<Compose> {
    let mut steps: Vec<Box<dyn Transform>> = vec![Box::new(Normalize {
        mean: cfg.mean.clone(),
        std:  cfg.std.clone(),
    })];

    if mode == PipelineMode::Train {
        if cfg.noise_std < 0.0 {
            return Err(TaskError::InvalidConfig(format!("noise_std must be >= 0, got {}", cfg.noise_std)).into());
        }
        if !(0.0..1.0).contains(&cfg.feature_dropout) {
            return Err(TaskError::InvalidConfig(format!(
                "feature_dropout must be in [0, 1), got {}",
                cfg.feature_dropout
            ))
            .into());
        }
        if cfg.noise_std > 0.0 {
            steps.push(Box::new(GaussianNoise::new(cfg.noise_std)?));
        }
        if cfg.feature_dropout > 0.0 {
            steps.push(Box::new(FeatureDropout { p: cfg.feature_dropout as f64 }));
        }
    }

    tracing::debug!("Built {} pipeline with {} steps", mode, steps.len());
    Ok(Compose { steps })
}

/// Registry entry for `AttributePipeline`.
pub fn attribute_pipeline(mode: PipelineMode, settings: &ComponentSettings) -> Result<Arc<dyn Transform>> {
    let cfg: PipelineSettings = settings.parse()?;
    Ok(Arc::new(build_pipeline(mode, &cfg)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AttributeSample {
        AttributeSample::new("x", vec![2.0, 4.0, 6.0], vec![1])
    }

    #[test]
    fn test_evalu_only_normalizes() {
        let cfg = PipelineSettings {
            mean:            Stat::PerDim(vec![1.0, 2.0, 3.0]),
            std:             Stat::Scalar(2.0),
            noise_std:       5.0,
            feature_dropout: 0.5,
        };
        let pipeline = build_pipeline(PipelineMode::Evalu, &cfg).unwrap();
        assert_eq!(pipeline.len(), 1);
        let out = pipeline.apply(sample());
        assert_eq!(out.features, vec![0.5, 1.0, 1.5]);
        assert_eq!(out.labels, vec![1]);
    }

    #[test]
    fn test_train_adds_augmentation() {
        let cfg = PipelineSettings { noise_std: 0.1, feature_dropout: 0.2, ..Default::default() };
        let pipeline = build_pipeline(PipelineMode::Train, &cfg).unwrap();
        assert_eq!(pipeline.len(), 3);
        assert_eq!(pipeline.apply(sample()).features.len(), 3);
    }

    #[test]
    fn test_zero_std_does_not_divide_by_zero() {
        let cfg = PipelineSettings { std: Stat::Scalar(0.0), ..Default::default() };
        let out = build_pipeline(PipelineMode::Evalu, &cfg).unwrap().apply(sample());
        assert_eq!(out.features, vec![2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_rejects_bad_dropout() {
        let cfg = PipelineSettings { feature_dropout: 1.5, ..Default::default() };
        assert!(build_pipeline(PipelineMode::Train, &cfg).is_err());
    }

    #[test]
    fn test_settings_accept_scalar_or_list() {
        let settings = ComponentSettings::new(ATTRIBUTE_PIPELINE)
            .with_option("mean", serde_json::json!([0.5, 0.5]))
            .with_option("std", 0.25);
        let cfg: PipelineSettings = settings.parse().unwrap();
        assert_eq!(cfg.mean, Stat::PerDim(vec![0.5, 0.5]));
        assert_eq!(cfg.std, Stat::Scalar(0.25));
    }
}
