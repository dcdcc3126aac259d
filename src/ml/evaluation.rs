// ============================================================
// Layer 5 — Mean Average Precision
// ============================================================
// Collects (score, label) pairs for every supervised slot over a
// loader pass, then per attribute:
//
//   sort by score, descending
//   AP = mean over positives of precision@rank(positive)
//
// mAP averages AP over attributes that have at least one positive
// in the pass; it is 0 when no attribute does.

use anyhow::{bail, Result};
use serde::Deserialize;

use crate::domain::{
    settings::ComponentSettings,
    traits::{AttributeModel, BatchSource, Evaluation},
};

pub const MEAN_AVERAGE_PRECISION: &str = "MeanAveragePrecision";

/// Non-interpolated average precision of one attribute.
///
/// `None` when there is no positive to rank.
pub fn average_precision(pairs: &[(f32, bool)]) -> Option<f64> {
    let positives = pairs.iter().filter(|(_, positive)| *positive).count();
    if positives == 0 {
        return None;
    }

    let mut ranked: Vec<&(f32, bool)> = pairs.iter().collect();
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut hits      = 0usize;
    let mut precision = 0.0f64;
    for (rank, (_, positive)) in ranked.iter().enumerate() {
        if *positive {
            hits      += 1;
            precision += hits as f64 / (rank + 1) as f64;
        }
    }
    Some(precision / positives as f64)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MapSettings {
    /// Attribute names, only used for per-attribute log lines.
    pub attributes: Option<Vec<String>>,
}

#[derive(Debug, Default)]
pub struct MeanAveragePrecision {
    attributes: Option<Vec<String>>,
    per_attribute: Vec<Option<f64>>,
    map: f64,
}

impl MeanAveragePrecision {
    pub fn new(attributes: Option<Vec<String>>) -> Self {
        Self { attributes, ..Default::default() }
    }

    /// AP of each attribute from the last pass; `None` where it had no positive.
    pub fn per_attribute(&self) -> &[Option<f64>] {
        &self.per_attribute
    }

    fn attribute_name(&self, index: usize) -> String {
        self.attributes
            .as_ref()
            .and_then(|names| names.get(index).cloned())
            .unwrap_or_else(|| format!("attr{index}"))
    }
}

impl Evaluation for MeanAveragePrecision {
    fn evaluate(&mut self, model: &dyn AttributeModel, loader: &dyn BatchSource) -> Result<()> {
        let num_attributes = model.num_attributes();
        let mut pairs: Vec<Vec<(f32, bool)>> = vec![Vec::new(); num_attributes];

        for batch in loader.batches() {
            if batch.num_attributes != num_attributes {
                bail!(
                    "batch has {} attributes, model predicts {}",
                    batch.num_attributes,
                    num_attributes
                );
            }
            let scores = model.predict(&batch)?;
            if scores.len() != batch.len() * num_attributes {
                bail!("model returned {} scores for a batch of {}", scores.len(), batch.len());
            }
            for (slot, score) in scores.into_iter().enumerate() {
                if batch.mask[slot] > 0.0 {
                    pairs[slot % num_attributes].push((score, batch.targets[slot] > 0.5));
                }
            }
        }

        self.per_attribute = pairs.iter().map(|p| average_precision(p)).collect();
        for (i, ap) in self.per_attribute.iter().enumerate() {
            match ap {
                Some(ap) => tracing::debug!("AP {:<16} {:.4}", self.attribute_name(i), ap),
                None     => tracing::debug!("AP {:<16} n/a (no positives)", self.attribute_name(i)),
            }
        }

        let scored: Vec<f64> = self.per_attribute.iter().flatten().copied().collect();
        self.map = if scored.is_empty() { 0.0 } else { scored.iter().sum::<f64>() / scored.len() as f64 };
        Ok(())
    }

    fn map(&self) -> f64 {
        self.map
    }
}

/// Registry entry for `MeanAveragePrecision`.
pub fn mean_average_precision(settings: &ComponentSettings) -> Result<Box<dyn Evaluation>> {
    let cfg: MapSettings = settings.parse()?;
    Ok(Box::new(MeanAveragePrecision::new(cfg.attributes)))
}
