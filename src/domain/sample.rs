// ============================================================
// Layer 3 — Samples and Batches
// ============================================================
// An instance is one detected object (a person, a vehicle...)
// described by a feature vector, together with a vector of
// binary attribute labels:
//
//    1 → attribute present
//    0 → attribute absent
//   -1 → not annotated
//
// Batches are stored row-major on the host so that the data
// layer stays framework-free; the model converts them into
// tensors on its own device.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Label value for an attribute nobody annotated.
pub const UNKNOWN_LABEL: i8 = -1;

/// Dataset split a dataset or loader serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val   => "val",
            Split::Test  => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One annotated instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSample {
    pub instance_id: String,
    pub features:    Vec<f32>,
    pub labels:      Vec<i8>,
}

impl AttributeSample {
    pub fn new(instance_id: impl Into<String>, features: Vec<f32>, labels: Vec<i8>) -> Self {
        Self { instance_id: instance_id.into(), features, labels }
    }

    pub fn positives(&self) -> usize {
        self.labels.iter().filter(|&&l| l > 0).count()
    }
}

/// A collated batch. `features` is `[len, feature_dim]`,
/// `targets` and `mask` are `[len, num_attributes]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeBatch {
    pub instance_ids:   Vec<String>,
    pub features:       Vec<f32>,
    pub feature_dim:    usize,
    pub targets:        Vec<f32>,
    pub mask:           Vec<f32>,
    pub num_attributes: usize,
}

impl AttributeBatch {
    pub fn len(&self) -> usize {
        self.instance_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instance_ids.is_empty()
    }

    /// Feature row of sample `i`.
    pub fn row(&self, i: usize) -> &[f32] {
        &self.features[i * self.feature_dim..(i + 1) * self.feature_dim]
    }
}
