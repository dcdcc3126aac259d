// ============================================================
// Layer 3 — State Dict
// ============================================================
// A model's parameters as a map from dotted names to host
// tensors, e.g.
//
//   layers.0.weight  [16, 64]
//   layers.0.bias    [64]
//   head.weight      [64, 8]
//   head.bias        [8]
//
// This is what checkpoints store. Models rebuild their
// parameters from it through `reconcile`, which decides which
// entries are usable and which keys are missing or unexpected.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::error::TaskError;

/// A named parameter's shape and row-major values.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamTensor {
    shape:  Vec<usize>,
    values: Vec<f32>,
}

impl ParamTensor {
    pub fn new(shape: Vec<usize>, values: Vec<f32>) -> Result<Self, TaskError> {
        let expected: usize = shape.iter().product();
        if expected != values.len() {
            return Err(TaskError::StateDict(format!(
                "shape {shape:?} holds {expected} values but {} were given",
                values.len()
            )));
        }
        Ok(Self { shape, values })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn into_values(self) -> Vec<f32> {
        self.values
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDict {
    params: BTreeMap<String, ParamTensor>,
}

impl StateDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: ParamTensor) -> Option<ParamTensor> {
        self.params.insert(name.into(), tensor)
    }

    pub fn get(&self, name: &str) -> Option<&ParamTensor> {
        self.params.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<ParamTensor> {
        self.params.remove(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamTensor)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// Keys that did not line up when loading a state dict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub missing_keys:    Vec<String>,
    pub unexpected_keys: Vec<String>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.missing_keys.is_empty() && self.unexpected_keys.is_empty()
    }
}

/// Match an incoming state dict against the parameters a model expects.
///
/// Returns the usable entries plus a report of missing / unexpected
/// keys. Strict mode turns a non-clean report into an error; a shape
/// mismatch on a shared key is an error in either mode. Nothing is
/// applied here, so a failed call leaves the model untouched.
pub fn reconcile(
    expected: &[(String, Vec<usize>)],
    mut incoming: StateDict,
    strict: bool,
) -> Result<(BTreeMap<String, ParamTensor>, LoadReport), TaskError> {
    let mut matched = BTreeMap::new();
    let mut report  = LoadReport::default();

    for (name, shape) in expected {
        match incoming.remove(name) {
            Some(tensor) if tensor.shape() == shape.as_slice() => {
                matched.insert(name.clone(), tensor);
            }
            Some(tensor) => {
                return Err(TaskError::StateDict(format!(
                    "size mismatch for {name}: checkpoint has {:?}, model expects {shape:?}",
                    tensor.shape()
                )));
            }
            None => report.missing_keys.push(name.clone()),
        }
    }
    report.unexpected_keys = incoming.keys().map(str::to_string).collect();

    if strict && !report.is_clean() {
        return Err(TaskError::StateDict(format!(
            "missing keys {:?}, unexpected keys {:?}",
            report.missing_keys, report.unexpected_keys
        )));
    }
    Ok((matched, report))
}
