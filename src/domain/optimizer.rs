use serde::{Deserialize, Serialize};

/// Which update rule a model applies on each train step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    #[default]
    Adam,
    Sgd,
}

/// Handle returned by `AttributeModel::optimizer`.
///
/// The optimizer's moment buffers stay inside the model (burn optimizers
/// consume and return the module on every step); the handle carries the
/// update rule and the learning rate the scheduler adjusts between epochs.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerHandle {
    kind:          OptimizerKind,
    learning_rate: f64,
}

impl OptimizerHandle {
    pub fn new(kind: OptimizerKind, learning_rate: f64) -> Self {
        Self { kind, learning_rate }
    }

    pub fn kind(&self) -> OptimizerKind {
        self.kind
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
    }
}
