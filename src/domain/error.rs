use std::{fmt, path::PathBuf};

use thiserror::Error;

/// Which family of registered components a lookup targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Task,
    Model,
    Pipeline,
    Dataset,
    Evaluation,
    TrainUtil,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 6] = [
        ComponentKind::Task,
        ComponentKind::Model,
        ComponentKind::Pipeline,
        ComponentKind::Dataset,
        ComponentKind::Evaluation,
        ComponentKind::TrainUtil,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Task       => "task",
            ComponentKind::Model      => "model",
            ComponentKind::Pipeline   => "pipeline",
            ComponentKind::Dataset    => "dataset",
            ComponentKind::Evaluation => "evaluation",
            ComponentKind::TrainUtil  => "train util",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors the task layer raises itself.
///
/// Collaborator failures travel as `anyhow::Error`; these kinds can be
/// recovered from one with `downcast_ref::<TaskError>()`.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no {kind} registered under the name '{name}'")]
    NotRegistered { kind: ComponentKind, name: String },

    #[error("setting '{key}' is missing from '{component}' settings")]
    MissingSetting { component: String, key: String },

    #[error("setting '{key}' of '{component}' is malformed: {source}")]
    MalformedSetting {
        component: String,
        key:       String,
        #[source]
        source:    serde_json::Error,
    },

    #[error("checkpoint error at {}: {msg}", .path.display())]
    Checkpoint { path: PathBuf, msg: String },

    #[error("state dict mismatch: {0}")]
    StateDict(String),
}
