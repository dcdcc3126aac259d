// ============================================================
// Layer 3 — Settings
// ============================================================
// A settings bundle has one record per component:
//
//   {
//     "task":     { "name": "InstanceAttributeRecognitionTask", "d_weight": "weights" },
//     "model":    { "name": "AttributeMlp", "input_dim": 16, ... },
//     "pipeline": { "name": "AttributePipeline", ... },
//     "dataset":  { "name": "SyntheticAttributeDataset", "trainloader": {...}, ... },
//     "eval":     { "name": "MeanAveragePrecision", "batch_size": 64 },
//     "train":    { "name": "AttributeTrainEpoch", "epochs": 10, "batch_size": 32, "amp": false }
//   }
//
// `name` picks the registered implementation, every other key is
// a keyword option handed to that implementation's factory.
// The bundle is read once and never mutated afterwards.

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{fs, path::Path};

use crate::domain::error::TaskError;

/// One component's settings: the registered name plus keyword options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSettings {
    pub name: String,

    #[serde(flatten, default)]
    options: Map<String, Value>,
}

impl ComponentSettings {
    #[cfg(test)]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), options: Map::new() }
    }

    #[cfg(test)]
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_option(key, value);
        self
    }

    pub fn set_option(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.options.insert(key.into(), value.into());
    }

    /// Optional typed lookup. `Ok(None)` when the key is absent or null.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, TaskError> {
        match self.options.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|source| TaskError::MalformedSetting {
                    component: self.name.clone(),
                    key:       key.to_string(),
                    source,
                }),
        }
    }

    /// Required typed lookup.
    pub fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T, TaskError> {
        self.get(key)?.ok_or_else(|| TaskError::MissingSetting {
            component: self.name.clone(),
            key:       key.to_string(),
        })
    }

    /// Deserialise every option into a typed settings struct.
    /// Unknown keys are ignored so one record can feed several consumers.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, TaskError> {
        serde_json::from_value(Value::Object(self.options.clone())).map_err(|source| {
            TaskError::MalformedSetting {
                component: self.name.clone(),
                key:       "*".to_string(),
                source,
            }
        })
    }
}

/// The full settings bundle a task is prepared from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsBundle {
    pub task:     ComponentSettings,
    pub model:    ComponentSettings,
    pub pipeline: ComponentSettings,
    pub dataset:  ComponentSettings,
    pub eval:     ComponentSettings,
    pub train:    ComponentSettings,
}

impl SettingsBundle {
    /// Read a bundle from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("Cannot read settings from '{}'", path.display()))?;
        Self::from_json_str(&json)
            .with_context(|| format!("Cannot parse settings in '{}'", path.display()))
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
