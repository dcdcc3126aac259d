// ============================================================
// Layer 2 — Component Registry
// ============================================================
// Name → factory tables, one per component kind. Settings pick
// an implementation by its registered `name`; the registry is
// the only place that knows which concrete types exist.
//
//   kind         factory input                    output
//   ──────────   ──────────────────────────────   ───────────────────────
//   task         mode, settings bundle, registry  Box<dyn Task>
//   model        settings, device                 Box<dyn AttributeModel>
//   pipeline     mode (train / evalu), settings   Arc<dyn Transform>
//   dataset      split, transform, settings       Arc<dyn AttributeDataset>
//   evaluation   settings                         Box<dyn Evaluation>
//   train_util   settings                         Arc<dyn TrainStep>
//
// Unknown names fail with TaskError::NotRegistered.

use anyhow::{Context, Result};
use std::{collections::BTreeMap, sync::Arc};

use crate::application::{
    attribute_recognition::{InstanceAttributeRecognitionTask, TASK_NAME},
    task::{Task, TaskMode},
};
use crate::data::{
    dataset::{
        instance_attribute_dataset, synthetic_attribute_dataset, INSTANCE_ATTRIBUTE_DATASET,
        SYNTHETIC_ATTRIBUTE_DATASET,
    },
    pipeline::{attribute_pipeline, PipelineMode, ATTRIBUTE_PIPELINE},
};
use crate::domain::{
    device::Device,
    error::{ComponentKind, TaskError},
    sample::Split,
    settings::{ComponentSettings, SettingsBundle},
    traits::{AttributeDataset, AttributeModel, Evaluation, TrainStep, Transform},
};
use crate::ml::{
    evaluation::{mean_average_precision, MEAN_AVERAGE_PRECISION},
    model::{attribute_mlp, ATTRIBUTE_MLP},
    trainer::{attribute_train_epoch, ATTRIBUTE_TRAIN_EPOCH},
};

pub type TaskFactory =
    Arc<dyn Fn(TaskMode, SettingsBundle, &Registry) -> Result<Box<dyn Task>> + Send + Sync>;
pub type ModelFactory =
    Arc<dyn Fn(&ComponentSettings, &Device) -> Result<Box<dyn AttributeModel>> + Send + Sync>;
pub type PipelineFactory =
    Arc<dyn Fn(PipelineMode, &ComponentSettings) -> Result<Arc<dyn Transform>> + Send + Sync>;
pub type DatasetFactory = Arc<
    dyn Fn(Split, Arc<dyn Transform>, &ComponentSettings) -> Result<Arc<dyn AttributeDataset>> + Send + Sync,
>;
pub type EvaluationFactory =
    Arc<dyn Fn(&ComponentSettings) -> Result<Box<dyn Evaluation>> + Send + Sync>;
pub type TrainUtilFactory =
    Arc<dyn Fn(&ComponentSettings) -> Result<Arc<dyn TrainStep>> + Send + Sync>;

#[derive(Clone, Default)]
pub struct Registry {
    tasks:       BTreeMap<String, TaskFactory>,
    models:      BTreeMap<String, ModelFactory>,
    pipelines:   BTreeMap<String, PipelineFactory>,
    datasets:    BTreeMap<String, DatasetFactory>,
    evaluations: BTreeMap<String, EvaluationFactory>,
    train_utils: BTreeMap<String, TrainUtilFactory>,
}

fn lookup<'a, F>(table: &'a BTreeMap<String, F>, kind: ComponentKind, name: &str) -> Result<&'a F, TaskError> {
    table.get(name).ok_or_else(|| TaskError::NotRegistered { kind, name: name.to_string() })
}

impl Registry {
    /// A registry with nothing in it.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every built-in component under its settings name.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register_task(TASK_NAME, |mode, settings, registry| {
            Ok(Box::new(InstanceAttributeRecognitionTask::prepare(mode, settings, registry)?) as Box<dyn Task>)
        });
        registry.register_model(ATTRIBUTE_MLP, attribute_mlp);
        registry.register_pipeline(ATTRIBUTE_PIPELINE, attribute_pipeline);
        registry.register_dataset(INSTANCE_ATTRIBUTE_DATASET, instance_attribute_dataset);
        registry.register_dataset(SYNTHETIC_ATTRIBUTE_DATASET, synthetic_attribute_dataset);
        registry.register_evaluation(MEAN_AVERAGE_PRECISION, mean_average_precision);
        registry.register_train_util(ATTRIBUTE_TRAIN_EPOCH, attribute_train_epoch);
        registry
    }

    // ── Registration ─────────────────────────────────────────────────────────

    pub fn register_task<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(TaskMode, SettingsBundle, &Registry) -> Result<Box<dyn Task>> + Send + Sync + 'static,
    {
        self.tasks.insert(name.into(), Arc::new(factory));
    }

    pub fn register_model<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&ComponentSettings, &Device) -> Result<Box<dyn AttributeModel>> + Send + Sync + 'static,
    {
        self.models.insert(name.into(), Arc::new(factory));
    }

    pub fn register_pipeline<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(PipelineMode, &ComponentSettings) -> Result<Arc<dyn Transform>> + Send + Sync + 'static,
    {
        self.pipelines.insert(name.into(), Arc::new(factory));
    }

    pub fn register_dataset<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(Split, Arc<dyn Transform>, &ComponentSettings) -> Result<Arc<dyn AttributeDataset>>
            + Send
            + Sync
            + 'static,
    {
        self.datasets.insert(name.into(), Arc::new(factory));
    }

    pub fn register_evaluation<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&ComponentSettings) -> Result<Box<dyn Evaluation>> + Send + Sync + 'static,
    {
        self.evaluations.insert(name.into(), Arc::new(factory));
    }

    pub fn register_train_util<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&ComponentSettings) -> Result<Arc<dyn TrainStep>> + Send + Sync + 'static,
    {
        self.train_utils.insert(name.into(), Arc::new(factory));
    }

    // ── Builders ─────────────────────────────────────────────────────────────

    pub fn build_task(&self, mode: TaskMode, settings: SettingsBundle) -> Result<Box<dyn Task>> {
        let name    = settings.task.name.clone();
        let factory = lookup(&self.tasks, ComponentKind::Task, &name)?;
        factory(mode, settings, self).with_context(|| format!("Cannot prepare task '{name}'"))
    }

    pub fn build_model(&self, settings: &ComponentSettings, device: &Device) -> Result<Box<dyn AttributeModel>> {
        let factory = lookup(&self.models, ComponentKind::Model, &settings.name)?;
        factory(settings, device).with_context(|| format!("Cannot build model '{}'", settings.name))
    }

    pub fn build_pipeline(&self, mode: PipelineMode, settings: &ComponentSettings) -> Result<Arc<dyn Transform>> {
        let factory = lookup(&self.pipelines, ComponentKind::Pipeline, &settings.name)?;
        factory(mode, settings).with_context(|| format!("Cannot build {mode} pipeline '{}'", settings.name))
    }

    pub fn build_dataset(
        &self,
        split:     Split,
        transform: Arc<dyn Transform>,
        settings:  &ComponentSettings,
    ) -> Result<Arc<dyn AttributeDataset>> {
        let factory = lookup(&self.datasets, ComponentKind::Dataset, &settings.name)?;
        factory(split, transform, settings)
            .with_context(|| format!("Cannot build {split} dataset '{}'", settings.name))
    }

    pub fn build_evaluation(&self, settings: &ComponentSettings) -> Result<Box<dyn Evaluation>> {
        let factory = lookup(&self.evaluations, ComponentKind::Evaluation, &settings.name)?;
        factory(settings).with_context(|| format!("Cannot build evaluation '{}'", settings.name))
    }

    pub fn build_train_util(&self, settings: &ComponentSettings) -> Result<Arc<dyn TrainStep>> {
        let factory = lookup(&self.train_utils, ComponentKind::TrainUtil, &settings.name)?;
        factory(settings).with_context(|| format!("Cannot build train utility '{}'", settings.name))
    }

    /// Registered names of one kind, sorted.
    pub fn names(&self, kind: ComponentKind) -> Vec<&str> {
        fn keys<F>(table: &BTreeMap<String, F>) -> Vec<&str> {
            table.keys().map(String::as_str).collect()
        }
        match kind {
            ComponentKind::Task       => keys(&self.tasks),
            ComponentKind::Model      => keys(&self.models),
            ComponentKind::Pipeline   => keys(&self.pipelines),
            ComponentKind::Dataset    => keys(&self.datasets),
            ComponentKind::Evaluation => keys(&self.evaluations),
            ComponentKind::TrainUtil  => keys(&self.train_utils),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_every_kind() {
        let registry = Registry::with_defaults();
        for kind in ComponentKind::ALL {
            assert!(!registry.names(kind).is_empty(), "no {kind} registered");
        }
        assert_eq!(
            registry.names(ComponentKind::Dataset),
            vec![INSTANCE_ATTRIBUTE_DATASET, SYNTHETIC_ATTRIBUTE_DATASET]
        );
        assert_eq!(registry.names(ComponentKind::Task), vec![TASK_NAME]);
    }

    #[test]
    fn test_unknown_name_is_not_registered() {
        let registry = Registry::with_defaults();
        let err = registry.build_evaluation(&ComponentSettings::new("Top5Accuracy")).err().unwrap();
        match err.downcast_ref::<TaskError>() {
            Some(TaskError::NotRegistered { kind, name }) => {
                assert_eq!(*kind, ComponentKind::Evaluation);
                assert_eq!(name, "Top5Accuracy");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_custom_registration_shadows_nothing_else() {
        let mut registry = Registry::empty();
        registry.register_pipeline("Identity", |_mode, settings| {
            attribute_pipeline(PipelineMode::Evalu, settings)
        });
        assert!(registry.build_pipeline(PipelineMode::Train, &ComponentSettings::new("Identity")).is_ok());
        assert!(registry.build_pipeline(PipelineMode::Train, &ComponentSettings::new(ATTRIBUTE_PIPELINE)).is_err());
        assert!(registry.names(ComponentKind::Model).is_empty());
    }

    #[test]
    fn test_builds_default_components() {
        let registry = Registry::with_defaults();
        let pipeline = registry
            .build_pipeline(PipelineMode::Evalu, &ComponentSettings::new(ATTRIBUTE_PIPELINE))
            .unwrap();
        let dataset = registry
            .build_dataset(
                Split::Val,
                pipeline,
                &ComponentSettings::new(SYNTHETIC_ATTRIBUTE_DATASET).with_option("val_size", 5),
            )
            .unwrap();
        assert_eq!(dataset.len(), 5);
        assert!(registry.build_train_util(&ComponentSettings::new(ATTRIBUTE_TRAIN_EPOCH)).is_ok());
    }
}
