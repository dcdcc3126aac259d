// ============================================================
// Layer 2 — InstanceAttributeRecognitionTask
// ============================================================
// Wires registered components into a train or test run:
//
//   prepare
//     model       ← registry (moved to the task device)
//     evaluation  ← registry
//     train util  ← registry
//     train mode: pipelines train + evalu
//                 datasets  train(train) val(evalu) test(evalu)
//                 3 loaders, batch size from train settings
//     test mode:  pipeline evalu, dataset test
//                 1 loader, batch size from eval settings
//
//   train
//     for each epoch:
//       train util → val mAP → plateau scheduler
//       strictly better val mAP → overwrite best checkpoint
//     reload best checkpoint from disk (strict) → test mAP
//
//   eval
//     load best checkpoint non-strictly (fallback: initial
//     weights) → test mAP
//
// Collation is looked up once, on the first dataset built for
// the mode (train set in train mode, test set in test mode), and
// used by every loader of the run.

use anyhow::{Context, Result};
use std::{path::PathBuf, sync::Arc};

use crate::application::{
    registry::Registry,
    task::{CheckpointStatus, EvalReport, Task, TaskMode, TaskReport, TrainReport},
};
use crate::data::{
    loader::{AttributeLoader, LoaderConfig, LoaderOptions},
    pipeline::PipelineMode,
};
use crate::domain::{
    device::Device,
    error::TaskError,
    sample::Split,
    settings::{ComponentSettings, SettingsBundle},
    traits::{AttributeDataset, AttributeModel, BatchSource, Collate, EpochContext, Evaluation, TrainStep},
};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{EpochMetrics, MetricsLogger},
};
use crate::ml::scheduler::{PlateauConfig, PlateauScheduler};

pub const TASK_NAME: &str = "InstanceAttributeRecognitionTask";
pub const DEFAULT_PROJECT: &str = "InstanceAttributeRecognitionProject";

// ─── Train plan ───────────────────────────────────────────────────────────────

/// The `train` settings, validated before anything is built.
#[derive(Debug, Clone)]
pub struct TrainPlan {
    pub epochs:     usize,
    pub batch_size: usize,
    pub amp:        bool,
    pub scheduler:  PlateauConfig,
}

impl TrainPlan {
    pub fn from_settings(train: &ComponentSettings) -> Result<Self> {
        let plan = Self {
            epochs:     train.require("epochs")?,
            batch_size: train.require("batch_size")?,
            amp:        train.get("amp")?.unwrap_or(false),
            scheduler:  train.get("scheduler")?.unwrap_or_default(),
        };
        if plan.epochs == 0 {
            return Err(TaskError::InvalidConfig("epochs must be positive".into()).into());
        }
        if plan.batch_size == 0 {
            return Err(TaskError::InvalidConfig("train batch_size must be positive".into()).into());
        }
        Ok(plan)
    }
}

// ─── Best score ───────────────────────────────────────────────────────────────

/// Best validation mAP seen so far in a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestScore {
    map: f64,
}

impl Default for BestScore {
    fn default() -> Self {
        Self { map: f64::NEG_INFINITY }
    }
}

impl BestScore {
    /// True when `map` beats every score recorded so far. NaN never does.
    pub fn update(&mut self, map: f64) -> bool {
        if map > self.map {
            self.map = map;
            true
        } else {
            false
        }
    }

    pub fn map(&self) -> f64 {
        self.map
    }
}

// ─── Loaders ──────────────────────────────────────────────────────────────────

pub enum Loaders {
    Train {
        train: AttributeLoader,
        val:   AttributeLoader,
        test:  AttributeLoader,
    },
    Test {
        test: AttributeLoader,
    },
}

impl Loaders {
    pub fn test(&self) -> &AttributeLoader {
        match self {
            Loaders::Train { test, .. } | Loaders::Test { test } => test,
        }
    }

    pub fn all(&self) -> Vec<&AttributeLoader> {
        match self {
            Loaders::Train { train, val, test } => vec![train, val, test],
            Loaders::Test { test }              => vec![test],
        }
    }

    pub fn count(&self) -> usize {
        self.all().len()
    }
}

fn loader_config(dataset: &ComponentSettings, split: Split, batch_size: usize) -> Result<LoaderConfig> {
    let options = dataset
        .get::<LoaderOptions>(&format!("{split}loader"))?
        .unwrap_or_default();
    Ok(LoaderConfig { split, batch_size, options })
}

fn collate_of(dataset: &dyn AttributeDataset) -> Option<Arc<dyn Collate>> {
    let collate = dataset.collate_fn();
    match &collate {
        Some(_) => tracing::info!("Using the {} dataset's collate function", dataset.split()),
        None    => tracing::info!(
            "The {} dataset has no collate function; loaders use the default batcher",
            dataset.split()
        ),
    }
    collate
}

// ─── Task ─────────────────────────────────────────────────────────────────────

pub struct InstanceAttributeRecognitionTask {
    mode:       TaskMode,
    settings:   SettingsBundle,
    project:    String,
    device:     Device,
    model:      Box<dyn AttributeModel>,
    evaluation: Box<dyn Evaluation>,
    train_util: Arc<dyn TrainStep>,
    pipelines:  Vec<PipelineMode>,
    loaders:    Loaders,
    plan:       Option<TrainPlan>,
    checkpoint: CheckpointManager,
}

impl InstanceAttributeRecognitionTask {
    pub fn prepare(mode: TaskMode, settings: SettingsBundle, registry: &Registry) -> Result<Self> {
        let d_weight: PathBuf = settings.task.require("d_weight")?;
        let project = settings
            .task
            .get::<String>("project")?
            .unwrap_or_else(|| DEFAULT_PROJECT.to_string());
        let device: Device = settings.task.get("device")?.unwrap_or_default();
        tracing::info!("Preparing {} in {} mode (project '{}', device {})", TASK_NAME, mode, project, device);

        let plan = match mode {
            TaskMode::Train => Some(TrainPlan::from_settings(&settings.train)?),
            TaskMode::Test  => None,
        };

        let mut model = registry.build_model(&settings.model, &device)?;
        model.to_device(&device)?;
        let evaluation = registry.build_evaluation(&settings.eval)?;
        let train_util = registry.build_train_util(&settings.train)?;

        let (pipelines, loaders) = match &plan {
            Some(plan) => {
                let train_tf = registry.build_pipeline(PipelineMode::Train, &settings.pipeline)?;
                let evalu_tf = registry.build_pipeline(PipelineMode::Evalu, &settings.pipeline)?;

                let train_set = registry.build_dataset(Split::Train, train_tf, &settings.dataset)?;
                let val_set   = registry.build_dataset(Split::Val, evalu_tf.clone(), &settings.dataset)?;
                let test_set  = registry.build_dataset(Split::Test, evalu_tf, &settings.dataset)?;
                tracing::info!(
                    "Datasets: train={} val={} test={}",
                    train_set.len(), val_set.len(), test_set.len()
                );

                let collate = collate_of(train_set.as_ref());
                let build = |split: Split, dataset: Arc<dyn AttributeDataset>| -> Result<AttributeLoader> {
                    AttributeLoader::build(
                        loader_config(&settings.dataset, split, plan.batch_size)?,
                        dataset,
                        collate.clone(),
                    )
                };
                let loaders = Loaders::Train {
                    train: build(Split::Train, train_set)?,
                    val:   build(Split::Val, val_set)?,
                    test:  build(Split::Test, test_set)?,
                };
                (vec![PipelineMode::Train, PipelineMode::Evalu], loaders)
            }
            None => {
                let batch_size: usize = settings.eval.require("batch_size")?;
                let evalu_tf = registry.build_pipeline(PipelineMode::Evalu, &settings.pipeline)?;
                let test_set = registry.build_dataset(Split::Test, evalu_tf, &settings.dataset)?;
                tracing::info!("Datasets: test={}", test_set.len());

                let collate = collate_of(test_set.as_ref());
                let test = AttributeLoader::build(
                    loader_config(&settings.dataset, Split::Test, batch_size)?,
                    test_set,
                    collate,
                )?;
                (vec![PipelineMode::Evalu], Loaders::Test { test })
            }
        };

        for loader in loaders.all() {
            tracing::debug!(
                "{} loader: batch_size={} collate={:?}",
                loader.split(), loader.config().batch_size, loader.collate_source()
            );
        }

        let checkpoint = CheckpointManager::new(d_weight, project.clone());
        Ok(Self {
            mode,
            settings,
            project,
            device,
            model,
            evaluation,
            train_util,
            pipelines,
            loaders,
            plan,
            checkpoint,
        })
    }

    pub fn loaders(&self) -> &Loaders {
        &self.loaders
    }

    /// Pipeline variants built during `prepare`, in build order.
    pub fn pipelines(&self) -> &[PipelineMode] {
        &self.pipelines
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.checkpoint.weight_path()
    }

    pub fn train(&mut self) -> Result<TrainReport> {
        let plan = self
            .plan
            .clone()
            .ok_or_else(|| TaskError::InvalidConfig("task was prepared for test and cannot train".into()))?;
        let Loaders::Train { train, val, test } = &self.loaders else {
            return Err(TaskError::InvalidConfig("train loaders were not built".into()).into());
        };

        if let Err(e) = self.checkpoint.save_settings(&self.settings) {
            tracing::warn!("Could not save settings snapshot: {e:#}");
        }
        let metrics = match MetricsLogger::new(self.checkpoint.dir(), &self.project) {
            Ok(metrics) => Some(metrics),
            Err(e) => {
                tracing::warn!("Metrics CSV disabled: {e:#}");
                None
            }
        };

        let mut optimizer = self.model.optimizer();
        let mut scheduler = PlateauScheduler::new(plan.scheduler.clone())?;
        let mut best      = BestScore::default();
        let mut saved     = None;
        let mut records   = Vec::with_capacity(plan.epochs);

        tracing::info!(
            "Training {} epochs: {} train / {} val samples, lr={:.2e}",
            plan.epochs, train.num_items(), val.num_items(), optimizer.learning_rate()
        );

        for epoch in 0..plan.epochs {
            let learning_rate = optimizer.learning_rate();
            let stats = self.train_util.run_epoch(EpochContext {
                model:        self.model.as_mut(),
                loader:       train,
                optimizer:    &optimizer,
                epoch,
                total_epochs: plan.epochs,
                device:       &self.device,
                amp:          plan.amp,
            })?;

            self.evaluation
                .evaluate(self.model.as_ref(), val)
                .with_context(|| format!("Validation failed at epoch {epoch}"))?;
            let val_map = self.evaluation.map();
            scheduler.step(val_map, &mut optimizer);

            let improved = best.update(val_map);
            if improved {
                match self.model.state_dict().and_then(|state| self.checkpoint.save(&state)) {
                    Ok(()) => {
                        saved = Some((epoch, val_map));
                        tracing::info!("New best val mAP {:.4}; saved '{}'", val_map, self.checkpoint_path().display());
                    }
                    Err(e) => tracing::warn!("Could not save checkpoint at epoch {}: {e:#}", epoch),
                }
            }

            tracing::info!(
                "Epoch {:>3}/{} | train_loss={:.4} | val_mAP={:.4} | best={:.4}",
                epoch + 1, plan.epochs, stats.mean_loss, val_map, best.map()
            );

            let record = EpochMetrics { epoch, train_loss: stats.mean_loss, val_map, learning_rate, improved };
            if let Some(metrics) = &metrics {
                if let Err(e) = metrics.log(&record) {
                    tracing::warn!("Could not append metrics: {e:#}");
                }
            }
            records.push(record);
        }

        // only weights written by this run may be reloaded
        let (best_epoch, best_val_map) = saved.ok_or_else(|| TaskError::Checkpoint {
            path: self.checkpoint_path(),
            msg:  "no epoch of this run saved a checkpoint".into(),
        })?;

        let state = self.checkpoint.load().context("Cannot reload the best checkpoint")?;
        self.model.load_state_dict(state, true)?;
        self.model.to_device(&self.device)?;
        self.evaluation
            .evaluate(self.model.as_ref(), test)
            .context("Test evaluation failed")?;
        let test_map = self.evaluation.map();

        tracing::info!(
            "Training complete: best val mAP {:.4} at epoch {}, test mAP {:.4}",
            best_val_map, best_epoch + 1, test_map
        );

        Ok(TrainReport {
            project: self.project.clone(),
            epochs: records,
            best_epoch,
            best_val_map,
            test_map,
            checkpoint: self.checkpoint_path(),
        })
    }

    pub fn eval(&mut self) -> Result<EvalReport> {
        let path = self.checkpoint_path();
        let loaded = self
            .checkpoint
            .load()
            .and_then(|state| self.model.load_state_dict(state, false));

        let checkpoint = match loaded {
            Ok(report) => {
                if !report.missing_keys.is_empty() {
                    tracing::warn!("Missing keys in checkpoint: {:?}", report.missing_keys);
                }
                if !report.unexpected_keys.is_empty() {
                    tracing::warn!("Unexpected keys in checkpoint: {:?}", report.unexpected_keys);
                }
                tracing::info!("Loaded checkpoint '{}'", path.display());
                CheckpointStatus::Loaded { path, report }
            }
            Err(e) => {
                tracing::warn!("Cannot load checkpoint: {e:#}; evaluating the initial weights");
                CheckpointStatus::Fallback { path, reason: format!("{e:#}") }
            }
        };

        self.model.to_device(&self.device)?;
        self.evaluation
            .evaluate(self.model.as_ref(), self.loaders.test())
            .context("Test evaluation failed")?;
        let test_map = self.evaluation.map();
        tracing::info!("Test mAP {:.4}", test_map);

        Ok(EvalReport { project: self.project.clone(), test_map, checkpoint })
    }
}

impl Task for InstanceAttributeRecognitionTask {
    fn name(&self) -> &str {
        TASK_NAME
    }

    fn mode(&self) -> TaskMode {
        self.mode
    }

    fn run(&mut self) -> Result<TaskReport> {
        match self.mode {
            TaskMode::Train => Ok(TaskReport::Train(self.train()?)),
            TaskMode::Test  => Ok(TaskReport::Test(self.eval()?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{
        batcher::{CollateSource, MaskedCollate},
        dataset::SYNTHETIC_ATTRIBUTE_DATASET,
        pipeline::ATTRIBUTE_PIPELINE,
    };
    use crate::domain::{
        error::ComponentKind,
        optimizer::{OptimizerHandle, OptimizerKind},
        sample::{AttributeBatch, AttributeSample},
        state_dict::{reconcile, LoadReport, ParamTensor, StateDict},
        traits::Transform,
    };
    use crate::ml::{
        evaluation::MEAN_AVERAGE_PRECISION,
        model::ATTRIBUTE_MLP,
        trainer::{attribute_train_epoch, ATTRIBUTE_TRAIN_EPOCH},
    };
    use std::{
        cell::Cell,
        collections::VecDeque,
        path::Path,
        sync::Mutex,
    };

    // ── Stand-ins ────────────────────────────────────────────────────────────

    /// Shared view into what the stand-ins were asked to do.
    #[derive(Clone, Default)]
    struct Probe {
        builds:       Arc<Mutex<Vec<String>>>,
        maps:         Arc<Mutex<VecDeque<f64>>>,
        seen_weights: Arc<Mutex<Vec<f32>>>,
    }

    impl Probe {
        fn scripted(maps: &[f64]) -> Self {
            let probe = Self::default();
            probe.maps.lock().unwrap().extend(maps.iter().copied());
            probe
        }

        fn builds(&self) -> Vec<String> {
            self.builds.lock().unwrap().clone()
        }

        fn seen_weights(&self) -> Vec<f32> {
            self.seen_weights.lock().unwrap().clone()
        }
    }

    /// One scalar weight; every train step adds 1, predictions echo it.
    struct CounterModel {
        w:             f32,
        save_failures: Cell<usize>,
    }

    impl AttributeModel for CounterModel {
        fn num_attributes(&self) -> usize { 1 }
        fn optimizer(&mut self) -> OptimizerHandle { OptimizerHandle::new(OptimizerKind::Sgd, 1.0) }
        fn train_step(&mut self, _: &AttributeBatch, _: &OptimizerHandle, _: bool) -> Result<f32> {
            self.w += 1.0;
            Ok(0.25)
        }
        fn predict(&self, batch: &AttributeBatch) -> Result<Vec<f32>> { Ok(vec![self.w; batch.len()]) }
        fn state_dict(&self) -> Result<StateDict> {
            if self.save_failures.get() > 0 {
                self.save_failures.set(self.save_failures.get() - 1);
                anyhow::bail!("device lost");
            }
            let mut state = StateDict::new();
            state.insert("w", ParamTensor::new(vec![1], vec![self.w])?);
            Ok(state)
        }
        fn load_state_dict(&mut self, state: StateDict, strict: bool) -> Result<LoadReport> {
            let (mut matched, report) = reconcile(&[("w".to_string(), vec![1])], state, strict)?;
            if let Some(w) = matched.remove("w") {
                self.w = w.values()[0];
            }
            Ok(report)
        }
        fn to_device(&mut self, _: &Device) -> Result<()> { Ok(()) }
    }

    /// Returns scripted mAPs in call order and records the weight it saw.
    struct ScriptedMap {
        probe: Probe,
        last:  f64,
    }

    impl Evaluation for ScriptedMap {
        fn evaluate(&mut self, model: &dyn AttributeModel, loader: &dyn BatchSource) -> Result<()> {
            let first = loader.batches().next().expect("loader yields a batch");
            self.probe.seen_weights.lock().unwrap().push(model.predict(&first)?[0]);
            self.last = self.probe.maps.lock().unwrap().pop_front().unwrap_or(0.0);
            Ok(())
        }
        fn map(&self) -> f64 { self.last }
    }

    struct Identity;

    impl Transform for Identity {
        fn apply(&self, sample: AttributeSample) -> AttributeSample { sample }
    }

    struct MemoryDataset {
        split:   Split,
        size:    usize,
        collate: bool,
    }

    impl AttributeDataset for MemoryDataset {
        fn split(&self) -> Split { self.split }
        fn len(&self) -> usize { self.size }
        fn get(&self, index: usize) -> Option<AttributeSample> {
            (index < self.size).then(|| {
                AttributeSample::new(format!("{}-{index}", self.split), vec![index as f32], vec![(index % 2) as i8])
            })
        }
        fn collate_fn(&self) -> Option<Arc<dyn Collate>> {
            self.collate.then(|| Arc::new(MaskedCollate) as Arc<dyn Collate>)
        }
    }

    fn registry(probe: &Probe, collate_on: Option<Split>, save_failures: usize) -> Registry {
        let mut registry = Registry::empty();
        registry.register_task(TASK_NAME, |mode, settings, registry| {
            Ok(Box::new(InstanceAttributeRecognitionTask::prepare(mode, settings, registry)?) as Box<dyn Task>)
        });
        registry.register_model("CounterModel", move |_settings, _device| {
            Ok(Box::new(CounterModel { w: 0.0, save_failures: Cell::new(save_failures) }) as Box<dyn AttributeModel>)
        });
        let p = probe.clone();
        registry.register_pipeline("Identity", move |mode, _settings| {
            p.builds.lock().unwrap().push(format!("pipeline:{mode}"));
            Ok(Arc::new(Identity) as Arc<dyn Transform>)
        });
        let p = probe.clone();
        registry.register_dataset("Memory", move |split, _transform, settings| {
            p.builds.lock().unwrap().push(format!("dataset:{split}"));
            let size = settings.require::<usize>("size")?;
            Ok(Arc::new(MemoryDataset { split, size, collate: collate_on == Some(split) }) as Arc<dyn AttributeDataset>)
        });
        let p = probe.clone();
        registry.register_evaluation("ScriptedMap", move |_settings| {
            Ok(Box::new(ScriptedMap { probe: p.clone(), last: f64::NAN }) as Box<dyn Evaluation>)
        });
        registry.register_train_util(ATTRIBUTE_TRAIN_EPOCH, attribute_train_epoch);
        registry
    }

    fn bundle(dir: &Path, epochs: usize) -> SettingsBundle {
        SettingsBundle {
            task:     ComponentSettings::new(TASK_NAME)
                .with_option("d_weight", dir.to_string_lossy().to_string())
                .with_option("project", "Mock"),
            model:    ComponentSettings::new("CounterModel"),
            pipeline: ComponentSettings::new("Identity"),
            dataset:  ComponentSettings::new("Memory").with_option("size", 4),
            eval:     ComponentSettings::new("ScriptedMap").with_option("batch_size", 4),
            train:    ComponentSettings::new(ATTRIBUTE_TRAIN_EPOCH)
                .with_option("epochs", epochs)
                .with_option("batch_size", 2),
        }
    }

    fn saved_weight(dir: &Path) -> f32 {
        let state = CheckpointManager::new(dir, "Mock").load().unwrap();
        state.get("w").unwrap().values()[0]
    }

    // ── prepare ──────────────────────────────────────────────────────────────

    #[test]
    fn test_train_prepare_builds_three_loaders_two_pipelines() {
        let dir   = tempfile::tempdir().unwrap();
        let probe = Probe::default();
        let task  = InstanceAttributeRecognitionTask::prepare(
            TaskMode::Train, bundle(dir.path(), 1), &registry(&probe, None, 0),
        )
        .unwrap();

        assert_eq!(task.loaders().count(), 3);
        assert_eq!(task.pipelines(), &[PipelineMode::Train, PipelineMode::Evalu]);
        assert_eq!(
            probe.builds(),
            vec!["pipeline:train", "pipeline:evalu", "dataset:train", "dataset:val", "dataset:test"]
        );
        let splits: Vec<Split> = task.loaders().all().iter().map(|l| l.split()).collect();
        assert_eq!(splits, vec![Split::Train, Split::Val, Split::Test]);
        assert!(task.loaders().all().iter().all(|l| l.config().batch_size == 2));
        assert_eq!(task.checkpoint_path(), dir.path().join("Mock-model-highest.pth"));
    }

    #[test]
    fn test_test_prepare_builds_one_loader_one_pipeline() {
        let dir   = tempfile::tempdir().unwrap();
        let probe = Probe::default();
        let task  = InstanceAttributeRecognitionTask::prepare(
            TaskMode::Test, bundle(dir.path(), 1), &registry(&probe, None, 0),
        )
        .unwrap();

        assert_eq!(task.loaders().count(), 1);
        assert_eq!(task.pipelines(), &[PipelineMode::Evalu]);
        assert_eq!(probe.builds(), vec!["pipeline:evalu", "dataset:test"]);
        assert_eq!(task.loaders().test().config().batch_size, 4);
    }

    #[test]
    fn test_missing_collate_uses_default_batcher_everywhere() {
        let dir  = tempfile::tempdir().unwrap();
        let task = InstanceAttributeRecognitionTask::prepare(
            TaskMode::Train, bundle(dir.path(), 1), &registry(&Probe::default(), None, 0),
        )
        .unwrap();
        assert!(task.loaders().all().iter().all(|l| l.collate_source() == CollateSource::Default));
    }

    #[test]
    fn test_train_set_collate_applies_to_all_loaders() {
        let dir  = tempfile::tempdir().unwrap();
        let task = InstanceAttributeRecognitionTask::prepare(
            TaskMode::Train, bundle(dir.path(), 1), &registry(&Probe::default(), Some(Split::Train), 0),
        )
        .unwrap();
        assert!(task.loaders().all().iter().all(|l| l.collate_source() == CollateSource::Dataset));
    }

    #[test]
    fn test_test_mode_takes_collate_from_test_set() {
        let dir  = tempfile::tempdir().unwrap();
        let task = InstanceAttributeRecognitionTask::prepare(
            TaskMode::Test, bundle(dir.path(), 1), &registry(&Probe::default(), Some(Split::Test), 0),
        )
        .unwrap();
        assert_eq!(task.loaders().test().collate_source(), CollateSource::Dataset);
    }

    #[test]
    fn test_test_mode_leaves_weight_dir_alone() {
        let root  = tempfile::tempdir().unwrap();
        let dir   = root.path().join("weights");
        let probe = Probe::scripted(&[0.2]);
        let mut task = InstanceAttributeRecognitionTask::prepare(
            TaskMode::Test, bundle(&dir, 1), &registry(&probe, None, 0),
        )
        .unwrap();
        assert!(!task.eval().unwrap().checkpoint.is_loaded());
        assert!(!dir.exists());
    }

    #[test]
    fn test_per_split_loader_options() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = bundle(dir.path(), 1);
        settings.dataset.set_option("trainloader", serde_json::json!({ "shuffle": true, "seed": 3 }));
        let task = InstanceAttributeRecognitionTask::prepare(
            TaskMode::Train, settings, &registry(&Probe::default(), None, 0),
        )
        .unwrap();

        let loaders = task.loaders().all();
        assert!(loaders[0].config().options.shuffle);
        assert_eq!(loaders[0].config().options.seed, 3);
        assert_eq!(loaders[1].config().options, LoaderOptions::default());
    }

    #[test]
    fn test_unregistered_model_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = bundle(dir.path(), 1);
        settings.model.name = "ResNet50".into();
        let err = InstanceAttributeRecognitionTask::prepare(
            TaskMode::Train, settings, &registry(&Probe::default(), None, 0),
        )
        .err()
        .unwrap();
        assert!(matches!(
            err.downcast_ref::<TaskError>(),
            Some(TaskError::NotRegistered { kind: ComponentKind::Model, .. })
        ));
    }

    #[test]
    fn test_zero_epochs_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let err = InstanceAttributeRecognitionTask::prepare(
            TaskMode::Train, bundle(dir.path(), 0), &registry(&Probe::default(), None, 0),
        )
        .err()
        .unwrap();
        assert!(matches!(err.downcast_ref::<TaskError>(), Some(TaskError::InvalidConfig(_))));
    }

    #[test]
    fn test_missing_d_weight_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = bundle(dir.path(), 1);
        settings.task = ComponentSettings::new(TASK_NAME);
        let err = InstanceAttributeRecognitionTask::prepare(
            TaskMode::Test, settings, &registry(&Probe::default(), None, 0),
        )
        .err()
        .unwrap();
        assert!(matches!(
            err.downcast_ref::<TaskError>(),
            Some(TaskError::MissingSetting { key, .. }) if key == "d_weight"
        ));
    }

    // ── train ────────────────────────────────────────────────────────────────

    #[test]
    fn test_best_checkpoint_follows_strictly_better_val_map() {
        let dir   = tempfile::tempdir().unwrap();
        let probe = Probe::scripted(&[0.5, 0.7, 0.6, 0.9]);
        let registry = registry(&probe, None, 0);
        let mut task = registry.build_task(TaskMode::Train, bundle(dir.path(), 3)).unwrap();
        assert_eq!((task.name(), task.mode()), (TASK_NAME, TaskMode::Train));

        let TaskReport::Train(report) = task.run().unwrap() else { panic!("expected a train report") };

        let improved: Vec<bool> = report.epochs.iter().map(|r| r.improved).collect();
        assert_eq!(improved, vec![true, true, false]);
        assert_eq!(report.best_epoch, 1);
        assert_eq!(report.best_val_map, 0.7);
        // the fourth scripted value belongs to the test pass
        assert_eq!(report.test_map, 0.9);

        // 4 samples / batch 2 → two steps per epoch; epoch 1 ends at w = 4
        assert_eq!(saved_weight(dir.path()), 4.0);
        assert_eq!(probe.seen_weights(), vec![2.0, 4.0, 6.0, 4.0]);
        assert!(dir.path().join("Mock-metrics.csv").exists());
        assert!(dir.path().join("Mock-settings.json").exists());
    }

    #[test]
    fn test_equal_val_map_does_not_overwrite() {
        let dir   = tempfile::tempdir().unwrap();
        let probe = Probe::scripted(&[0.4, 0.4, 0.4]);
        let mut task = InstanceAttributeRecognitionTask::prepare(
            TaskMode::Train, bundle(dir.path(), 2), &registry(&probe, None, 0),
        )
        .unwrap();
        let report = task.train().unwrap();
        assert_eq!(report.best_epoch, 0);
        assert_eq!(saved_weight(dir.path()), 2.0);
    }

    #[test]
    fn test_plateau_cuts_learning_rate_each_flat_epoch() {
        let dir   = tempfile::tempdir().unwrap();
        let probe = Probe::scripted(&[0.5, 0.4, 0.3, 0.2]);
        let mut task = InstanceAttributeRecognitionTask::prepare(
            TaskMode::Train, bundle(dir.path(), 4), &registry(&probe, None, 0),
        )
        .unwrap();
        let report = task.train().unwrap();

        // each row holds the rate its epoch trained with, so a cut
        // triggered by epoch k first shows on row k + 1
        let lrs: Vec<f64> = report.epochs.iter().map(|r| r.learning_rate).collect();
        let expected = [1.0, 1.0, 0.1, 0.01];
        assert_eq!(lrs.len(), expected.len());
        for (lr, want) in lrs.iter().zip(expected) {
            assert!((lr - want).abs() < 1e-12, "lrs = {lrs:?}");
        }
    }

    #[test]
    fn test_save_failure_is_not_fatal() {
        let dir   = tempfile::tempdir().unwrap();
        let probe = Probe::scripted(&[0.5, 0.7]);
        let mut task = InstanceAttributeRecognitionTask::prepare(
            TaskMode::Train, bundle(dir.path(), 2), &registry(&probe, None, 1),
        )
        .unwrap();
        let report = task.train().unwrap();
        assert_eq!(report.best_epoch, 1);
        assert_eq!(report.best_val_map, 0.7);
        assert_eq!(saved_weight(dir.path()), 4.0);
    }

    #[test]
    fn test_nothing_saved_is_fatal() {
        let dir   = tempfile::tempdir().unwrap();
        let probe = Probe::scripted(&[0.5]);
        let mut task = InstanceAttributeRecognitionTask::prepare(
            TaskMode::Train, bundle(dir.path(), 1), &registry(&probe, None, 1),
        )
        .unwrap();
        let err = task.train().unwrap_err();
        assert!(matches!(err.downcast_ref::<TaskError>(), Some(TaskError::Checkpoint { .. })));
    }

    #[test]
    fn test_stale_checkpoint_from_earlier_run_is_never_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let mut stale = StateDict::new();
        stale.insert("w", ParamTensor::new(vec![1], vec![99.0]).unwrap());
        CheckpointManager::new(dir.path(), "Mock").save(&stale).unwrap();

        let probe = Probe::scripted(&[0.5, 0.9]);
        let mut task = InstanceAttributeRecognitionTask::prepare(
            TaskMode::Train, bundle(dir.path(), 1), &registry(&probe, None, 1),
        )
        .unwrap();
        let err = task.train().unwrap_err();

        assert!(matches!(err.downcast_ref::<TaskError>(), Some(TaskError::Checkpoint { .. })));
        // only the validation pass ran; the stale weights were never evaluated
        assert_eq!(probe.seen_weights(), vec![2.0]);
        assert_eq!(saved_weight(dir.path()), 99.0);
    }

    // ── eval ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_eval_without_checkpoint_falls_back() {
        let dir   = tempfile::tempdir().unwrap();
        let probe = Probe::scripted(&[0.33]);
        let mut task = InstanceAttributeRecognitionTask::prepare(
            TaskMode::Test, bundle(dir.path(), 1), &registry(&probe, None, 0),
        )
        .unwrap();

        let TaskReport::Test(report) = task.run().unwrap() else { panic!("expected an eval report") };
        assert!(!report.checkpoint.is_loaded());
        assert_eq!(report.test_map, 0.33);
        assert_eq!(probe.seen_weights(), vec![0.0]);
    }

    #[test]
    fn test_eval_loads_non_strictly_and_reports_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = StateDict::new();
        state.insert("w", ParamTensor::new(vec![1], vec![9.0]).unwrap());
        state.insert("aux.head", ParamTensor::new(vec![2], vec![0.0, 0.0]).unwrap());
        CheckpointManager::new(dir.path(), "Mock").save(&state).unwrap();

        let probe = Probe::scripted(&[0.8]);
        let mut task = InstanceAttributeRecognitionTask::prepare(
            TaskMode::Test, bundle(dir.path(), 1), &registry(&probe, None, 0),
        )
        .unwrap();
        let report = task.eval().unwrap();

        match &report.checkpoint {
            CheckpointStatus::Loaded { report, .. } => {
                assert_eq!(report.unexpected_keys, vec!["aux.head".to_string()]);
                assert!(report.missing_keys.is_empty());
            }
            other => panic!("expected a loaded checkpoint, got {other:?}"),
        }
        assert_eq!(probe.seen_weights(), vec![9.0]);
    }

    #[test]
    fn test_eval_with_incompatible_shapes_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = StateDict::new();
        state.insert("w", ParamTensor::new(vec![2], vec![9.0, 9.0]).unwrap());
        CheckpointManager::new(dir.path(), "Mock").save(&state).unwrap();

        let probe = Probe::scripted(&[0.1]);
        let mut task = InstanceAttributeRecognitionTask::prepare(
            TaskMode::Test, bundle(dir.path(), 1), &registry(&probe, None, 0),
        )
        .unwrap();
        assert!(!task.eval().unwrap().checkpoint.is_loaded());
        assert_eq!(probe.seen_weights(), vec![0.0]);
    }

    // ── end to end with the built-in components ──────────────────────────────

    #[test]
    fn test_synthetic_train_then_test() {
        let dir = tempfile::tempdir().unwrap();
        let settings = SettingsBundle {
            task:     ComponentSettings::new(TASK_NAME)
                .with_option("d_weight", dir.path().to_string_lossy().to_string()),
            model:    ComponentSettings::new(ATTRIBUTE_MLP)
                .with_option("input_dim", 6)
                .with_option("num_attributes", 3)
                .with_option("hidden_dims", serde_json::json!([8]))
                .with_option("lr", 0.01),
            pipeline: ComponentSettings::new(ATTRIBUTE_PIPELINE),
            dataset:  ComponentSettings::new(SYNTHETIC_ATTRIBUTE_DATASET)
                .with_option("feature_dim", 6)
                .with_option("num_attributes", 3)
                .with_option("train_size", 32)
                .with_option("val_size", 16)
                .with_option("test_size", 16),
            eval:     ComponentSettings::new(MEAN_AVERAGE_PRECISION).with_option("batch_size", 8),
            train:    ComponentSettings::new(ATTRIBUTE_TRAIN_EPOCH)
                .with_option("epochs", 2)
                .with_option("batch_size", 8),
        };
        let registry = Registry::with_defaults();

        let mut task = registry.build_task(TaskMode::Train, settings.clone()).unwrap();
        let TaskReport::Train(train) = task.run().unwrap() else { panic!("expected a train report") };
        assert_eq!(train.epochs.len(), 2);
        assert!((0.0..=1.0).contains(&train.test_map));
        assert!(dir.path().join(format!("{DEFAULT_PROJECT}-model-highest.pth")).exists());

        let mut task = registry.build_task(TaskMode::Test, settings).unwrap();
        let TaskReport::Test(eval) = task.run().unwrap() else { panic!("expected an eval report") };
        assert!(eval.checkpoint.is_loaded());
        assert!((eval.test_map - train.test_map).abs() < 1e-6);
    }
}
