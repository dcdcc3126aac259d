// ============================================================
// Layer 5 — Attribute MLP
// ============================================================
// Multi-label classifier over instance features:
//
//   features [batch, input_dim]
//       │
//       ▼
//   (Linear → ReLU → Dropout) × len(hidden_dims)
//       │
//       ▼
//   head Linear → logits [batch, num_attributes]
//
// Loss is binary cross-entropy with logits, averaged over the
// supervised label slots only (mask = 1).
//
// MlpAttributeModel wraps the burn module together with its
// optimizer and implements the framework-free AttributeModel
// trait the task layer programs against.

use anyhow::{bail, Result};
use burn::{
    config::Config,
    module::{AutodiffModule, Module, Param},
    nn::{Dropout, DropoutConfig, Linear, LinearConfig},
    optim::{AdamConfig, GradientsParams, Optimizer, SgdConfig},
    tensor::{
        activation::{relu, sigmoid},
        backend::Backend,
        ElementConversion, Tensor, TensorData,
    },
};
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::domain::{
    device::Device,
    error::TaskError,
    optimizer::{OptimizerHandle, OptimizerKind},
    sample::AttributeBatch,
    settings::ComponentSettings,
    state_dict::{reconcile, LoadReport, ParamTensor, StateDict},
    traits::AttributeModel,
};
use crate::ml::{backend_device, BackendDevice, InnerBackend, TrainBackend};

pub const ATTRIBUTE_MLP: &str = "AttributeMlp";

#[derive(Config, Debug)]
pub struct AttributeMlpConfig {
    pub input_dim:      usize,
    pub num_attributes: usize,
    pub hidden_dims:    Vec<usize>,
    #[config(default = 0.1)]
    pub dropout:        f64,
}

impl AttributeMlpConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> AttributeMlp<B> {
        let mut width  = self.input_dim;
        let mut layers = Vec::with_capacity(self.hidden_dims.len());
        for &hidden in &self.hidden_dims {
            layers.push(LinearConfig::new(width, hidden).init(device));
            width = hidden;
        }
        let head    = LinearConfig::new(width, self.num_attributes).init(device);
        let dropout = DropoutConfig::new(self.dropout).init();
        AttributeMlp { layers, head, dropout }
    }
}

#[derive(Module, Debug)]
pub struct AttributeMlp<B: Backend> {
    pub layers:  Vec<Linear<B>>,
    pub head:    Linear<B>,
    pub dropout: Dropout,
}

impl<B: Backend> AttributeMlp<B> {
    /// features: [batch, input_dim] → logits: [batch, num_attributes]
    pub fn forward(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = features;
        for layer in &self.layers {
            x = self.dropout.forward(relu(layer.forward(x)));
        }
        self.head.forward(x)
    }

    /// Parameter names and shapes, in state-dict order.
    pub fn param_shapes(&self) -> Vec<(String, Vec<usize>)> {
        let mut shapes = Vec::new();
        for (i, layer) in self.layers.iter().enumerate() {
            linear_shapes(&format!("layers.{i}"), layer, &mut shapes);
        }
        linear_shapes("head", &self.head, &mut shapes);
        shapes
    }
}

fn linear_shapes<B: Backend>(prefix: &str, linear: &Linear<B>, out: &mut Vec<(String, Vec<usize>)>) {
    out.push((format!("{prefix}.weight"), linear.weight.val().dims().to_vec()));
    if let Some(bias) = &linear.bias {
        out.push((format!("{prefix}.bias"), bias.val().dims().to_vec()));
    }
}

/// Mean BCE-with-logits over the slots where `mask` is 1.
///
/// Uses the stable form max(x, 0) - x·y + ln(1 + e^{-|x|}).
pub fn masked_bce_with_logits<B: Backend>(
    logits:  Tensor<B, 2>,
    targets: Tensor<B, 2>,
    mask:    Tensor<B, 2>,
) -> Tensor<B, 1> {
    let per_slot = relu(logits.clone()) - logits.clone() * targets + logits.abs().neg().exp().log1p();
    (per_slot * mask.clone()).sum() / mask.sum().clamp_min(1.0)
}

// ─── State dict conversion ────────────────────────────────────────────────────

fn to_param<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<ParamTensor> {
    let shape  = tensor.dims().to_vec();
    let values = tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("cannot read tensor data: {e:?}"))?;
    Ok(ParamTensor::new(shape, values)?)
}

fn from_param<B: Backend, const D: usize>(param: ParamTensor, device: &B::Device) -> Tensor<B, D> {
    let shape = param.shape().to_vec();
    Tensor::from_data(TensorData::new(param.into_values(), shape), device)
}

fn linear_state<B: Backend>(prefix: &str, linear: &Linear<B>, out: &mut StateDict) -> Result<()> {
    out.insert(format!("{prefix}.weight"), to_param(linear.weight.val())?);
    if let Some(bias) = &linear.bias {
        out.insert(format!("{prefix}.bias"), to_param(bias.val())?);
    }
    Ok(())
}

fn replace_linear<B: Backend>(
    prefix:  &str,
    linear:  &mut Linear<B>,
    matched: &mut BTreeMap<String, ParamTensor>,
    device:  &B::Device,
) {
    if let Some(weight) = matched.remove(&format!("{prefix}.weight")) {
        linear.weight = Param::from_tensor(from_param::<B, 2>(weight, device).require_grad());
    }
    if let Some(bias) = matched.remove(&format!("{prefix}.bias")) {
        linear.bias = Some(Param::from_tensor(from_param::<B, 1>(bias, device).require_grad()));
    }
}

// ─── MlpAttributeModel ────────────────────────────────────────────────────────

pub struct MlpAttributeModel<O> {
    config:     AttributeMlpConfig,
    model:      AttributeMlp<TrainBackend>,
    optim:      O,
    make_optim: fn() -> O,
    kind:       OptimizerKind,
    lr:         f64,
    device:     BackendDevice,
    amp_warned: bool,
}

impl<O> MlpAttributeModel<O>
where
    O: Optimizer<AttributeMlp<TrainBackend>, TrainBackend>,
{
    pub fn new(
        config:     AttributeMlpConfig,
        device:     &Device,
        kind:       OptimizerKind,
        lr:         f64,
        make_optim: fn() -> O,
    ) -> Self {
        let device = backend_device(device);
        let model  = config.init::<TrainBackend>(&device);
        Self { config, model, optim: make_optim(), make_optim, kind, lr, device, amp_warned: false }
    }

    fn check_batch(&self, batch: &AttributeBatch) -> Result<()> {
        if batch.feature_dim != self.config.input_dim {
            bail!(
                "batch has {} features per instance, model expects {}",
                batch.feature_dim,
                self.config.input_dim
            );
        }
        Ok(())
    }

    fn features<B: Backend>(&self, batch: &AttributeBatch) -> Tensor<B, 2>
    where
        B: Backend<Device = BackendDevice>,
    {
        Tensor::from_data(
            TensorData::new(batch.features.clone(), [batch.len(), batch.feature_dim]),
            &self.device,
        )
    }

    fn label_tensor(&self, values: &[f32], batch: &AttributeBatch) -> Tensor<TrainBackend, 2> {
        Tensor::from_data(
            TensorData::new(values.to_vec(), [batch.len(), batch.num_attributes]),
            &self.device,
        )
    }
}

impl<O> AttributeModel for MlpAttributeModel<O>
where
    O: Optimizer<AttributeMlp<TrainBackend>, TrainBackend> + 'static,
{
    fn num_attributes(&self) -> usize {
        self.config.num_attributes
    }

    fn optimizer(&mut self) -> OptimizerHandle {
        self.optim = (self.make_optim)();
        OptimizerHandle::new(self.kind, self.lr)
    }

    fn train_step(&mut self, batch: &AttributeBatch, optimizer: &OptimizerHandle, amp: bool) -> Result<f32> {
        if batch.is_empty() {
            return Ok(0.0);
        }
        self.check_batch(batch)?;
        if batch.num_attributes != self.config.num_attributes {
            bail!(
                "batch has {} attributes, model predicts {}",
                batch.num_attributes,
                self.config.num_attributes
            );
        }
        if amp && !self.amp_warned {
            tracing::warn!("Mixed precision is not available on this backend; training in f32");
            self.amp_warned = true;
        }

        let logits  = self.model.forward(self.features::<TrainBackend>(batch));
        let targets = self.label_tensor(&batch.targets, batch);
        let mask    = self.label_tensor(&batch.mask, batch);
        let loss    = masked_bce_with_logits(logits, targets, mask);

        let loss_value = loss.clone().into_scalar().elem::<f32>();
        let grads = GradientsParams::from_grads(loss.backward(), &self.model);
        self.model = self.optim.step(optimizer.learning_rate(), self.model.clone(), grads);
        Ok(loss_value)
    }

    fn predict(&self, batch: &AttributeBatch) -> Result<Vec<f32>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        self.check_batch(batch)?;
        // valid() drops autodiff and disables dropout
        let model  = self.model.valid();
        let probs  = sigmoid(model.forward(self.features::<InnerBackend>(batch)));
        probs
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| anyhow::anyhow!("cannot read predictions: {e:?}"))
    }

    fn state_dict(&self) -> Result<StateDict> {
        let mut state = StateDict::new();
        for (i, layer) in self.model.layers.iter().enumerate() {
            linear_state(&format!("layers.{i}"), layer, &mut state)?;
        }
        linear_state("head", &self.model.head, &mut state)?;
        Ok(state)
    }

    fn load_state_dict(&mut self, state: StateDict, strict: bool) -> Result<LoadReport> {
        let (mut matched, report) = reconcile(&self.model.param_shapes(), state, strict)?;
        for (i, layer) in self.model.layers.iter_mut().enumerate() {
            replace_linear(&format!("layers.{i}"), layer, &mut matched, &self.device);
        }
        replace_linear("head", &mut self.model.head, &mut matched, &self.device);
        Ok(report)
    }

    fn to_device(&mut self, device: &Device) -> Result<()> {
        self.device = backend_device(device);
        self.model  = self.model.clone().to_device(&self.device);
        // optimizer moments live on the old device
        self.optim  = (self.make_optim)();
        Ok(())
    }
}

// ─── Registry entry ───────────────────────────────────────────────────────────

fn default_hidden_dims() -> Vec<usize> {
    vec![128]
}

fn default_dropout() -> f64 {
    0.1
}

fn default_lr() -> f64 {
    1e-3
}

#[derive(Debug, Clone, Deserialize)]
pub struct MlpSettings {
    pub input_dim:      usize,
    pub num_attributes: usize,
    #[serde(default = "default_hidden_dims")]
    pub hidden_dims:    Vec<usize>,
    #[serde(default = "default_dropout")]
    pub dropout:        f64,
    #[serde(default)]
    pub optimizer:      OptimizerKind,
    #[serde(default = "default_lr")]
    pub lr:             f64,
}

/// Registry entry for `AttributeMlp`.
pub fn attribute_mlp(settings: &ComponentSettings, device: &Device) -> Result<Box<dyn AttributeModel>> {
    let cfg: MlpSettings = settings.parse()?;
    if cfg.input_dim == 0 || cfg.num_attributes == 0 {
        return Err(TaskError::InvalidConfig("input_dim and num_attributes must be positive".into()).into());
    }
    if !(cfg.lr > 0.0) {
        return Err(TaskError::InvalidConfig(format!("lr must be positive, got {}", cfg.lr)).into());
    }

    let config = AttributeMlpConfig::new(cfg.input_dim, cfg.num_attributes, cfg.hidden_dims.clone())
        .with_dropout(cfg.dropout);
    tracing::info!(
        "Model ready: AttributeMlp {} → {:?} → {} ({:?}, lr={})",
        cfg.input_dim, cfg.hidden_dims, cfg.num_attributes, cfg.optimizer, cfg.lr
    );

    let model: Box<dyn AttributeModel> = match cfg.optimizer {
        OptimizerKind::Adam => Box::new(MlpAttributeModel::new(
            config, device, cfg.optimizer, cfg.lr, || AdamConfig::new().init(),
        )),
        OptimizerKind::Sgd => Box::new(MlpAttributeModel::new(
            config, device, cfg.optimizer, cfg.lr, || SgdConfig::new().init(),
        )),
    };
    Ok(model)
}
