// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Persists the best model of a run and the settings it was
// trained with.
//
// File layout inside `d_weight`:
//
//   {project}-model-highest.pth   ← state dict of the best epoch
//   {project}-settings.json       ← settings bundle of the run
//
// The weights file is a safetensors container: every state-dict
// entry becomes a little-endian f32 tensor under its dotted
// name, and the header metadata records the project. Writes go
// to a temp file first and are renamed into place, so a crash
// mid-save never leaves a truncated checkpoint behind.
//
// There is only ever one weights file per project; a new best
// simply overwrites it.

use anyhow::{Context, Result};
use safetensors::{tensor::TensorView, Dtype, SafeTensors};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use crate::domain::{
    error::TaskError,
    settings::SettingsBundle,
    state_dict::{ParamTensor, StateDict},
};

pub struct CheckpointManager {
    dir:     PathBuf,
    project: String,
}

impl CheckpointManager {
    /// Touches nothing on disk; `dir` is created by the first save.
    pub fn new(dir: impl Into<PathBuf>, project: impl Into<String>) -> Self {
        Self { dir: dir.into(), project: project.into() }
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", self.dir.display()))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `{d_weight}/{project}-model-highest.pth`
    pub fn weight_path(&self) -> PathBuf {
        self.dir.join(format!("{}-model-highest.pth", self.project))
    }

    pub fn settings_path(&self) -> PathBuf {
        self.dir.join(format!("{}-settings.json", self.project))
    }

    fn error(&self, msg: impl Into<String>) -> TaskError {
        TaskError::Checkpoint { path: self.weight_path(), msg: msg.into() }
    }

    /// Write `state` to the weights file, replacing any previous one.
    pub fn save(&self, state: &StateDict) -> Result<()> {
        let path = self.weight_path();

        let buffers: Vec<(&str, &[usize], Vec<u8>)> = state
            .iter()
            .map(|(name, tensor)| {
                let bytes = tensor.values().iter().flat_map(|v| v.to_le_bytes()).collect();
                (name, tensor.shape(), bytes)
            })
            .collect();

        let mut views = Vec::with_capacity(buffers.len());
        for (name, shape, bytes) in &buffers {
            let view = TensorView::new(Dtype::F32, shape.to_vec(), bytes)
                .map_err(|e| self.error(format!("tensor '{name}': {e}")))?;
            views.push((*name, view));
        }

        let metadata = Some(HashMap::from([("project".to_string(), self.project.clone())]));
        let encoded  = safetensors::serialize(views, &metadata).map_err(|e| self.error(e.to_string()))?;

        self.ensure_dir()?;
        let tmp = path.with_extension("pth.tmp");
        fs::write(&tmp, &encoded)
            .with_context(|| format!("Cannot write checkpoint to '{}'", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Cannot move checkpoint into '{}'", path.display()))?;

        tracing::debug!("Saved checkpoint '{}' ({} tensors)", path.display(), state.len());
        Ok(())
    }

    /// Read the weights file back into a state dict.
    pub fn load(&self) -> Result<StateDict> {
        let path = self.weight_path();
        if !path.is_file() {
            return Err(self.error("no checkpoint has been saved").into());
        }
        let bytes = fs::read(&path).map_err(|e| self.error(e.to_string()))?;
        let tensors = SafeTensors::deserialize(&bytes).map_err(|e| self.error(e.to_string()))?;

        let mut state = StateDict::new();
        for (name, view) in tensors.tensors() {
            if view.dtype() != Dtype::F32 {
                return Err(self.error(format!("tensor '{name}' has dtype {:?}, expected F32", view.dtype())).into());
            }
            let values = view
                .data()
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect();
            let tensor = ParamTensor::new(view.shape().to_vec(), values)
                .map_err(|e| self.error(format!("tensor '{name}': {e}")))?;
            state.insert(name, tensor);
        }

        tracing::debug!("Loaded checkpoint '{}' ({} tensors)", path.display(), state.len());
        Ok(state)
    }

    /// Snapshot of the settings a run was started with.
    pub fn save_settings(&self, settings: &SettingsBundle) -> Result<()> {
        let path = self.settings_path();
        let json = serde_json::to_string_pretty(settings)?;
        self.ensure_dir()?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write settings to '{}'", path.display()))?;
        tracing::debug!("Saved settings snapshot to '{}'", path.display());
        Ok(())
    }
}
