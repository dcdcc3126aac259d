// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// The only layer that imports burn tensors and modules.
//
//   model.rs      — AttributeMlp: hidden Linear layers + a
//                   per-attribute logit head, trained with masked
//                   binary cross-entropy; exposes its parameters
//                   as a state dict for checkpointing
//
//   trainer.rs    — AttributeTrainEpoch: one pass over the train
//                   loader, one optimizer step per batch
//
//   evaluation.rs — MeanAveragePrecision over a loader pass
//
//   scheduler.rs  — plateau learning-rate scheduler driven by the
//                   validation mAP
//
// Backend: Autodiff<NdArray> by default; the `wgpu` feature
// switches to Autodiff<Wgpu>.

use crate::domain::device::Device;

/// Attribute classifier and its burn module
pub mod model;

/// Default train-step utility
pub mod trainer;

/// mAP evaluation
pub mod evaluation;

/// Reduce-on-plateau learning-rate scheduler
pub mod scheduler;

#[cfg(not(feature = "wgpu"))]
pub type InnerBackend = burn::backend::NdArray;
#[cfg(feature = "wgpu")]
pub type InnerBackend = burn::backend::Wgpu;

pub type TrainBackend = burn::backend::Autodiff<InnerBackend>;

pub type BackendDevice = <InnerBackend as burn::tensor::backend::Backend>::Device;

/// Map the configured device onto the compiled backend.
#[cfg(not(feature = "wgpu"))]
pub fn backend_device(device: &Device) -> BackendDevice {
    if device.is_gpu() {
        tracing::warn!("Device {} requested but attrec was built without `wgpu`; using cpu", device);
    }
    burn::backend::ndarray::NdArrayDevice::Cpu
}

#[cfg(feature = "wgpu")]
pub fn backend_device(device: &Device) -> BackendDevice {
    use burn::backend::wgpu::WgpuDevice;
    match device {
        Device::Cpu    => WgpuDevice::Cpu,
        Device::Gpu(i) => WgpuDevice::DiscreteGpu(*i),
    }
}
