// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// File-system side effects of a task run, all rooted in the
// task's `d_weight` directory and keyed by project name:
//
//   checkpoint.rs — best-model weights (safetensors) and the
//                   settings snapshot of the run
//
//   metrics.rs    — per-epoch CSV log (loss, val mAP, lr)

/// Best-checkpoint persistence
pub mod checkpoint;

/// Training metrics CSV logger
pub mod metrics;
