// ============================================================
// Layer 2 — Application / Tasks
// ============================================================
// Workflow coordination only: this layer resolves components by
// name, wires them together and drives the train / test runs.
//
// Rules for this layer:
//   - No tensor or model code here (that's Layer 5)
//   - No printing (that's Layer 1)
//   - File access only through Layer 6 (checkpoints, metrics)
//
//   registry.rs              — name → factory tables
//   task.rs                  — Task trait, modes, run reports
//   attribute_recognition.rs — InstanceAttributeRecognitionTask

/// Component registry
pub mod registry;

/// Task contract and reports
pub mod task;

/// The instance attribute recognition task
pub mod attribute_recognition;
