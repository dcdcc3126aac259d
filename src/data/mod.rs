// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between annotation files and host-side batches:
//
//   annotations / synthetic generator
//       │
//       ▼
//   dataset   (per split, applies its transform pipeline)
//       │
//       ▼
//   batcher   (dataset collation, or the default StackBatcher)
//       │
//       ▼
//   loader    (Burn DataLoader: batch size, shuffle, workers)
//
// Nothing here knows about tensors; the model layer converts
// batches on its own device.

/// Feature transforms and the train / evalu pipelines
pub mod pipeline;

/// JSON-lines and synthetic attribute datasets
pub mod dataset;

/// Collation strategies and the Burn Batcher adapter
pub mod batcher;

/// Per-split loaders built on Burn's DataLoader
pub mod loader;
