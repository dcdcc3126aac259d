// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types and traits shared by every other layer.
//
// Rules for this layer:
//   - NO Burn framework types
//   - NO file I/O apart from reading the settings file
//   - Only structs, enums, and the collaborator traits
//
// The orchestrator in Layer 2 talks to models, datasets,
// pipelines and evaluators exclusively through the traits
// declared in `traits.rs`. Concrete implementations live in
// `data` (Layer 4) and `ml` (Layer 5).

/// Error kinds raised by the task layer
pub mod error;

/// Compute device selection (cpu / gpu:N)
pub mod device;

/// Settings bundle and per-component settings records
pub mod settings;

/// Samples, batches, and the split enum
pub mod sample;

/// Named parameter maps used for checkpoints
pub mod state_dict;

/// Learning-rate carrying optimizer handle
pub mod optimizer;

/// Collaborator traits (model, dataset, pipeline, evaluation, train step)
pub mod traits;
