// ============================================================
// Layer 3 - Domain Layer
// ============================================================
// Plain Rust structs, enums and traits that define the core
// concepts of the system.
//
// Rules for this layer:
//   - NO burn types
//   - NO file I/O
//   - Only data types, traits and pure functions
//
// Everything that trains, evaluates or checkpoints is written
// against the traits declared here, which keeps the scheduling
// logic testable without a GPU or a dataset on disk.

// The four stance classes
pub mod stance;

// Padded, aligned batches of examples
pub mod batch;

// Weighted stance score and confusion matrix
pub mod score;

// Core abstractions (traits) that other layers implement
pub mod traits;
