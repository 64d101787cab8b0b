// ============================================================
// Layer 6 - Infrastructure Layer
// ============================================================
// Filesystem-facing concerns shared by training and evaluation:
//
//   checkpoint.rs - Parameter snapshots in three retention slots
//                   (latest / best score / best loss), plus the
//                   TrainConfig JSON needed to rebuild the model.
//
//   metrics.rs    - The monitoring sink. Scalar series are
//                   appended to a CSV file for plotting learning
//                   curves after (or during) a run.
//
// Both are reached only through the application and ml layers;
// the domain layer never touches the disk.

/// Slotted checkpoint persistence with bounded retention
pub mod checkpoint;

/// CSV-backed scalar summary writer
pub mod metrics;
