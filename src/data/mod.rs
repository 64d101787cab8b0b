// ============================================================
// Layer 4 - Data Pipeline
// ============================================================
// Everything between the text files on disk and a padded Batch:
//
//   <split>.body / .headline / .stance
//       │
//       ▼
//   Vocabulary        → lowercases, splits, maps words to ids
//       │
//       ▼
//   FileBatchSource   → reads lazily, discards or truncates long
//       │               examples, pads, groups into batches
//       ▼
//   Batch             → consumed by the trainer / evaluator
//
// Reference: Rust Book §13 (Iterators and Closures)

/// Word → id mapping, built from the training corpus
pub mod vocab;

/// Lazy, restartable batches from line-aligned text files
pub mod batcher;
