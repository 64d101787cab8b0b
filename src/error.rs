// ============================================================
// Typed failures
// ============================================================
// Most functions return anyhow::Result. The variants below are
// the failures callers may want to match on, so they are raised
// as StanceError and recovered with `err.downcast_ref()`.

use thiserror::Error;

use crate::infra::checkpoint::Slot;

#[derive(Error, Debug)]
pub enum StanceError {
    #[error("Shape mismatch in {what}: expected {expected}, got {got}")]
    ShapeMismatch {
        what:     &'static str,
        expected: usize,
        got:      usize,
    },

    #[error("No checkpoint found in slot '{0}'")]
    CheckpointNotFound(Slot),

    #[error("Unknown stance label '{0}'")]
    UnknownStance(String),

    #[error("Dataset '{0}' produced no examples")]
    EmptyDataset(String),

    #[error("Data files for '{split}' are misaligned at line {line}")]
    MisalignedData {
        split: String,
        line:  usize,
    },
}
