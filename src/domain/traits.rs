// ============================================================
// Layer 3 - Core Traits (Abstractions)
// ============================================================
// The training loop, the evaluator and the checkpoint logic are
// written against these traits only:
//
//   BatchSource  - where batches come from (files, memory)
//   StanceModel  - the differentiable model (burn, or a test double)
//   Scorer       - how predictions are graded
//   ScalarSink   - where scalar time series are written
//
// Nothing here knows about burn or the filesystem.

use anyhow::Result;

use crate::domain::batch::{Batch, LengthPolicy};
use crate::domain::stance::Stance;

/// Boxed iterator over the batches of one pass through a dataset
pub type BatchIter<'a> = Box<dyn Iterator<Item = Result<Batch>> + 'a>;

// ─── BatchSource ──────────────────────────────────────────────────────────────
/// A lazy, restartable sequence of batches.
///
/// Every call to `batches` starts a fresh pass from the beginning,
/// so the same source serves every epoch and every evaluation.
pub trait BatchSource {
    fn batches(&self, policy: LengthPolicy) -> Result<BatchIter<'_>>;
}

// ─── StanceModel ──────────────────────────────────────────────────────────────
/// Statistics reported by one optimisation step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome {
    /// Mean loss over the batch, before the update
    pub loss:      f64,
    /// Global L2 norm of the gradients, before clipping
    pub grad_norm: f64,
    /// Global L2 norm of the parameters, after the update
    pub param_norm: f64,
}

pub trait StanceModel {
    /// Forward + backward pass and one optimiser update.
    fn train_step(&mut self, batch: &Batch) -> Result<StepOutcome>;

    /// Forward pass only, no dropout. Mean loss over the batch.
    fn batch_loss(&self, batch: &Batch) -> Result<f64>;

    /// Most likely stance for every row of the batch.
    fn predict(&self, batch: &Batch) -> Result<Vec<Stance>>;

    /// Serialised snapshot of every parameter.
    fn parameters(&self) -> Result<Vec<u8>>;

    /// Restore a snapshot produced by `parameters`.
    fn load_parameters(&mut self, bytes: Vec<u8>) -> Result<()>;

    /// Number of trainable scalars
    fn num_params(&self) -> usize;
}

// ─── Scorer ───────────────────────────────────────────────────────────────────
/// Grades predicted labels against the gold labels.
pub trait Scorer {
    fn score(&self, actual: &[Stance], predicted: &[Stance]) -> f64;
}

// ─── ScalarSink ───────────────────────────────────────────────────────────────
/// Monitoring sink for named scalar series.
///
/// Writes may be buffered; `flush` makes them durable.
pub trait ScalarSink {
    fn write_scalar(&mut self, tag: &str, value: f64, step: u64) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
