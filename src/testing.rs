// Test doubles shared by the unit tests of several layers.

use anyhow::Result;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use crate::domain::batch::{Batch, LengthPolicy};
use crate::domain::stance::Stance;
use crate::domain::traits::{BatchIter, BatchSource, ScalarSink, Scorer, StanceModel, StepOutcome};

/// A valid batch of `n` rows with labels cycling through every stance
pub fn batch_of(n: usize) -> Batch {
    let labels = (0..n).map(|i| Stance::ALL[i % Stance::COUNT]).collect();
    Batch::new(
        vec![vec![2, 3]; n],
        vec![vec![1, 1]; n],
        vec![vec![4]; n],
        vec![vec![1]; n],
        labels,
    )
    .expect("test batch is well formed")
}

// ─── VecSource ────────────────────────────────────────────────────────────────
/// In-memory source that counts how many batches were pulled
pub struct VecSource {
    batches:  Vec<Batch>,
    pulled:   Cell<usize>,
    policies: RefCell<Vec<LengthPolicy>>,
}

impl VecSource {
    pub fn new(batches: Vec<Batch>) -> Self {
        Self { batches, pulled: Cell::new(0), policies: RefCell::new(Vec::new()) }
    }

    pub fn pulled(&self) -> usize {
        self.pulled.get()
    }

    pub fn policies(&self) -> Vec<LengthPolicy> {
        self.policies.borrow().clone()
    }
}

impl BatchSource for VecSource {
    fn batches(&self, policy: LengthPolicy) -> Result<BatchIter<'_>> {
        self.policies.borrow_mut().push(policy);
        Ok(Box::new(self.batches.iter().map(move |b| {
            self.pulled.set(self.pulled.get() + 1);
            Ok(b.clone())
        })))
    }
}

// ─── ScriptedModel ────────────────────────────────────────────────────────────
/// Returns scripted losses (1.0 once the script runs out) and
/// predicts the gold labels. Its "parameters" are the number of
/// train steps taken, so a checkpoint reveals when it was written.
#[derive(Default)]
pub struct ScriptedModel {
    train_losses: VecDeque<f64>,
    eval_losses:  RefCell<VecDeque<f64>>,
    missing_predictions: usize,
    pub steps_taken: u64,
    pub loaded:      Option<Vec<u8>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_train_losses(mut self, losses: Vec<f64>) -> Self {
        self.train_losses = losses.into();
        self
    }

    pub fn with_eval_losses(self, losses: Vec<f64>) -> Self {
        *self.eval_losses.borrow_mut() = losses.into();
        self
    }

    /// Drop the last `n` predictions of every batch
    pub fn with_missing_predictions(mut self, n: usize) -> Self {
        self.missing_predictions = n;
        self
    }
}

pub fn step_of(parameters: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&parameters[..8]);
    u64::from_le_bytes(bytes)
}

impl StanceModel for ScriptedModel {
    fn train_step(&mut self, _batch: &Batch) -> Result<StepOutcome> {
        self.steps_taken += 1;
        let loss = self.train_losses.pop_front().unwrap_or(1.0);
        Ok(StepOutcome { loss, grad_norm: 0.5, param_norm: 10.0 })
    }

    fn batch_loss(&self, _batch: &Batch) -> Result<f64> {
        Ok(self.eval_losses.borrow_mut().pop_front().unwrap_or(1.0))
    }

    fn predict(&self, batch: &Batch) -> Result<Vec<Stance>> {
        let keep = batch.labels.len().saturating_sub(self.missing_predictions);
        Ok(batch.labels[..keep].to_vec())
    }

    fn parameters(&self) -> Result<Vec<u8>> {
        Ok(self.steps_taken.to_le_bytes().to_vec())
    }

    fn load_parameters(&mut self, bytes: Vec<u8>) -> Result<()> {
        self.steps_taken = step_of(&bytes);
        self.loaded = Some(bytes);
        Ok(())
    }

    fn num_params(&self) -> usize {
        42
    }
}

// ─── RecordingScorer ──────────────────────────────────────────────────────────
/// Counts the pairs it is given and returns scripted scores (0.0 once exhausted)
#[derive(Default)]
pub struct RecordingScorer {
    scores: RefCell<VecDeque<f64>>,
    seen:   Cell<usize>,
}

impl RecordingScorer {
    pub fn with_scores(scores: Vec<f64>) -> Self {
        Self { scores: RefCell::new(scores.into()), seen: Cell::new(0) }
    }

    /// Pairs passed to the most recent call
    pub fn seen(&self) -> usize {
        self.seen.get()
    }
}

impl Scorer for RecordingScorer {
    fn score(&self, actual: &[Stance], predicted: &[Stance]) -> f64 {
        assert_eq!(actual.len(), predicted.len());
        self.seen.set(actual.len());
        self.scores.borrow_mut().pop_front().unwrap_or(0.0)
    }
}

// ─── RecordingSink ────────────────────────────────────────────────────────────
#[derive(Default)]
pub struct RecordingSink {
    pub rows:    Vec<(String, f64, u64)>,
    pub flushes: usize,
}

impl RecordingSink {
    pub fn values(&self, tag: &str) -> Vec<(u64, f64)> {
        self.rows
            .iter()
            .filter(|(t, _, _)| t == tag)
            .map(|(_, v, s)| (*s, *v))
            .collect()
    }
}

impl ScalarSink for RecordingSink {
    fn write_scalar(&mut self, tag: &str, value: f64, step: u64) -> Result<()> {
        self.rows.push((tag.to_string(), value, step));
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.flushes += 1;
        Ok(())
    }
}
