// ============================================================
// Layer 2 - EvalUseCase
// ============================================================
// Scores a saved checkpoint on one data split:
//
//   Step 1: Load the training config   (Layer 6 - infra)
//   Step 2: Load the vocabulary        (Layer 4 - data)
//   Step 3: Rebuild the architecture   (Layer 5 - ml)
//   Step 4: Load the requested slot    (Layer 6 - infra)
//   Step 5: Dataset loss and score     (Layer 5 - ml)

use anyhow::Result;
use std::{fmt, path::PathBuf, sync::Arc};

use crate::data::{batcher::FileBatchSource, vocab::Vocabulary};
use crate::domain::score::FncScorer;
use crate::domain::traits::{BatchSource, StanceModel};
use crate::infra::checkpoint::{CheckpointManager, Slot};
use crate::ml::evaluator::{dataset_loss, dataset_score};

/// Result of evaluating one checkpoint on one split
#[derive(Debug, Clone, PartialEq)]
pub struct EvalReport {
    pub split: String,
    pub slot:  Slot,
    pub step:  u64,
    pub loss:  f64,
    pub score: f64,
}

impl fmt::Display for EvalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} checkpoint (step {}) on '{}': loss {:.6}, score {:.2}",
            self.slot, self.step, self.split, self.loss, self.score
        )
    }
}

pub struct EvalUseCase {
    data_dir:  Option<PathBuf>,
    train_dir: PathBuf,
    split:     String,
    slot:      Slot,
}

impl EvalUseCase {
    /// `data_dir` of None reuses the directory the model was trained on
    pub fn new(data_dir: Option<PathBuf>, train_dir: PathBuf, split: String, slot: Slot) -> Self {
        Self { data_dir, train_dir, split, slot }
    }

    pub fn execute(&self) -> Result<EvalReport> {
        // ── Step 1 + 2: Config and vocabulary from the training run ───────────
        // open, not new: a mistyped --train-dir must not create directories
        let checkpoints = CheckpointManager::open(&self.train_dir, 1)?;
        let cfg   = checkpoints.load_config()?;
        let vocab = Arc::new(Vocabulary::load(&self.train_dir)?);

        let data_dir = self.data_dir.clone().unwrap_or_else(|| PathBuf::from(&cfg.data_dir));
        let source   = FileBatchSource::new(&data_dir, self.split.as_str(), vocab.clone(), cfg.shape());

        // ── Step 3: Same architecture the weights were trained with ───────────
        let mut model = crate::ml::learner::wgpu_stance_model(
            &cfg.model_config(vocab.len())?,
            cfg.optim_settings(),
            cfg.reduction,
            cfg.seed,
        );

        evaluate_slot(&mut model, &checkpoints, self.slot, &source)
    }
}

/// Load `slot` into `model` and compute loss and score over `source`.
pub fn evaluate_slot<M, S>(
    model:       &mut M,
    checkpoints: &CheckpointManager,
    slot:        Slot,
    source:      &S,
) -> Result<EvalReport>
where
    M: StanceModel + ?Sized,
    S: EvalSplit + ?Sized,
{
    let ckpt = checkpoints.load(slot)?;
    model.load_parameters(ckpt.parameters)?;

    let name  = source.split_name();
    let loss  = dataset_loss(model, source, name)?;
    let score = dataset_score(model, source, 0, &FncScorer, name)?;

    Ok(EvalReport { split: name.to_string(), slot, step: ckpt.step, loss, score })
}

/// A batch source that knows which split it reads
pub trait EvalSplit: BatchSource {
    fn split_name(&self) -> &str;
}

impl EvalSplit for FileBatchSource {
    fn split_name(&self) -> &str {
        self.split()
    }
}
