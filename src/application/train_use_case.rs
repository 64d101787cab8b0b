// ============================================================
// Layer 2 - TrainUseCase
// ============================================================
// Orchestrates a training run in order:
//
//   Step 1: Load or build the vocabulary   (Layer 4 - data)
//   Step 2: Open train / dev batch sources (Layer 4 - data)
//   Step 3: Save config                    (Layer 6 - infra)
//   Step 4: Build the model                (Layer 5 - ml)
//   Step 5: Resume from the latest slot    (Layer 5 - ml)
//   Step 6: Run the training loop          (Layer 5 - ml)
//
// Reference: Burn Book §5 (Training)

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, sync::Arc};

use crate::data::{
    batcher::{BatchShape, FileBatchSource},
    vocab::Vocabulary,
};
use crate::domain::score::FncScorer;
use crate::infra::{checkpoint::CheckpointManager, metrics::CsvScalarSink};
use crate::ml::{
    learner::OptimSettings,
    model::{Reduction, StanceClassifierConfig},
    trainer::{Schedule, Trainer, TrainingState},
};

pub const TRAIN_SPLIT: &str = "train";
pub const DEV_SPLIT:   &str = "dev";

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a training run. Saved next to the
// checkpoints so `eval` can rebuild the same architecture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub data_dir:            String,
    pub train_dir:           String,
    /// 0 = train until stopped
    pub epochs:              usize,
    pub batch_size:          usize,
    pub context_len:         usize,
    pub question_len:        usize,
    pub lr:                  f64,
    pub dropout:             f64,
    pub max_gradient_norm:   f64,
    pub print_every:         u64,
    pub save_every:          u64,
    pub eval_every:          u64,
    pub keep:                usize,
    pub train_score_samples: usize,
    pub vocab_size:          usize,
    pub embedding_size:      usize,
    pub hidden_size:         usize,
    pub num_heads:           usize,
    pub num_layers:          usize,
    pub d_ff:                usize,
    pub reduction:           Reduction,
    pub seed:                u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_dir:            "data".to_string(),
            train_dir:           "experiments/default".to_string(),
            epochs:              0,
            batch_size:          100,
            context_len:         600,
            question_len:        30,
            lr:                  1e-3,
            dropout:             0.15,
            max_gradient_norm:   5.0,
            print_every:         1,
            save_every:          500,
            eval_every:          500,
            keep:                1,
            train_score_samples: 1000,
            vocab_size:          50_000,
            embedding_size:      128,
            hidden_size:         200,
            num_heads:           4,
            num_layers:          2,
            d_ff:                512,
            reduction:           Reduction::Mean,
            seed:                42,
        }
    }
}

impl TrainConfig {
    /// Reject settings the model or the batcher cannot run with,
    /// before any file is written.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.batch_size > 0, "batch_size must be at least 1");
        ensure!(
            self.context_len > 0 && self.question_len > 0,
            "context_len and question_len must be at least 1"
        );
        ensure!(self.num_heads > 0, "num_heads must be at least 1");
        ensure!(
            self.embedding_size % self.num_heads == 0,
            "embedding_size ({}) must be divisible by num_heads ({})",
            self.embedding_size,
            self.num_heads
        );
        Ok(())
    }

    pub fn shape(&self) -> BatchShape {
        BatchShape {
            batch_size:   self.batch_size,
            context_len:  self.context_len,
            question_len: self.question_len,
        }
    }

    /// Architecture for a vocabulary of `vocab_len` words. Headline and
    /// body share the position embedding, so it covers the longer one.
    pub fn model_config(&self, vocab_len: usize) -> Result<StanceClassifierConfig> {
        self.validate()?;
        Ok(StanceClassifierConfig::new(
            vocab_len,
            self.context_len.max(self.question_len),
            self.embedding_size,
            self.hidden_size,
            self.num_heads,
            self.num_layers,
            self.d_ff,
        )
        .with_dropout(self.dropout))
    }

    pub fn optim_settings(&self) -> OptimSettings {
        OptimSettings {
            learning_rate:     self.lr,
            max_gradient_norm: self.max_gradient_norm,
        }
    }

    pub fn schedule(&self) -> Schedule {
        Schedule {
            num_epochs:          self.epochs,
            print_every:         self.print_every,
            save_every:          self.save_every,
            eval_every:          self.eval_every,
            train_score_samples: self.train_score_samples,
        }
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<TrainingState> {
        let cfg       = &self.config;
        let train_dir = Path::new(&cfg.train_dir);
        cfg.validate()?;

        // ── Step 1: Vocabulary ────────────────────────────────────────────────
        // Built from the training split only, then reused on every resume
        let [body, headline] = FileBatchSource::text_files(&cfg.data_dir, TRAIN_SPLIT);
        let vocab = Arc::new(Vocabulary::load_or_build(train_dir, &[body.as_path(), headline.as_path()], cfg.vocab_size)?);

        // ── Step 2: Batch sources ─────────────────────────────────────────────
        // Training batches are length-sorted and shuffled, dev keeps file order
        let train_source = FileBatchSource::new(&cfg.data_dir, TRAIN_SPLIT, vocab.clone(), cfg.shape())
            .with_shuffle(cfg.seed);
        let dev_source   = FileBatchSource::new(&cfg.data_dir, DEV_SPLIT, vocab.clone(), cfg.shape());

        // ── Step 3: Persist config ────────────────────────────────────────────
        let checkpoints = CheckpointManager::new(train_dir, cfg.keep)?;
        checkpoints.save_config(cfg)?;

        // ── Step 4: Model ─────────────────────────────────────────────────────
        let model = crate::ml::learner::wgpu_stance_model(
            &cfg.model_config(vocab.len())?,
            cfg.optim_settings(),
            cfg.reduction,
            cfg.seed,
        );

        // ── Step 5 + 6: Resume, then train ────────────────────────────────────
        let sink = CsvScalarSink::new(train_dir)?;
        tracing::info!("Writing summaries to '{}'", sink.csv_path().display());

        let mut trainer = Trainer::new(model, cfg.schedule(), checkpoints, sink, Box::new(FncScorer));
        trainer.resume()?;
        trainer.train(&train_source, &dev_source)
    }
}
