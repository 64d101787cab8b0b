// ============================================================
// Layer 1 - CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `train` and `eval`, and their
// flags. clap's derive macros generate help text, error
// messages for bad values and the string → number conversions.

use clap::{Args, Subcommand, ValueEnum};

use crate::application::train_use_case::TrainConfig;
use crate::infra::checkpoint::Slot;
use crate::ml::model::Reduction;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the stance classifier, resuming from the latest checkpoint if any
    Train(TrainArgs),

    /// Compute loss and score of a saved checkpoint on one split
    Eval(EvalArgs),
}

/// All arguments for the `train` command
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Directory holding <split>.body / .headline / .stance files
    #[arg(long, default_value = "data")]
    pub data_dir: String,

    /// Directory for checkpoints, vocabulary, config and summaries
    #[arg(long, default_value = "experiments/default")]
    pub train_dir: String,

    /// Number of passes over the training data (0 = until stopped)
    #[arg(long, default_value_t = 0)]
    pub epochs: usize,

    #[arg(long, default_value_t = 100)]
    pub batch_size: usize,

    /// Maximum body length in tokens
    #[arg(long, default_value_t = 600)]
    pub context_len: usize,

    /// Maximum headline length in tokens
    #[arg(long, default_value_t = 30)]
    pub question_len: usize,

    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    /// Fraction of activations zeroed during training
    #[arg(long, default_value_t = 0.15)]
    pub dropout: f64,

    /// Clip gradients to this norm
    #[arg(long, default_value_t = 5.0)]
    pub max_gradient_norm: f64,

    /// Steps between progress logs (0 = never)
    #[arg(long, default_value_t = 1)]
    pub print_every: u64,

    /// Steps between latest-checkpoint saves (0 = never)
    #[arg(long, default_value_t = 500)]
    pub save_every: u64,

    /// Steps between dev evaluations (0 = never)
    #[arg(long, default_value_t = 500)]
    pub eval_every: u64,

    /// Latest checkpoints to retain
    #[arg(long, default_value_t = 1)]
    pub keep: usize,

    /// Training examples scored at each evaluation (0 = all)
    #[arg(long, default_value_t = 1000)]
    pub train_score_samples: usize,

    /// Upper bound on vocabulary size, reserved tokens included
    #[arg(long, default_value_t = 50_000)]
    pub vocab_size: usize,

    #[arg(long, default_value_t = 128)]
    pub embedding_size: usize,

    #[arg(long, default_value_t = 200)]
    pub hidden_size: usize,

    /// embedding_size must be divisible by num_heads
    #[arg(long, default_value_t = 4)]
    pub num_heads: usize,

    #[arg(long, default_value_t = 2)]
    pub num_layers: usize,

    /// Inner dimension of the encoder feed-forward network
    #[arg(long, default_value_t = 512)]
    pub d_ff: usize,

    /// How body positions are pooled before classification
    #[arg(long, value_enum, default_value_t = ReductionArg::Mean)]
    pub reduction: ReductionArg,

    /// Seed for weight initialisation and batch shuffling
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            data_dir:            a.data_dir,
            train_dir:           a.train_dir,
            epochs:              a.epochs,
            batch_size:          a.batch_size,
            context_len:         a.context_len,
            question_len:        a.question_len,
            lr:                  a.lr,
            dropout:             a.dropout,
            max_gradient_norm:   a.max_gradient_norm,
            print_every:         a.print_every,
            save_every:          a.save_every,
            eval_every:          a.eval_every,
            keep:                a.keep,
            train_score_samples: a.train_score_samples,
            vocab_size:          a.vocab_size,
            embedding_size:      a.embedding_size,
            hidden_size:         a.hidden_size,
            num_heads:           a.num_heads,
            num_layers:          a.num_layers,
            d_ff:                a.d_ff,
            reduction:           a.reduction.into(),
            seed:                a.seed,
        }
    }
}

/// All arguments for the `eval` command
#[derive(Args, Debug)]
pub struct EvalArgs {
    /// Data directory (defaults to the one used for training)
    #[arg(long)]
    pub data_dir: Option<String>,

    /// Directory the model was trained in
    #[arg(long, default_value = "experiments/default")]
    pub train_dir: String,

    /// Split to evaluate, e.g. dev or test
    #[arg(long, default_value = "dev")]
    pub split: String,

    /// Which checkpoint slot to load
    #[arg(long, value_enum, default_value_t = SlotArg::BestScore)]
    pub slot: SlotArg,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReductionArg {
    Mean,
    Max,
}

impl From<ReductionArg> for Reduction {
    fn from(r: ReductionArg) -> Self {
        match r {
            ReductionArg::Mean => Reduction::Mean,
            ReductionArg::Max  => Reduction::Max,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotArg {
    Latest,
    BestScore,
    BestLoss,
}

impl From<SlotArg> for Slot {
    fn from(s: SlotArg) -> Self {
        match s {
            SlotArg::Latest    => Slot::Latest,
            SlotArg::BestScore => Slot::BestScore,
            SlotArg::BestLoss  => Slot::BestLoss,
        }
    }
}
