// ============================================================
// Layer 1 - CLI / Presentation Layer
// ============================================================
// Parses the command line with clap and hands off to Layer 2.
//
//   1. `train` - train (or resume) the stance classifier
//   2. `eval`  - score a saved checkpoint on a data split

pub mod commands;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use commands::{Commands, EvalArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "stance-qa",
    version,
    about = "Train a headline/body stance classifier and evaluate its checkpoints."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Route to the matching use case; nothing is computed here.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args) => run_train(args),
            Commands::Eval(args)  => run_eval(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Training on '{}', writing to '{}'", args.data_dir, args.train_dir);

    let state = TrainUseCase::new(args.into()).execute()?;

    println!("Training complete after {} epochs, {} steps.", state.epoch, state.step);
    if let Some(score) = state.best_score {
        println!("Best dev score: {:.2}", score);
    }
    if let Some(loss) = state.lowest_loss {
        println!("Lowest dev loss: {:.6}", loss);
    }
    Ok(())
}

fn run_eval(args: EvalArgs) -> Result<()> {
    use crate::application::eval_use_case::EvalUseCase;

    let use_case = EvalUseCase::new(
        args.data_dir.map(PathBuf::from),
        PathBuf::from(args.train_dir),
        args.split,
        args.slot.into(),
    );
    let report = use_case.execute()?;
    println!("{}", report);
    Ok(())
}
