#![recursion_limit = "256"]

// stance-qa: headline/body stance classifier with a scheduled
// training loop (smoothed loss, periodic checkpoints, dev
// evaluation and best-by-score / best-by-loss snapshots).
//
//   Layer 1  cli          argument parsing, output
//   Layer 2  application  train / eval workflows
//   Layer 3  domain       stances, batches, scoring, traits
//   Layer 4  data         vocabulary and file batch source
//   Layer 5  ml           burn model, evaluator, trainer
//   Layer 6  infra        checkpoints and scalar summaries

mod cli;
mod application;
mod domain;
mod data;
mod error;
mod ml;
mod infra;

#[cfg(test)]
mod testing;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;

fn main() -> Result<()> {
    // RUST_LOG overrides; stance_qa=info is always added on top
    let filter = EnvFilter::from_default_env().add_directive("stance_qa=info".parse()?);
    tracing_subscriber::fmt().with_env_filter(filter).init();

    Cli::parse().run()
}
