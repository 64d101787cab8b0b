// ============================================================
// Layer 5 - Dataset Evaluation
// ============================================================
// Aggregate loss and score over a whole (or sampled) dataset.
//
// dataset_loss: batches may differ in size (the last one is
// usually short), so each batch mean is weighted by its size:
//
//   loss = Σ (loss_i * size_i) / Σ size_i
//
// Over-long examples are discarded, since a truncated body can
// hide the evidence for its label and make the loss meaningless.
//
// dataset_score: over-long examples are truncated instead, so the
// score covers every example. With a sample limit the last batch
// is cut to fill the limit exactly and no further batch is read.

use anyhow::Result;
use std::time::Instant;

use crate::domain::batch::LengthPolicy;
use crate::domain::stance::Stance;
use crate::domain::traits::{BatchSource, Scorer, StanceModel};
use crate::error::StanceError;

/// Loss per example over every batch of `source`.
pub fn dataset_loss<M, S>(model: &M, source: &S, dataset: &str) -> Result<f64>
where
    M: StanceModel + ?Sized,
    S: BatchSource + ?Sized,
{
    tracing::info!("Calculating {} loss...", dataset);
    let tic = Instant::now();

    let mut weighted_sum = 0.0f64;
    let mut examples     = 0usize;

    for batch in source.batches(LengthPolicy::Discard)? {
        let batch = batch?;
        if batch.is_empty() {
            continue;
        }
        let loss = model.batch_loss(&batch)?;
        weighted_sum += loss * batch.batch_size() as f64;
        examples     += batch.batch_size();
    }

    if examples == 0 {
        return Err(StanceError::EmptyDataset(dataset.to_string()).into());
    }

    tracing::info!(
        "Computed {} loss over {} examples in {:.2} seconds",
        dataset,
        examples,
        tic.elapsed().as_secs_f64()
    );
    Ok(weighted_sum / examples as f64)
}

/// Score predictions on up to `sample_limit` examples (0 = all).
pub fn dataset_score<M, S>(
    model:        &M,
    source:       &S,
    sample_limit: usize,
    scorer:       &dyn Scorer,
    dataset:      &str,
) -> Result<f64>
where
    M: StanceModel + ?Sized,
    S: BatchSource + ?Sized,
{
    let label = if sample_limit == 0 { "all".to_string() } else { sample_limit.to_string() };
    tracing::info!("Calculating score for {} examples in {} set...", label, dataset);
    let tic = Instant::now();

    let mut actual:    Vec<Stance> = Vec::new();
    let mut predicted: Vec<Stance> = Vec::new();

    for batch in source.batches(LengthPolicy::Truncate)? {
        let batch = batch?;
        let preds = model.predict(&batch)?;
        if preds.len() != batch.batch_size() {
            return Err(StanceError::ShapeMismatch {
                what:     "predictions",
                expected: batch.batch_size(),
                got:      preds.len(),
            }
            .into());
        }

        let take = if sample_limit == 0 {
            batch.batch_size()
        } else {
            batch.batch_size().min(sample_limit - actual.len())
        };
        actual.extend_from_slice(&batch.labels[..take]);
        predicted.extend_from_slice(&preds[..take]);

        if sample_limit != 0 && actual.len() >= sample_limit {
            break;
        }
    }

    let score = scorer.score(&actual, &predicted);
    tracing::info!(
        "Scoring {} examples in {} set took {:.2} seconds",
        actual.len(),
        dataset,
        tic.elapsed().as_secs_f64()
    );
    Ok(score)
}
