// ============================================================
// Layer 3 - Batch Domain Type
// ============================================================
// A group of aligned (body, headline, stance) examples, already
// mapped to token ids and padded to a fixed width.
//
//   body_ids / body_mask:         [batch_size, context_len]
//   headline_ids / headline_mask: [batch_size, question_len]
//   labels:                       [batch_size]
//
// Mask values: 1 = real token, 0 = padding.
// A Batch is produced by a BatchSource and consumed once.

use anyhow::Result;

use crate::domain::stance::Stance;
use crate::error::StanceError;

/// Whether over-long examples are dropped or cut down to size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthPolicy {
    /// Skip examples longer than the configured maxima.
    /// Used for training and loss so a cut-off example never
    /// contributes a misleading loss.
    Discard,
    /// Keep every example, truncating to the maxima.
    /// Used for scoring so the whole dataset is covered.
    Truncate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub body_ids:      Vec<Vec<u32>>,
    pub body_mask:     Vec<Vec<u32>>,
    pub headline_ids:  Vec<Vec<u32>>,
    pub headline_mask: Vec<Vec<u32>>,
    pub labels:        Vec<Stance>,
    batch_size:        usize,
}

impl Batch {
    /// Build a batch, checking that every matrix is rectangular and
    /// that all of them agree on the number of rows.
    pub fn new(
        body_ids:      Vec<Vec<u32>>,
        body_mask:     Vec<Vec<u32>>,
        headline_ids:  Vec<Vec<u32>>,
        headline_mask: Vec<Vec<u32>>,
        labels:        Vec<Stance>,
    ) -> Result<Self> {
        let rows = labels.len();
        check_rows("body_ids", &body_ids, rows)?;
        check_rows("body_mask", &body_mask, rows)?;
        check_rows("headline_ids", &headline_ids, rows)?;
        check_rows("headline_mask", &headline_mask, rows)?;

        let context_len  = body_ids.first().map_or(0, Vec::len);
        let question_len = headline_ids.first().map_or(0, Vec::len);
        check_width("body_ids", &body_ids, context_len)?;
        check_width("body_mask", &body_mask, context_len)?;
        check_width("headline_ids", &headline_ids, question_len)?;
        check_width("headline_mask", &headline_mask, question_len)?;

        Ok(Self {
            body_ids,
            body_mask,
            headline_ids,
            headline_mask,
            labels,
            batch_size: rows,
        })
    }

    /// Number of real examples in this batch
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn is_empty(&self) -> bool {
        self.batch_size == 0
    }

    pub fn context_len(&self) -> usize {
        self.body_ids.first().map_or(0, Vec::len)
    }

    pub fn question_len(&self) -> usize {
        self.headline_ids.first().map_or(0, Vec::len)
    }
}

fn check_rows(what: &'static str, m: &[Vec<u32>], rows: usize) -> Result<()> {
    if m.len() != rows {
        return Err(StanceError::ShapeMismatch { what, expected: rows, got: m.len() }.into());
    }
    Ok(())
}

fn check_width(what: &'static str, m: &[Vec<u32>], width: usize) -> Result<()> {
    if let Some(row) = m.iter().find(|row| row.len() != width) {
        return Err(StanceError::ShapeMismatch { what, expected: width, got: row.len() }.into());
    }
    Ok(())
}
