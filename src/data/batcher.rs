// ============================================================
// Layer 4 - File Batch Source
// ============================================================
// Reads a dataset split from three line-aligned text files:
//
//   <data_dir>/<split>.body      article body tokens, one example per line
//   <data_dir>/<split>.headline  headline tokens, one example per line
//   <data_dir>/<split>.stance    label index (0-3) or name, one per line
//
// and turns it into padded Batches.
//
// Reading is lazy: examples are pulled from the files in chunks
// of batch_size * REFILL_BATCHES, so a pass never holds the whole
// dataset in memory. Each call to batches() reopens the files,
// which is what makes the source restartable.
//
// When shuffling is enabled (training) each chunk is sorted by
// body length before being cut into batches, so a batch contains
// examples of similar length, and the resulting batches are then
// shuffled. Evaluation sources keep file order.

use anyhow::{Context, Result};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use std::{
    cell::Cell,
    collections::VecDeque,
    fs::File,
    io::{BufRead, BufReader, Lines},
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::data::vocab::{Vocabulary, PAD_ID};
use crate::domain::batch::{Batch, LengthPolicy};
use crate::domain::stance::Stance;
use crate::domain::traits::{BatchIter, BatchSource};
use crate::error::StanceError;

/// Number of batches worth of examples read ahead at a time
const REFILL_BATCHES: usize = 160;

/// Fixed dimensions every batch is padded to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchShape {
    pub batch_size:   usize,
    pub context_len:  usize,
    pub question_len: usize,
}

pub struct FileBatchSource {
    split:         String,
    body_path:     PathBuf,
    headline_path: PathBuf,
    stance_path:   PathBuf,
    vocab:         Arc<Vocabulary>,
    shape:         BatchShape,
    shuffle_seed:  Option<u64>,
    // number of passes started, mixed into the shuffle seed
    passes:        Cell<u64>,
}

impl FileBatchSource {
    pub fn new(
        data_dir: impl AsRef<Path>,
        split:    impl Into<String>,
        vocab:    Arc<Vocabulary>,
        shape:    BatchShape,
    ) -> Self {
        let split    = split.into();
        let data_dir = data_dir.as_ref();
        Self {
            body_path:     data_dir.join(format!("{split}.body")),
            headline_path: data_dir.join(format!("{split}.headline")),
            stance_path:   data_dir.join(format!("{split}.stance")),
            split,
            vocab,
            shape,
            shuffle_seed:  None,
            passes:        Cell::new(0),
        }
    }

    /// Sort-and-shuffle batches on every pass, seeded for reproducibility.
    pub fn with_shuffle(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }

    pub fn split(&self) -> &str {
        &self.split
    }

    /// Body and headline token files of a split, used to build the vocabulary
    pub fn text_files(data_dir: impl AsRef<Path>, split: &str) -> [PathBuf; 2] {
        let data_dir = data_dir.as_ref();
        [
            data_dir.join(format!("{split}.body")),
            data_dir.join(format!("{split}.headline")),
        ]
    }
}

impl BatchSource for FileBatchSource {
    fn batches(&self, policy: LengthPolicy) -> Result<BatchIter<'_>> {
        let pass = self.passes.get();
        self.passes.set(pass + 1);

        let rng = self
            .shuffle_seed
            .map(|seed| StdRng::seed_from_u64(seed.wrapping_add(pass)));

        Ok(Box::new(FileBatchIter {
            source:   self,
            body:     open_lines(&self.body_path)?,
            headline: open_lines(&self.headline_path)?,
            stance:   open_lines(&self.stance_path)?,
            line:     0,
            policy,
            rng,
            pending:  VecDeque::new(),
            finished: false,
        }))
    }
}

fn open_lines(path: &Path) -> Result<Lines<BufReader<File>>> {
    let file = File::open(path).with_context(|| format!("Cannot open '{}'", path.display()))?;
    Ok(BufReader::new(file).lines())
}

/// One tokenised example before padding
struct Example {
    body_ids:     Vec<u32>,
    headline_ids: Vec<u32>,
    stance:       Stance,
}

struct FileBatchIter<'a> {
    source:   &'a FileBatchSource,
    body:     Lines<BufReader<File>>,
    headline: Lines<BufReader<File>>,
    stance:   Lines<BufReader<File>>,
    line:     usize,
    policy:   LengthPolicy,
    rng:      Option<StdRng>,
    pending:  VecDeque<Batch>,
    finished: bool,
}

impl FileBatchIter<'_> {
    /// Read the next chunk of examples and queue their batches.
    fn refill(&mut self) -> Result<()> {
        let shape    = self.source.shape;
        let capacity = shape.batch_size.max(1) * REFILL_BATCHES;
        let mut examples: Vec<Example> = Vec::with_capacity(capacity);

        while examples.len() < capacity {
            let (body, headline, stance) = match (
                self.body.next(),
                self.headline.next(),
                self.stance.next(),
            ) {
                (None, None, None) => {
                    self.finished = true;
                    break;
                }
                (Some(b), Some(h), Some(s)) => (b?, h?, s?),
                _ => {
                    return Err(StanceError::MisalignedData {
                        split: self.source.split.clone(),
                        line:  self.line + 1,
                    }
                    .into())
                }
            };
            self.line += 1;

            let stance: Stance = stance.parse().with_context(|| {
                format!("{}:{}", self.source.stance_path.display(), self.line)
            })?;
            let mut body_ids     = self.source.vocab.encode(&body);
            let mut headline_ids = self.source.vocab.encode(&headline);

            let too_long = body_ids.len() > shape.context_len
                || headline_ids.len() > shape.question_len;
            if too_long {
                match self.policy {
                    LengthPolicy::Discard => continue,
                    LengthPolicy::Truncate => {
                        body_ids.truncate(shape.context_len);
                        headline_ids.truncate(shape.question_len);
                    }
                }
            }

            examples.push(Example { body_ids, headline_ids, stance });
        }

        if self.rng.is_some() {
            examples.sort_by_key(|e| e.body_ids.len());
        }

        let mut batches = examples
            .chunks(shape.batch_size.max(1))
            .map(|chunk| build_batch(chunk, shape))
            .collect::<Result<Vec<_>>>()?;

        if let Some(rng) = self.rng.as_mut() {
            batches.shuffle(rng);
        }

        self.pending.extend(batches);
        Ok(())
    }
}

impl Iterator for FileBatchIter<'_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pending.is_empty() && !self.finished {
            if let Err(e) = self.refill() {
                self.finished = true;
                return Some(Err(e));
            }
        }
        self.pending.pop_front().map(Ok)
    }
}

/// Pad every example to the batch shape and attach masks
fn build_batch(examples: &[Example], shape: BatchShape) -> Result<Batch> {
    let (body_ids, body_mask): (Vec<_>, Vec<_>) = examples
        .iter()
        .map(|e| pad(&e.body_ids, shape.context_len))
        .unzip();
    let (headline_ids, headline_mask): (Vec<_>, Vec<_>) = examples
        .iter()
        .map(|e| pad(&e.headline_ids, shape.question_len))
        .unzip();
    let labels = examples.iter().map(|e| e.stance).collect();

    Batch::new(body_ids, body_mask, headline_ids, headline_mask, labels)
}

fn pad(ids: &[u32], width: usize) -> (Vec<u32>, Vec<u32>) {
    let n = ids.len().min(width);
    let mut padded = ids[..n].to_vec();
    let mut mask   = vec![1u32; n];
    padded.resize(width, PAD_ID);
    mask.resize(width, 0);
    (padded, mask)
}
