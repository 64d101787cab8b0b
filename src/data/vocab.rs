// ============================================================
// Layer 4 - Vocabulary
// ============================================================
// Maps whitespace-separated tokens to integer ids.
//
// Reserved ids:
//   0 = <pad>   padding position, masked out by the model
//   1 = <unk>   any word not in the vocabulary
//
// The vocabulary is built once from the training corpus (most
// frequent words first, ties broken alphabetically so the ids
// are reproducible) and saved as vocab.json in the training
// directory. Evaluation loads the same file, which guarantees
// the embedding rows line up with the ids the model was trained on.

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    io::{BufRead, BufReader},
    path::Path,
};

pub const PAD_ID: u32 = 0;
pub const UNK_ID: u32 = 1;
pub const PAD_TOKEN: &str = "<pad>";
pub const UNK_TOKEN: &str = "<unk>";

const VOCAB_FILE: &str = "vocab.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vocabulary {
    word2id: HashMap<String, u32>,
}

impl Vocabulary {
    /// Build from lines of text, keeping at most `vocab_size` entries
    /// (the two reserved tokens included).
    pub fn build<I, S>(lines: I, vocab_size: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut freq: HashMap<String, usize> = HashMap::new();
        for line in lines {
            for word in tokenize(line.as_ref()) {
                *freq.entry(word).or_insert(0) += 1;
            }
        }

        let mut words: Vec<(String, usize)> = freq.into_iter().collect();
        words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        words.truncate(vocab_size.saturating_sub(2));

        let mut word2id = HashMap::with_capacity(words.len() + 2);
        word2id.insert(PAD_TOKEN.to_string(), PAD_ID);
        word2id.insert(UNK_TOKEN.to_string(), UNK_ID);
        for (word, _) in words {
            let next_id = word2id.len() as u32;
            word2id.entry(word).or_insert(next_id);
        }

        Self { word2id }
    }

    /// Build from every line of the given text files
    pub fn build_from_files(paths: &[&Path], vocab_size: usize) -> Result<Self> {
        let mut lines = Vec::new();
        for path in paths {
            let file = fs::File::open(path)
                .with_context(|| format!("Cannot open '{}'", path.display()))?;
            for line in BufReader::new(file).lines() {
                lines.push(line.with_context(|| format!("Cannot read '{}'", path.display()))?);
            }
        }
        Ok(Self::build(lines, vocab_size))
    }

    /// Load `dir/vocab.json` if it exists, otherwise build it from
    /// `corpus` and save it there.
    pub fn load_or_build(dir: &Path, corpus: &[&Path], vocab_size: usize) -> Result<Self> {
        let path = dir.join(VOCAB_FILE);
        if path.exists() {
            tracing::info!("Loading existing vocabulary from '{}'", path.display());
            return Self::load(dir);
        }

        tracing::info!("Building new vocabulary (vocab_size={})", vocab_size);
        let vocab = Self::build_from_files(corpus, vocab_size)?;
        vocab.save(dir)?;
        tracing::info!("Vocabulary built with {} words, saved to '{}'", vocab.len(), path.display());
        Ok(vocab)
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(VOCAB_FILE);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot load vocabulary from '{}'", path.display()))?;
        let vocab: Self = serde_json::from_str(&json)
            .with_context(|| format!("Corrupt vocabulary '{}'", path.display()))?;
        ensure!(!vocab.is_empty(), "Vocabulary '{}' has no entries", path.display());
        Ok(vocab)
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        let path = dir.join(VOCAB_FILE);
        fs::write(&path, serde_json::to_string(self)?)
            .with_context(|| format!("Cannot write vocabulary to '{}'", path.display()))
    }

    pub fn id(&self, word: &str) -> u32 {
        self.word2id.get(word).copied().unwrap_or(UNK_ID)
    }

    /// Lowercase, split on whitespace, look up every token
    pub fn encode(&self, line: &str) -> Vec<u32> {
        tokenize(line).map(|w| self.id(&w)).collect()
    }

    pub fn len(&self) -> usize {
        self.word2id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.word2id.is_empty()
    }
}

fn tokenize(line: &str) -> impl Iterator<Item = String> + '_ {
    line.split_whitespace().map(str::to_lowercase)
}
