// ============================================================
// Layer 6 - Scalar Summary Writer
// ============================================================
// Records scalar time series to a CSV file in the training
// directory, one row per (step, tag, value):
//
//   step,tag,value
//   1,train/loss,1.386294
//   2,train/loss,1.371020
//   ...
//   500,dev/loss,1.102933
//   500,train/score,41.250000
//   500,dev/score,38.906250
//
// Tags used by the trainer:
//   train/loss   - raw batch loss, every step
//   dev/loss     - dataset loss on the dev set, every eval
//   train/score  - score on sampled training examples, every eval
//   dev/score    - score on the full dev set, every eval
//
// Rows are buffered and only hit the disk on flush() (the
// trainer flushes after each evaluation) or when the writer is
// dropped. Re-opening an existing file appends, so a resumed
// run continues the same series.

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::domain::traits::ScalarSink;

const HEADER: &str = "step,tag,value";

pub struct CsvScalarSink {
    csv_path: PathBuf,
    writer:   BufWriter<fs::File>,
}

impl CsvScalarSink {
    /// Open `dir/summaries.csv`, writing the header if the file is new.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create '{}'", dir.display()))?;

        let csv_path = dir.join("summaries.csv");
        let is_new   = !csv_path.exists();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&csv_path)
            .with_context(|| format!("Cannot open '{}'", csv_path.display()))?;
        let mut writer = BufWriter::new(file);

        if is_new {
            writeln!(writer, "{HEADER}")?;
            tracing::debug!("Created summaries CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path, writer })
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

impl ScalarSink for CsvScalarSink {
    fn write_scalar(&mut self, tag: &str, value: f64, step: u64) -> Result<()> {
        writeln!(self.writer, "{},{},{:.6}", step, tag, value)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .with_context(|| format!("Cannot flush '{}'", self.csv_path.display()))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_rows_written_after_flush() {
        let dir      = TempDir::new().unwrap();
        let mut sink = CsvScalarSink::new(dir.path()).unwrap();
        sink.write_scalar("dev/loss", 1.5, 100).unwrap();
        sink.write_scalar("dev/score", 42.0, 100).unwrap();
        sink.flush().unwrap();

        let text = fs::read_to_string(sink.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec![HEADER, "100,dev/loss,1.500000", "100,dev/score,42.000000"]);
    }

    #[test]
    fn test_reopen_appends_without_second_header() {
        let dir = TempDir::new().unwrap();
        {
            let mut sink = CsvScalarSink::new(dir.path()).unwrap();
            sink.write_scalar("train/loss", 0.5, 1).unwrap();
            sink.flush().unwrap();
        }
        let mut sink = CsvScalarSink::new(dir.path()).unwrap();
        sink.write_scalar("train/loss", 0.25, 2).unwrap();
        sink.flush().unwrap();

        let text = fs::read_to_string(sink.csv_path()).unwrap();
        assert_eq!(text.matches(HEADER).count(), 1);
        assert_eq!(text.lines().count(), 3);
    }
}
