// ============================================================
// Layer 6 - Checkpoint Manager
// ============================================================
// Persists parameter snapshots into three retention slots:
//
//   Latest     - periodic saves, keeps the last `keep` snapshots
//   BestScore  - best dev score so far, keeps 1
//   BestLoss   - lowest dev loss so far, keeps 1
//
// File layout under the training directory:
//
//   train_dir/
//     checkpoints/
//       stance-200.bin
//       stance-400.bin
//       checkpoint.json          ← {"steps": [200, 400]}
//     best_checkpoint/
//       stance_best-400.bin
//       checkpoint.json          ← {"steps": [400], "metric": 61.5}
//     best_checkpoint_dev_loss/
//       stance_best_dev_loss-200.bin
//       checkpoint.json
//     train_config.json          ← hyperparameters for rebuilding the model
//
// Snapshots are opaque bytes produced by StanceModel::parameters.
// Each file is written to a .tmp sibling first and then renamed,
// so a crash mid-write never leaves a truncated checkpoint behind.
// The slot index is written the same way after the snapshot.
// The best slots also record the metric their snapshot achieved,
// so a resumed run keeps comparing against it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fmt, fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use crate::application::train_use_case::TrainConfig;
use crate::error::StanceError;

const INDEX_FILE:  &str = "checkpoint.json";
const CONFIG_FILE: &str = "train_config.json";

/// A named checkpoint retention bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Latest,
    BestScore,
    BestLoss,
}

impl Slot {
    pub const ALL: [Slot; 3] = [Slot::Latest, Slot::BestScore, Slot::BestLoss];

    fn dir_name(self) -> &'static str {
        match self {
            Slot::Latest    => "checkpoints",
            Slot::BestScore => "best_checkpoint",
            Slot::BestLoss  => "best_checkpoint_dev_loss",
        }
    }

    fn file_prefix(self) -> &'static str {
        match self {
            Slot::Latest    => "stance",
            Slot::BestScore => "stance_best",
            Slot::BestLoss  => "stance_best_dev_loss",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Slot::Latest    => "latest",
            Slot::BestScore => "best-score",
            Slot::BestLoss  => "best-loss",
        })
    }
}

/// A parameter snapshot and the step it was taken at
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub step:       u64,
    pub parameters: Vec<u8>,
}

/// Retained steps of one slot, oldest first, and the metric of the
/// newest snapshot when the slot tracks one
#[derive(Debug, Default, Serialize, Deserialize)]
struct SlotIndex {
    steps:  Vec<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metric: Option<f64>,
}

pub struct CheckpointManager {
    root: PathBuf,
    keep: usize,
}

impl CheckpointManager {
    /// Open (and create if needed) the three slot directories under `root`.
    /// `keep` bounds the Latest slot; values below 1 are treated as 1.
    pub fn new(root: impl Into<PathBuf>, keep: usize) -> Result<Self> {
        let root = root.into();
        for slot in Slot::ALL {
            let dir = root.join(slot.dir_name());
            fs::create_dir_all(&dir)
                .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        }
        Ok(Self { root, keep: keep.max(1) })
    }

    /// Open an existing training directory without creating anything.
    /// Fails when any slot directory is missing.
    pub fn open(root: impl Into<PathBuf>, keep: usize) -> Result<Self> {
        let root = root.into();
        for slot in Slot::ALL {
            let dir = root.join(slot.dir_name());
            anyhow::ensure!(
                dir.is_dir(),
                "No checkpoint directory '{}'. Make sure you have run 'train' with this --train-dir.",
                dir.display()
            );
        }
        Ok(Self { root, keep: keep.max(1) })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// How many snapshots the slot holds at most
    pub fn retention(&self, slot: Slot) -> usize {
        match slot {
            Slot::Latest => self.keep,
            Slot::BestScore | Slot::BestLoss => 1,
        }
    }

    /// Write `parameters` into `slot` tagged with `step`, evicting the
    /// oldest snapshots beyond the slot's retention.
    pub fn save(&self, slot: Slot, step: u64, parameters: &[u8]) -> Result<()> {
        self.save_entry(slot, step, parameters, None)
    }

    /// Like `save`, also recording the metric that earned the snapshot.
    pub fn save_with_metric(&self, slot: Slot, step: u64, parameters: &[u8], metric: f64) -> Result<()> {
        self.save_entry(slot, step, parameters, Some(metric))
    }

    /// Metric recorded with the newest snapshot of `slot`, if any
    pub fn metric(&self, slot: Slot) -> Result<Option<f64>> {
        let index = self.read_index(slot)?;
        Ok(if index.steps.is_empty() { None } else { index.metric })
    }

    fn save_entry(&self, slot: Slot, step: u64, parameters: &[u8], metric: Option<f64>) -> Result<()> {
        let path = self.snapshot_path(slot, step);
        write_atomic(&path, parameters)
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        let mut index = self.read_index(slot)?;
        index.steps.retain(|&s| s != step);
        index.steps.push(step);
        index.metric = metric;

        let excess = index.steps.len().saturating_sub(self.retention(slot));
        let evicted: Vec<u64> = index.steps.drain(..excess).collect();
        self.write_index(slot, &index)?;

        for old in evicted {
            let old_path = self.snapshot_path(slot, old);
            match fs::remove_file(&old_path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Cannot evict checkpoint '{}'", old_path.display())
                    })
                }
            }
            tracing::debug!("Evicted {} checkpoint at step {}", slot, old);
        }

        tracing::info!("Saved {} checkpoint to '{}'", slot, path.display());
        Ok(())
    }

    /// Load the newest snapshot of `slot`.
    pub fn load(&self, slot: Slot) -> Result<Checkpoint> {
        let step = self
            .latest_step(slot)?
            .ok_or(StanceError::CheckpointNotFound(slot))?;
        let path = self.snapshot_path(slot, step);
        let parameters = fs::read(&path)
            .with_context(|| format!("Cannot read checkpoint '{}'", path.display()))?;
        tracing::info!("Loaded {} checkpoint from step {}", slot, step);
        Ok(Checkpoint { step, parameters })
    }

    /// Steps currently retained in `slot`, oldest first
    pub fn steps(&self, slot: Slot) -> Result<Vec<u64>> {
        Ok(self.read_index(slot)?.steps)
    }

    pub fn latest_step(&self, slot: Slot) -> Result<Option<u64>> {
        Ok(self.read_index(slot)?.steps.last().copied())
    }

    /// Save the training configuration so `eval` can rebuild the
    /// exact architecture before loading weights into it.
    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.root.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.root.join(CONFIG_FILE);
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. Make sure you have run 'train' before 'eval'.",
                path.display()
            )
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    fn slot_dir(&self, slot: Slot) -> PathBuf {
        self.root.join(slot.dir_name())
    }

    fn snapshot_path(&self, slot: Slot, step: u64) -> PathBuf {
        self.slot_dir(slot).join(format!("{}-{}.bin", slot.file_prefix(), step))
    }

    fn read_index(&self, slot: Slot) -> Result<SlotIndex> {
        let path = self.slot_dir(slot).join(INDEX_FILE);
        match fs::read_to_string(&path) {
            Ok(json) => serde_json::from_str(&json)
                .with_context(|| format!("Corrupt checkpoint index '{}'", path.display())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(SlotIndex::default()),
            Err(e) => Err(e).with_context(|| format!("Cannot read '{}'", path.display())),
        }
    }

    fn write_index(&self, slot: Slot, index: &SlotIndex) -> Result<()> {
        let path = self.slot_dir(slot).join(INDEX_FILE);
        write_atomic(&path, serde_json::to_string(index)?.as_bytes())
            .with_context(|| format!("Cannot write '{}'", path.display()))
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager(keep: usize) -> (TempDir, CheckpointManager) {
        let dir = TempDir::new().unwrap();
        let mgr = CheckpointManager::new(dir.path(), keep).unwrap();
        (dir, mgr)
    }

    #[test]
    fn test_creates_slot_directories() {
        let (dir, _mgr) = manager(3);
        assert!(dir.path().join("checkpoints").is_dir());
        assert!(dir.path().join("best_checkpoint").is_dir());
        assert!(dir.path().join("best_checkpoint_dev_loss").is_dir());
    }

    #[test]
    fn test_retention_evicts_oldest() {
        let (dir, mgr) = manager(3);
        for step in 1..=4u64 {
            mgr.save(Slot::Latest, step, &[step as u8]).unwrap();
        }
        assert_eq!(mgr.steps(Slot::Latest).unwrap(), vec![2, 3, 4]);
        assert!(!dir.path().join("checkpoints/stance-1.bin").exists());
        assert!(dir.path().join("checkpoints/stance-4.bin").exists());
    }

    #[test]
    fn test_best_slots_keep_one() {
        let (_dir, mgr) = manager(5);
        mgr.save(Slot::BestScore, 10, b"a").unwrap();
        mgr.save(Slot::BestScore, 20, b"b").unwrap();
        assert_eq!(mgr.steps(Slot::BestScore).unwrap(), vec![20]);
        assert!(mgr.steps(Slot::BestLoss).unwrap().is_empty());
    }

    #[test]
    fn test_load_returns_newest() {
        let (_dir, mgr) = manager(2);
        mgr.save(Slot::Latest, 5, b"five").unwrap();
        mgr.save(Slot::Latest, 6, b"six").unwrap();
        let ckpt = mgr.load(Slot::Latest).unwrap();
        assert_eq!(ckpt.step, 6);
        assert_eq!(ckpt.parameters, b"six".to_vec());
    }

    #[test]
    fn test_load_empty_slot_is_not_found() {
        let (_dir, mgr) = manager(2);
        let err = mgr.load(Slot::BestLoss).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StanceError>(),
            Some(StanceError::CheckpointNotFound(Slot::BestLoss))
        ));
    }

    #[test]
    fn test_resaving_same_step_replaces() {
        let (_dir, mgr) = manager(3);
        mgr.save(Slot::Latest, 7, b"old").unwrap();
        mgr.save(Slot::Latest, 7, b"new").unwrap();
        assert_eq!(mgr.steps(Slot::Latest).unwrap(), vec![7]);
        assert_eq!(mgr.load(Slot::Latest).unwrap().parameters, b"new".to_vec());
    }

    #[test]
    fn test_index_survives_reopen() {
        let (dir, mgr) = manager(3);
        mgr.save(Slot::Latest, 1, b"x").unwrap();
        mgr.save(Slot::Latest, 2, b"y").unwrap();
        drop(mgr);
        let reopened = CheckpointManager::new(dir.path(), 3).unwrap();
        assert_eq!(reopened.latest_step(Slot::Latest).unwrap(), Some(2));
    }

    #[test]
    fn test_metric_kept_with_newest_snapshot() {
        let (dir, mgr) = manager(1);
        assert_eq!(mgr.metric(Slot::BestScore).unwrap(), None);
        mgr.save_with_metric(Slot::BestScore, 3, b"a", 55.0).unwrap();
        mgr.save_with_metric(Slot::BestScore, 8, b"b", 72.5).unwrap();
        drop(mgr);

        let reopened = CheckpointManager::new(dir.path(), 1).unwrap();
        assert_eq!(reopened.metric(Slot::BestScore).unwrap(), Some(72.5));
        assert_eq!(reopened.steps(Slot::BestScore).unwrap(), vec![8]);
        // plain saves carry no metric
        reopened.save(Slot::Latest, 8, b"c").unwrap();
        assert_eq!(reopened.metric(Slot::Latest).unwrap(), None);
    }

    #[test]
    fn test_open_requires_existing_directories() {
        let dir     = TempDir::new().unwrap();
        let missing = dir.path().join("typo");
        assert!(CheckpointManager::open(&missing, 1).is_err());
        assert!(!missing.exists());

        CheckpointManager::new(dir.path(), 1).unwrap();
        assert!(CheckpointManager::open(dir.path(), 1).is_ok());
    }

    #[test]
    fn test_config_round_trip() {
        let (_dir, mgr) = manager(1);
        let cfg = TrainConfig { batch_size: 17, ..TrainConfig::default() };
        mgr.save_config(&cfg).unwrap();
        assert_eq!(mgr.load_config().unwrap().batch_size, 17);
    }
}
