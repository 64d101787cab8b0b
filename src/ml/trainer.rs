// ============================================================
// Layer 5 - Training Loop
// ============================================================
// Drives epochs of training over any StanceModel and decides,
// step by step, when to log, checkpoint and evaluate.
//
// Per step:
//   - one optimisation step on the next training batch
//   - step += 1, raw loss written as train/loss
//   - smoothed loss: L' = 0.99 * L + 0.01 * loss (first step seeds L' = loss)
//
// Every print_every steps: log loss, smoothed loss, norms, batch time
// Every save_every steps:  snapshot into the Latest slot
// Every eval_every steps:  dev loss, train score (sampled), dev score,
//                          then the two independent "best" checks:
//                            dev score >  best score  → BestScore slot
//                            dev loss  <  lowest loss → BestLoss slot
//
// An interval of 0 disables that action. Any failure (I/O, eval,
// malformed batch) propagates and ends the run.

use anyhow::Result;
use std::time::Instant;

use crate::domain::batch::LengthPolicy;
use crate::domain::traits::{BatchSource, ScalarSink, Scorer, StanceModel};
use crate::infra::checkpoint::{CheckpointManager, Slot};
use crate::ml::evaluator::{dataset_loss, dataset_score};

/// Weight of the previous smoothed value in the moving average
pub const SMOOTHING: f64 = 0.99;

/// When each periodic action fires, and for how long to train
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    /// 0 = train until the process is stopped
    pub num_epochs:          usize,
    pub print_every:         u64,
    pub save_every:          u64,
    pub eval_every:          u64,
    /// Training examples scored at each evaluation (0 = all)
    pub train_score_samples: usize,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            num_epochs:          0,
            print_every:         1,
            save_every:          500,
            eval_every:          500,
            train_score_samples: 1000,
        }
    }
}

/// Everything the training loop tracks between steps
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingState {
    pub epoch:         usize,
    pub step:          u64,
    pub smoothed_loss: Option<f64>,
    pub best_score:    Option<f64>,
    pub lowest_loss:   Option<f64>,
}

/// Which "best" criteria an evaluation improved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Improvement {
    pub score: bool,
    pub loss:  bool,
}

impl TrainingState {
    /// Fold a raw batch loss into the moving average and return it.
    pub fn observe_loss(&mut self, loss: f64) -> f64 {
        let smoothed = match self.smoothed_loss {
            None       => loss,
            Some(prev) => SMOOTHING * prev + (1.0 - SMOOTHING) * loss,
        };
        self.smoothed_loss = Some(smoothed);
        smoothed
    }

    /// Compare an evaluation against the bests so far, updating each
    /// criterion independently. Ties are not improvements.
    pub fn record_eval(&mut self, dev_score: f64, dev_loss: f64) -> Improvement {
        let score = self.best_score.map_or(true, |best| dev_score > best);
        if score {
            self.best_score = Some(dev_score);
        }
        let loss = self.lowest_loss.map_or(true, |lowest| dev_loss < lowest);
        if loss {
            self.lowest_loss = Some(dev_loss);
        }
        Improvement { score, loss }
    }
}

fn is_due(step: u64, every: u64) -> bool {
    every > 0 && step % every == 0
}

pub struct Trainer<M, K> {
    model:       M,
    schedule:    Schedule,
    checkpoints: CheckpointManager,
    sink:        K,
    scorer:      Box<dyn Scorer>,
    state:       TrainingState,
}

impl<M: StanceModel, K: ScalarSink> Trainer<M, K> {
    pub fn new(
        model:       M,
        schedule:    Schedule,
        checkpoints: CheckpointManager,
        sink:        K,
        scorer:      Box<dyn Scorer>,
    ) -> Self {
        Self { model, schedule, checkpoints, sink, scorer, state: TrainingState::default() }
    }

    /// Continue from the newest Latest checkpoint, if there is one.
    /// The best score and lowest loss recorded with the best slots are
    /// restored either way. Returns the restored step.
    pub fn resume(&mut self) -> Result<Option<u64>> {
        self.state.best_score  = self.checkpoints.metric(Slot::BestScore)?;
        self.state.lowest_loss = self.checkpoints.metric(Slot::BestLoss)?;
        if let Some(best) = self.state.best_score {
            tracing::info!("Best dev score so far: {:.4}", best);
        }
        if let Some(lowest) = self.state.lowest_loss {
            tracing::info!("Lowest dev loss so far: {:.6}", lowest);
        }

        if self.checkpoints.latest_step(Slot::Latest)?.is_none() {
            tracing::info!("No checkpoint in '{}', starting fresh", self.checkpoints.root().display());
            return Ok(None);
        }
        let ckpt = self.checkpoints.load(Slot::Latest)?;
        self.model.load_parameters(ckpt.parameters)?;
        self.state.step = ckpt.step;
        tracing::info!("Resuming from step {}", ckpt.step);
        Ok(Some(ckpt.step))
    }

    /// Run epochs until the budget is spent (forever if it is 0).
    pub fn train<T, D>(&mut self, train: &T, dev: &D) -> Result<TrainingState>
    where
        T: BatchSource + ?Sized,
        D: BatchSource + ?Sized,
    {
        tracing::info!("Number of params: {}", self.model.num_params());
        tracing::info!("Beginning training loop...");

        let budget = self.schedule.num_epochs;
        while budget == 0 || self.state.epoch < budget {
            self.state.epoch += 1;
            let epoch_tic = Instant::now();

            self.run_epoch(train, dev)?;

            tracing::info!(
                "End of epoch {}. Time for epoch: {:.2}s",
                self.state.epoch,
                epoch_tic.elapsed().as_secs_f64()
            );
        }

        self.sink.flush()?;
        Ok(self.state.clone())
    }

    /// One pass over the training batches with all periodic actions.
    pub fn run_epoch<T, D>(&mut self, train: &T, dev: &D) -> Result<()>
    where
        T: BatchSource + ?Sized,
        D: BatchSource + ?Sized,
    {
        for batch in train.batches(LengthPolicy::Discard)? {
            let batch = batch?;
            if batch.is_empty() {
                continue;
            }

            let iter_tic = Instant::now();
            let outcome  = self.model.train_step(&batch)?;
            let iter_time = iter_tic.elapsed().as_secs_f64();

            self.state.step += 1;
            let step     = self.state.step;
            let smoothed = self.state.observe_loss(outcome.loss);
            self.sink.write_scalar("train/loss", outcome.loss, step)?;

            if is_due(step, self.schedule.print_every) {
                tracing::info!(
                    "epoch {}, iter {}, loss {:.5}, smoothed loss {:.5}, grad norm {:.5}, param norm {:.5}, batch time {:.3}",
                    self.state.epoch, step, outcome.loss, smoothed,
                    outcome.grad_norm, outcome.param_norm, iter_time,
                );
            }

            if is_due(step, self.schedule.save_every) {
                let params = self.model.parameters()?;
                self.checkpoints.save(Slot::Latest, step, &params)?;
            }

            if is_due(step, self.schedule.eval_every) {
                self.evaluate(train, dev)?;
            }
        }
        Ok(())
    }

    /// Dev loss, train and dev scores, then the early-stopping saves.
    pub fn evaluate<T, D>(&mut self, train: &T, dev: &D) -> Result<Improvement>
    where
        T: BatchSource + ?Sized,
        D: BatchSource + ?Sized,
    {
        let (epoch, step) = (self.state.epoch, self.state.step);

        let dev_loss = dataset_loss(&self.model, dev, "dev")?;
        tracing::info!("Epoch {}, Iter {}, dev loss: {:.6}", epoch, step, dev_loss);
        self.sink.write_scalar("dev/loss", dev_loss, step)?;

        let train_score = dataset_score(
            &self.model, train, self.schedule.train_score_samples, self.scorer.as_ref(), "train",
        )?;
        tracing::info!("Epoch {}, Iter {}, train score: {:.4}", epoch, step, train_score);
        self.sink.write_scalar("train/score", train_score, step)?;

        let dev_score = dataset_score(&self.model, dev, 0, self.scorer.as_ref(), "dev")?;
        tracing::info!("Epoch {}, Iter {}, dev score: {:.4}", epoch, step, dev_score);
        self.sink.write_scalar("dev/score", dev_score, step)?;
        self.sink.flush()?;

        let improved = self.state.record_eval(dev_score, dev_loss);
        if improved.score || improved.loss {
            let params = self.model.parameters()?;
            if improved.score {
                tracing::info!("New best dev score {:.4}", dev_score);
                self.checkpoints.save_with_metric(Slot::BestScore, step, &params, dev_score)?;
            }
            if improved.loss {
                tracing::info!("New lowest dev loss {:.6}", dev_loss);
                self.checkpoints.save_with_metric(Slot::BestLoss, step, &params, dev_loss)?;
            }
        }
        Ok(improved)
    }

    pub fn state(&self) -> &TrainingState {
        &self.state
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::score::FncScorer;
    use crate::testing::{batch_of, step_of, RecordingScorer, RecordingSink, ScriptedModel, VecSource};
    use tempfile::TempDir;

    fn schedule(save_every: u64, eval_every: u64, num_epochs: usize) -> Schedule {
        Schedule { num_epochs, print_every: 1, save_every, eval_every, train_score_samples: 4 }
    }

    fn trainer(
        dir:      &TempDir,
        model:    ScriptedModel,
        schedule: Schedule,
        scorer:   Box<dyn Scorer>,
        keep:     usize,
    ) -> Trainer<ScriptedModel, RecordingSink> {
        let ckpt = CheckpointManager::new(dir.path(), keep).unwrap();
        Trainer::new(model, schedule, ckpt, RecordingSink::default(), scorer)
    }

    #[test]
    fn test_first_observation_seeds_smoothed_loss() {
        let mut state = TrainingState::default();
        assert_eq!(state.observe_loss(3.25), 3.25);
        assert_eq!(state.smoothed_loss, Some(3.25));
    }

    #[test]
    fn test_smoothed_loss_weights() {
        let losses = [4.0, 2.0, 1.0, 7.0];
        let mut state = TrainingState::default();
        let mut last  = 0.0;
        for &l in &losses {
            last = state.observe_loss(l);
        }
        // seed weighted by 0.99^3, later losses by 0.01 * 0.99^k
        let n = losses.len() - 1;
        let mut expected = SMOOTHING.powi(n as i32) * losses[0];
        for k in 0..n {
            expected += 0.01 * SMOOTHING.powi(k as i32) * losses[n - k];
        }
        assert!((last - expected).abs() < 1e-12);
    }

    #[test]
    fn test_record_eval_is_independent_per_criterion() {
        let mut state = TrainingState::default();
        assert_eq!(state.record_eval(50.0, 5.0), Improvement { score: true, loss: true });
        // loss improves, score ties
        assert_eq!(state.record_eval(50.0, 4.0), Improvement { score: false, loss: true });
        // score improves, loss worsens
        assert_eq!(state.record_eval(60.0, 4.5), Improvement { score: true, loss: false });
        assert_eq!(state.best_score, Some(60.0));
        assert_eq!(state.lowest_loss, Some(4.0));
    }

    #[test]
    fn test_epoch_budget_and_step_count() {
        let dir    = TempDir::new().unwrap();
        let train  = VecSource::new(vec![batch_of(2), batch_of(2), batch_of(1)]);
        let dev    = VecSource::new(vec![batch_of(2)]);
        let mut t  = trainer(&dir, ScriptedModel::new(), schedule(0, 0, 2), Box::new(FncScorer), 3);

        let state = t.train(&train, &dev).unwrap();
        assert_eq!(state.epoch, 2);
        assert_eq!(state.step, 6);
        assert_eq!(t.sink().values("train/loss").len(), 6);
        assert!(t.sink().values("dev/loss").is_empty());
        assert_eq!(train.policies(), vec![LengthPolicy::Discard; 2]);
    }

    #[test]
    fn test_periodic_saves_respect_retention() {
        let dir   = TempDir::new().unwrap();
        let train = VecSource::new((0..5).map(|_| batch_of(1)).collect());
        let dev   = VecSource::new(vec![batch_of(1)]);
        let mut t = trainer(&dir, ScriptedModel::new(), schedule(1, 0, 1), Box::new(FncScorer), 3);

        t.train(&train, &dev).unwrap();
        assert_eq!(t.checkpoints().steps(Slot::Latest).unwrap(), vec![3, 4, 5]);
        let newest = t.checkpoints().load(Slot::Latest).unwrap();
        assert_eq!(step_of(&newest.parameters), 5);
    }

    #[test]
    fn test_best_slots_update_independently() {
        let dir   = TempDir::new().unwrap();
        let train = VecSource::new(vec![batch_of(2), batch_of(2), batch_of(2)]);
        let dev   = VecSource::new(vec![batch_of(2)]);
        let model = ScriptedModel::new().with_eval_losses(vec![5.0, 4.0, 4.5]);
        // (train score, dev score) per evaluation
        let scorer = RecordingScorer::with_scores(vec![10.0, 50.0, 10.0, 50.0, 10.0, 70.0]);
        let mut t  = trainer(&dir, model, schedule(0, 1, 1), Box::new(scorer), 5);

        let state = t.train(&train, &dev).unwrap();

        assert_eq!(t.checkpoints().steps(Slot::BestScore).unwrap(), vec![3]);
        assert_eq!(t.checkpoints().steps(Slot::BestLoss).unwrap(), vec![2]);
        assert!(t.checkpoints().steps(Slot::Latest).unwrap().is_empty());
        assert_eq!(state.best_score, Some(70.0));
        assert_eq!(state.lowest_loss, Some(4.0));

        let sink = t.sink();
        assert_eq!(sink.values("dev/loss"), vec![(1, 5.0), (2, 4.0), (3, 4.5)]);
        assert_eq!(sink.values("dev/score"), vec![(1, 50.0), (2, 50.0), (3, 70.0)]);
        assert_eq!(sink.values("train/score"), vec![(1, 10.0), (2, 10.0), (3, 10.0)]);
    }

    #[test]
    fn test_loss_only_improvement_touches_only_loss_slot() {
        let dir   = TempDir::new().unwrap();
        let train = VecSource::new(vec![batch_of(1)]);
        let dev   = VecSource::new(vec![batch_of(1)]);
        let model = ScriptedModel::new().with_eval_losses(vec![3.0, 2.0]);
        let scorer = RecordingScorer::with_scores(vec![0.0, 80.0, 0.0, 20.0]);
        let mut t  = trainer(&dir, model, schedule(0, 0, 1), Box::new(scorer), 1);

        t.train(&train, &dev).unwrap();
        let first  = t.evaluate(&train, &dev).unwrap();
        let second = t.evaluate(&train, &dev).unwrap();
        assert_eq!(first, Improvement { score: true, loss: true });
        assert_eq!(second, Improvement { score: false, loss: true });
        assert_eq!(t.state().best_score, Some(80.0));
    }

    #[test]
    fn test_train_score_is_sampled_dev_score_is_full() {
        let dir    = TempDir::new().unwrap();
        let train  = VecSource::new(vec![batch_of(3), batch_of(3), batch_of(3)]);
        let dev    = VecSource::new(vec![batch_of(3), batch_of(3)]);
        let mut t  = trainer(&dir, ScriptedModel::new(), schedule(0, 0, 1), Box::new(FncScorer), 1);

        t.train(&train, &dev).unwrap();
        let pulled_before = train.pulled();
        t.evaluate(&train, &dev).unwrap();
        // 4 samples need two batches of 3
        assert_eq!(train.pulled() - pulled_before, 2);
        assert_eq!(dev.policies(), vec![LengthPolicy::Discard, LengthPolicy::Truncate]);
    }

    #[test]
    fn test_resume_restores_step_and_parameters() {
        let dir  = TempDir::new().unwrap();
        let ckpt = CheckpointManager::new(dir.path(), 2).unwrap();
        ckpt.save(Slot::Latest, 7, &7u64.to_le_bytes()).unwrap();

        let train = VecSource::new(vec![batch_of(1)]);
        let dev   = VecSource::new(vec![batch_of(1)]);
        let mut t = trainer(&dir, ScriptedModel::new(), schedule(1, 0, 1), Box::new(FncScorer), 2);

        assert_eq!(t.resume().unwrap(), Some(7));
        t.train(&train, &dev).unwrap();
        assert_eq!(t.state().step, 8);
        assert!(t.model().loaded.is_some());
        assert_eq!(t.checkpoints().steps(Slot::Latest).unwrap(), vec![7, 8]);
    }

    #[test]
    fn test_resumed_run_keeps_earlier_best() {
        let dir   = TempDir::new().unwrap();
        let train = VecSource::new(vec![batch_of(1)]);
        let dev   = VecSource::new(vec![batch_of(1)]);

        let first = ScriptedModel::new().with_eval_losses(vec![2.0]);
        let mut t = trainer(&dir, first, schedule(1, 1, 1),
                            Box::new(RecordingScorer::with_scores(vec![0.0, 90.0])), 2);
        t.train(&train, &dev).unwrap();
        drop(t);

        // worse on both criteria after the restart
        let second = ScriptedModel::new().with_eval_losses(vec![3.0]);
        let mut t  = trainer(&dir, second, schedule(1, 1, 1),
                             Box::new(RecordingScorer::with_scores(vec![0.0, 10.0])), 2);
        assert_eq!(t.resume().unwrap(), Some(1));
        assert_eq!(t.state().best_score, Some(90.0));
        assert_eq!(t.state().lowest_loss, Some(2.0));

        let state = t.train(&train, &dev).unwrap();
        assert_eq!(state.step, 2);
        assert_eq!(state.best_score, Some(90.0));
        assert_eq!(t.checkpoints().steps(Slot::BestScore).unwrap(), vec![1]);
        assert_eq!(t.checkpoints().steps(Slot::BestLoss).unwrap(), vec![1]);
        assert_eq!(t.checkpoints().metric(Slot::BestScore).unwrap(), Some(90.0));
    }

    #[test]
    fn test_smoothed_loss_tracked_across_steps() {
        let dir   = TempDir::new().unwrap();
        let train = VecSource::new(vec![batch_of(1), batch_of(1), batch_of(1)]);
        let dev   = VecSource::new(vec![batch_of(1)]);
        let model = ScriptedModel::new().with_train_losses(vec![4.0, 2.0, 1.0]);
        let mut t = trainer(&dir, model, schedule(0, 0, 1), Box::new(FncScorer), 1);

        let state    = t.train(&train, &dev).unwrap();
        let smoothed = state.smoothed_loss.unwrap();
        // 4.0, then 0.99*4 + 0.01*2 = 3.98, then 0.99*3.98 + 0.01*1
        assert!((smoothed - 3.9502).abs() < 1e-9);
        assert_eq!(t.sink().values("train/loss"), vec![(1, 4.0), (2, 2.0), (3, 1.0)]);
    }

    #[test]
    fn test_resume_without_checkpoint() {
        let dir   = TempDir::new().unwrap();
        let mut t = trainer(&dir, ScriptedModel::new(), Schedule::default(), Box::new(FncScorer), 1);
        assert_eq!(t.resume().unwrap(), None);
        assert_eq!(t.state().step, 0);
    }

    #[test]
    fn test_failing_eval_aborts_run() {
        let dir   = TempDir::new().unwrap();
        let train = VecSource::new(vec![batch_of(1), batch_of(1)]);
        let dev   = VecSource::new(vec![]);
        let mut t = trainer(&dir, ScriptedModel::new(), schedule(0, 1, 1), Box::new(FncScorer), 1);

        assert!(t.train(&train, &dev).is_err());
        assert_eq!(t.state().step, 1);
    }
}
