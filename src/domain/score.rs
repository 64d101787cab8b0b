// ============================================================
// Layer 3 - Stance Scoring
// ============================================================
// Weighted accuracy for stance detection:
//
//   +0.25  predicted label equals the gold label
//   +0.50  ... and that label is a related one
//   +0.25  gold and predicted are both related (any of the three)
//
// Distinguishing related from unrelated is worth less than getting
// the stance of a related pair right. The reported number is the
// score as a percentage of the best achievable score, i.e. the
// score of the gold labels against themselves.

use std::fmt;

use crate::domain::stance::Stance;
use crate::domain::traits::Scorer;

/// Counts of (gold, predicted) pairs. Rows = gold, columns = predicted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfusionMatrix {
    counts: [[usize; Stance::COUNT]; Stance::COUNT],
}

impl ConfusionMatrix {
    pub fn add(&mut self, gold: Stance, predicted: Stance) {
        self.counts[gold.index()][predicted.index()] += 1;
    }

    pub fn get(&self, gold: Stance, predicted: Stance) -> usize {
        self.counts[gold.index()][predicted.index()]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>10}", "")?;
        for st in Stance::ALL {
            write!(f, " {:>10}", st.as_str())?;
        }
        for gold in Stance::ALL {
            writeln!(f)?;
            write!(f, "{:>10}", gold.as_str())?;
            for pred in Stance::ALL {
                write!(f, " {:>10}", self.get(gold, pred))?;
            }
        }
        Ok(())
    }
}

/// Raw weighted score and confusion matrix for a list of pairs.
/// Pairs beyond the shorter of the two slices are ignored.
pub fn score_submission(gold: &[Stance], predicted: &[Stance]) -> (f64, ConfusionMatrix) {
    let mut score = 0.0;
    let mut cm    = ConfusionMatrix::default();

    for (&g, &p) in gold.iter().zip(predicted) {
        if g == p {
            score += 0.25;
            if g.is_related() {
                score += 0.50;
            }
        }
        if g.is_related() && p.is_related() {
            score += 0.25;
        }
        cm.add(g, p);
    }

    (score, cm)
}

/// Percentage of the best achievable weighted score
#[derive(Debug, Clone, Copy, Default)]
pub struct FncScorer;

impl Scorer for FncScorer {
    fn score(&self, actual: &[Stance], predicted: &[Stance]) -> f64 {
        let (score, cm)   = score_submission(actual, predicted);
        let (best, _)     = score_submission(actual, actual);

        tracing::debug!("Confusion matrix ({} examples):\n{}", cm.total(), cm);

        if best == 0.0 {
            return 0.0;
        }
        let pct = score * 100.0 / best;
        tracing::debug!("Score: {} out of {} ({:.2}%)", score, best, pct);
        pct
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Stance::*;

    #[test]
    fn test_perfect_predictions_score_100() {
        let gold = vec![Agree, Disagree, Discuss, Unrelated];
        assert!((FncScorer.score(&gold, &gold) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_weights() {
        // correct related label: 0.25 + 0.50 + 0.25 = 1.0
        assert_eq!(score_submission(&[Agree], &[Agree]).0, 1.0);
        // correct unrelated: 0.25
        assert_eq!(score_submission(&[Unrelated], &[Unrelated]).0, 0.25);
        // wrong stance but both related: 0.25
        assert_eq!(score_submission(&[Agree], &[Discuss]).0, 0.25);
        // related predicted as unrelated: nothing
        assert_eq!(score_submission(&[Agree], &[Unrelated]).0, 0.0);
    }

    #[test]
    fn test_percentage_of_best() {
        let gold = vec![Agree, Unrelated];
        let pred = vec![Discuss, Unrelated];
        // score = 0.25 + 0.25, best = 1.0 + 0.25
        let pct = FncScorer.score(&gold, &pred);
        assert!((pct - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_scores_zero() {
        assert_eq!(FncScorer.score(&[], &[]), 0.0);
    }

    #[test]
    fn test_confusion_matrix_counts() {
        let (_, cm) = score_submission(&[Agree, Agree, Unrelated], &[Agree, Discuss, Agree]);
        assert_eq!(cm.get(Agree, Agree), 1);
        assert_eq!(cm.get(Agree, Discuss), 1);
        assert_eq!(cm.get(Unrelated, Agree), 1);
        assert_eq!(cm.total(), 3);
    }
}
