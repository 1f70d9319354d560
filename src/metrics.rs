//! Binary classification metrics over anomaly scores.
//!
//! Convention throughout: label `true` = anomalous (positive), and an image is
//! predicted anomalous when `score >= threshold`.
//!
//! - Confusion matrix at a threshold, with precision / recall / F1 /
//!   accuracy / false-positive rate / Youden's J
//! - ROC curve over all observed thresholds
//! - AUC-ROC via the Mann–Whitney rank statistic

use serde::{Deserialize, Serialize};

use crate::error::{AnomalyError, Result};

/// Validate a labelled score set and count `(positives, negatives)`.
pub(crate) fn check_labelled(scores: &[f32], labels: &[bool]) -> Result<(usize, usize)> {
    if scores.len() != labels.len() {
        return Err(AnomalyError::InvalidParameter(format!(
            "{} scores but {} labels",
            scores.len(),
            labels.len()
        )));
    }
    if scores.iter().any(|s| s.is_nan()) {
        return Err(AnomalyError::InvalidParameter(
            "scores contain NaN".to_string(),
        ));
    }
    let positives = labels.iter().filter(|&&l| l).count();
    Ok((positives, labels.len() - positives))
}

#[inline]
fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Counts of a `score >= threshold` decision against ground truth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

impl ConfusionMatrix {
    /// Evaluate the decision rule at `threshold`.
    pub fn at_threshold(scores: &[f32], labels: &[bool], threshold: f32) -> Result<Self> {
        check_labelled(scores, labels)?;
        let mut m = Self::default();
        for (&s, &anomalous) in scores.iter().zip(labels) {
            match (s >= threshold, anomalous) {
                (true, true) => m.true_positives += 1,
                (true, false) => m.false_positives += 1,
                (false, false) => m.true_negatives += 1,
                (false, true) => m.false_negatives += 1,
            }
        }
        Ok(m)
    }

    pub fn total(&self) -> usize {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }

    /// TP / (TP + FP), 0 when nothing is predicted positive.
    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    /// TP / (TP + FN), 0 when there are no positives.
    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    /// 2·TP / (2·TP + FP + FN), 0 when undefined.
    pub fn f1(&self) -> f64 {
        ratio(
            2 * self.true_positives,
            2 * self.true_positives + self.false_positives + self.false_negatives,
        )
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positives + self.true_negatives, self.total())
    }

    /// FP / (FP + TN).
    pub fn false_positive_rate(&self) -> f64 {
        ratio(self.false_positives, self.false_positives + self.true_negatives)
    }

    /// Youden's J statistic, TPR − FPR.
    pub fn youden_j(&self) -> f64 {
        self.recall() - self.false_positive_rate()
    }
}

/// One operating point of a ROC curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RocPoint {
    pub threshold: f32,
    pub false_positive_rate: f64,
    pub true_positive_rate: f64,
}

/// ROC curve from `(0, 0)` at `+∞` through every observed score, descending.
pub fn roc_curve(scores: &[f32], labels: &[bool]) -> Result<Vec<RocPoint>> {
    let (positives, negatives) = check_labelled(scores, labels)?;
    if positives == 0 || negatives == 0 {
        return Err(AnomalyError::InsufficientData(
            "ROC needs both normal and anomalous labels".to_string(),
        ));
    }

    let mut pairs: Vec<(f32, bool)> = scores.iter().copied().zip(labels.iter().copied()).collect();
    pairs.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut curve = vec![RocPoint {
        threshold: f32::INFINITY,
        false_positive_rate: 0.0,
        true_positive_rate: 0.0,
    }];
    let (mut tp, mut fp) = (0usize, 0usize);
    let mut i = 0;
    while i < pairs.len() {
        let threshold = pairs[i].0;
        while i < pairs.len() && pairs[i].0 == threshold {
            if pairs[i].1 {
                tp += 1;
            } else {
                fp += 1;
            }
            i += 1;
        }
        curve.push(RocPoint {
            threshold,
            false_positive_rate: ratio(fp, negatives),
            true_positive_rate: ratio(tp, positives),
        });
    }
    Ok(curve)
}

/// Area under the ROC curve.
///
/// Computed as the probability that a random anomalous image outscores a
/// random normal one, ties counting one half (average ranks).
pub fn roc_auc(scores: &[f32], labels: &[bool]) -> Result<f64> {
    let (positives, negatives) = check_labelled(scores, labels)?;
    if positives == 0 || negatives == 0 {
        return Err(AnomalyError::InsufficientData(
            "AUC needs both normal and anomalous labels".to_string(),
        ));
    }

    let mut pairs: Vec<(f32, bool)> = scores.iter().copied().zip(labels.iter().copied()).collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut positive_rank_sum = 0.0f64;
    let mut i = 0;
    while i < pairs.len() {
        let mut j = i;
        while j < pairs.len() && pairs[j].0 == pairs[i].0 {
            j += 1;
        }
        // ranks i+1 ..= j share their mean
        let mean_rank = (i + 1 + j) as f64 / 2.0;
        let tied_positives = pairs[i..j].iter().filter(|p| p.1).count();
        positive_rank_sum += mean_rank * tied_positives as f64;
        i = j;
    }

    let p = positives as f64;
    let u = positive_rank_sum - p * (p + 1.0) / 2.0;
    Ok(u / (p * negatives as f64))
}
