use serde::{Deserialize, Serialize};
use tracing::info;

use super::Threshold;
use crate::error::{AnomalyError, Result};
use crate::metrics::{check_labelled, ConfusionMatrix};

/// Objective maximised by the metric-optimal policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationMetric {
    #[default]
    F1,
    Accuracy,
    /// Youden's J, TPR − FPR.
    Youden,
}

impl CalibrationMetric {
    pub fn evaluate(self, m: &ConfusionMatrix) -> f64 {
        match self {
            CalibrationMetric::F1 => m.f1(),
            CalibrationMetric::Accuracy => m.accuracy(),
            CalibrationMetric::Youden => m.youden_j(),
        }
    }
}

/// `metric` at every unique score, ascending by candidate.
///
/// Each candidate `t` classifies `score >= t` as anomalous. One sort plus a
/// suffix count keeps the sweep `O(n log n)`.
pub fn metric_sweep(
    scores: &[f32],
    labels: &[bool],
    metric: CalibrationMetric,
) -> Result<Vec<(f32, f64)>> {
    let (positives, negatives) = check_labelled(scores, labels)?;
    if positives == 0 || negatives == 0 {
        return Err(AnomalyError::InsufficientData(format!(
            "metric calibration needs both classes, got {positives} anomalous and {negatives} normal"
        )));
    }

    let mut pairs: Vec<(f32, bool)> = scores.iter().copied().zip(labels.iter().copied()).collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    // Everything before index `i` is predicted normal.
    let mut out = Vec::new();
    let (mut below_pos, mut below_neg) = (0usize, 0usize);
    let mut i = 0;
    while i < pairs.len() {
        let candidate = pairs[i].0;
        let m = ConfusionMatrix {
            true_positives: positives - below_pos,
            false_positives: negatives - below_neg,
            true_negatives: below_neg,
            false_negatives: below_pos,
        };
        out.push((candidate, metric.evaluate(&m)));
        while i < pairs.len() && pairs[i].0 == candidate {
            if pairs[i].1 {
                below_pos += 1;
            } else {
                below_neg += 1;
            }
            i += 1;
        }
    }
    Ok(out)
}

/// Threshold maximising `metric`; the lowest candidate wins ties.
pub fn calibrate_with_metric(
    scores: &[f32],
    labels: &[bool],
    metric: CalibrationMetric,
) -> Result<Threshold> {
    let sweep = metric_sweep(scores, labels, metric)?;
    let mut best = sweep[0];
    for &(candidate, value) in &sweep[1..] {
        if value > best.1 {
            best = (candidate, value);
        }
    }
    info!(
        ?metric,
        threshold = best.0,
        value = best.1,
        candidates = sweep.len(),
        "metric-optimal threshold"
    );
    Threshold::new(best.0)
}

/// F1-optimal threshold over labelled scores.
pub fn calibrate_by_metric(scores: &[f32], labels: &[bool]) -> Result<Threshold> {
    calibrate_with_metric(scores, labels, CalibrationMetric::F1)
}
