//! Decision-threshold calibration.
//!
//! Two interchangeable, stateless policies turn scores into a [`Threshold`]:
//!
//! - **Statistical** ([`calibrate_statistical`]): `mean + k·σ` over scores of
//!   normal images only. Usable before any anomalous sample exists.
//! - **Metric-optimal** ([`calibrate_by_metric`], [`calibrate_with_metric`]):
//!   sweep every observed score as a candidate and keep the one maximising a
//!   binary classification metric (F1 by default).
//!
//! Downstream code applies the threshold with `score >= threshold`.

mod statistical;
mod sweep;

pub use statistical::calibrate_statistical;
pub use sweep::{calibrate_by_metric, calibrate_with_metric, metric_sweep, CalibrationMetric};

use serde::{Deserialize, Serialize};

use crate::error::{AnomalyError, Result};

/// Scalar boundary between predicted-normal and predicted-anomalous.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Threshold(f32);

impl Threshold {
    pub fn new(value: f32) -> Result<Self> {
        if value.is_nan() {
            return Err(AnomalyError::InvalidParameter(
                "threshold is NaN".to_string(),
            ));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> f32 {
        self.0
    }

    /// `score >= threshold`.
    #[inline]
    pub fn is_anomalous(self, score: f32) -> bool {
        score >= self.0
    }
}

/// How a threshold is derived from calibration scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ThresholdPolicy {
    /// `mean + k·σ` over normal-labelled scores.
    Statistical { k: f32 },
    /// Best candidate under a classification metric.
    MetricOptimal { metric: CalibrationMetric },
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        ThresholdPolicy::Statistical { k: 3.0 }
    }
}

/// Calibration parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub policy: ThresholdPolicy,
}

impl CalibrationConfig {
    pub fn validate(&self) -> Result<()> {
        if let ThresholdPolicy::Statistical { k } = self.policy {
            if !k.is_finite() {
                return Err(AnomalyError::InvalidParameter(format!(
                    "statistical k must be finite, got {k}"
                )));
            }
        }
        Ok(())
    }
}

/// Apply `policy` to labelled scores.
///
/// The statistical policy only looks at scores labelled normal.
pub fn calibrate(scores: &[f32], labels: &[bool], policy: &ThresholdPolicy) -> Result<Threshold> {
    match *policy {
        ThresholdPolicy::Statistical { k } => {
            crate::metrics::check_labelled(scores, labels)?;
            let normal: Vec<f32> = scores
                .iter()
                .zip(labels)
                .filter(|(_, &anomalous)| !anomalous)
                .map(|(&s, _)| s)
                .collect();
            calibrate_statistical(&normal, k)
        }
        ThresholdPolicy::MetricOptimal { metric } => calibrate_with_metric(scores, labels, metric),
    }
}
