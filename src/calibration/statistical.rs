use tracing::info;

use super::Threshold;
use crate::error::{AnomalyError, Result};

/// `mean(scores) + k × population_stddev(scores)`.
///
/// Intended for scores of normal images only. Non-decreasing in `k`.
pub fn calibrate_statistical(scores: &[f32], k: f32) -> Result<Threshold> {
    if scores.is_empty() {
        return Err(AnomalyError::InsufficientData(
            "statistical calibration needs at least one normal score".to_string(),
        ));
    }
    if !k.is_finite() {
        return Err(AnomalyError::InvalidParameter(format!(
            "k must be finite, got {k}"
        )));
    }
    if scores.iter().any(|s| !s.is_finite()) {
        return Err(AnomalyError::InvalidParameter(
            "scores must be finite".to_string(),
        ));
    }

    let n = scores.len() as f64;
    let mean = scores.iter().map(|&s| f64::from(s)).sum::<f64>() / n;
    let variance = scores
        .iter()
        .map(|&s| (f64::from(s) - mean).powi(2))
        .sum::<f64>()
        / n;
    let std_dev = variance.sqrt();
    let value = (mean + f64::from(k) * std_dev) as f32;

    info!(mean, std_dev, k, threshold = value, "statistical threshold");
    Threshold::new(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_plus_k_sigma() {
        // mean 5, population std 2
        let scores = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(calibrate_statistical(&scores, 0.0).unwrap().value(), 5.0);
        assert_eq!(calibrate_statistical(&scores, 3.0).unwrap().value(), 11.0);
        assert_eq!(calibrate_statistical(&scores, -1.0).unwrap().value(), 3.0);
    }

    #[test]
    fn single_score_has_zero_spread() {
        assert_eq!(calibrate_statistical(&[0.7], 3.0).unwrap().value(), 0.7);
    }

    #[test]
    fn empty_is_insufficient() {
        assert!(matches!(
            calibrate_statistical(&[], 3.0),
            Err(AnomalyError::InsufficientData(_))
        ));
    }

    #[test]
    fn rejects_non_finite_inputs() {
        assert!(calibrate_statistical(&[1.0], f32::NAN).is_err());
        assert!(calibrate_statistical(&[1.0, f32::INFINITY], 1.0).is_err());
    }
}
