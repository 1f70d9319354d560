//! End-to-end detector: fit on normal images, calibrate, predict.

use tracing::info;

use crate::calibration::{calibrate, CalibrationConfig, Threshold};
use crate::config::PatchCoreConfig;
use crate::error::{AnomalyError, Result};
use crate::feature::{Backbone, ConvBackbone, FeatureExtractor};
use crate::image::Image;
use crate::memory::{BuildReport, MemoryBank};
use crate::scoring::{AnomalyScorer, HeatMap, ScoredImage};

/// Decision for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub score: f32,
    pub is_anomalous: bool,
    pub heat_map: HeatMap,
    /// Per-pixel `heat >= threshold`, row-major.
    pub mask: Vec<bool>,
}

/// A scorer plus an optional calibrated threshold.
#[derive(Debug, Clone)]
pub struct AnomalyDetector<B> {
    scorer: AnomalyScorer<B>,
    calibration: CalibrationConfig,
    threshold: Option<Threshold>,
    report: Option<BuildReport>,
}

impl<B: Backbone> AnomalyDetector<B> {
    /// Build the memory bank from normal reference images.
    pub fn fit(backbone: B, good: &[Image], config: &PatchCoreConfig) -> Result<Self> {
        config.extractor.validate()?;
        config.bank.validate()?;
        config.calibration.validate()?;

        let extractor = FeatureExtractor::new(backbone, config.extractor.clone())?;
        let (seed, mut rng) = config.bank.rng();
        let (bank, report) =
            MemoryBank::build_with_rng(&extractor, good, config.bank.sample_fraction, &mut rng)?;
        info!(
            images = report.images,
            pooled = report.pooled,
            kept = report.kept,
            seed,
            "detector fitted"
        );

        Ok(Self {
            scorer: AnomalyScorer::new(extractor, bank),
            calibration: config.calibration.clone(),
            threshold: None,
            report: Some(report),
        })
    }

    /// Wrap an existing scorer.
    pub fn from_parts(scorer: AnomalyScorer<B>, calibration: CalibrationConfig) -> Self {
        Self {
            scorer,
            calibration,
            threshold: None,
            report: None,
        }
    }

    pub fn scorer(&self) -> &AnomalyScorer<B> {
        &self.scorer
    }

    pub fn bank(&self) -> &MemoryBank {
        self.scorer.bank()
    }

    /// Counts from [`AnomalyDetector::fit`], if this detector was fitted.
    pub fn build_report(&self) -> Option<BuildReport> {
        self.report
    }

    pub fn threshold(&self) -> Option<Threshold> {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: Threshold) {
        self.threshold = Some(threshold);
    }

    pub fn score(&self, image: &Image) -> Result<ScoredImage> {
        self.scorer.score(image)
    }

    /// Fix the threshold from already-computed scores using the configured
    /// policy.
    pub fn calibrate_scores(&mut self, scores: &[f32], labels: &[bool]) -> Result<Threshold> {
        let threshold = calibrate(scores, labels, &self.calibration.policy)?;
        self.threshold = Some(threshold);
        Ok(threshold)
    }

    /// Decide one image. Fails with [`AnomalyError::NotCalibrated`] until a
    /// threshold exists.
    pub fn predict(&self, image: &Image) -> Result<Prediction> {
        let threshold = self.threshold.ok_or(AnomalyError::NotCalibrated)?;
        let scored = self.scorer.score(image)?;
        let mask = scored.heat_map.segment(threshold.value());
        Ok(Prediction {
            score: scored.score,
            is_anomalous: threshold.is_anomalous(scored.score),
            heat_map: scored.heat_map,
            mask,
        })
    }
}

#[cfg(not(feature = "parallel"))]
impl<B: Backbone> AnomalyDetector<B> {
    pub fn score_batch(&self, images: &[Image]) -> Result<Vec<ScoredImage>> {
        self.scorer.score_batch(images)
    }

    /// Score labelled images and fix the threshold from them.
    pub fn calibrate(&mut self, images: &[Image], labels: &[bool]) -> Result<Threshold> {
        let scores = self.scorer.scores(images)?;
        self.calibrate_scores(&scores, labels)
    }
}

#[cfg(feature = "parallel")]
impl<B: Backbone + Sync> AnomalyDetector<B> {
    pub fn score_batch(&self, images: &[Image]) -> Result<Vec<ScoredImage>> {
        self.scorer.score_batch(images)
    }

    /// Score labelled images and fix the threshold from them.
    pub fn calibrate(&mut self, images: &[Image], labels: &[bool]) -> Result<Threshold> {
        let scores = self.scorer.scores(images)?;
        self.calibrate_scores(&scores, labels)
    }
}

impl AnomalyDetector<ConvBackbone> {
    /// Fit with the backbone described by `config.backbone`.
    pub fn from_config(config: &PatchCoreConfig, good: &[Image]) -> Result<Self> {
        let backbone = ConvBackbone::new(config.backbone.clone())?;
        Self::fit(backbone, good, config)
    }
}
