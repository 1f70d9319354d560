//! Pooling reference grids into a bank and subsampling it.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::MemoryBank;
use crate::error::{AnomalyError, Result};
use crate::feature::{Backbone, FeatureExtractor, PatchGrid};
use crate::image::Image;

/// Bank construction parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BankConfig {
    /// Fraction of pooled patch vectors kept, in `(0, 1]`.
    pub sample_fraction: f64,
    /// Seed for the subsampling draw. `None` draws a fresh seed from entropy.
    pub seed: Option<u64>,
}

impl Default for BankConfig {
    fn default() -> Self {
        Self {
            sample_fraction: 0.1,
            seed: None,
        }
    }
}

impl BankConfig {
    #[must_use]
    pub fn with_sample_fraction(mut self, sample_fraction: f64) -> Self {
        self.sample_fraction = sample_fraction;
        self
    }

    /// Fix the subsampling seed so repeated builds yield identical banks.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_fraction(self.sample_fraction)
    }

    /// Generator for the subsampling draw, with the seed it was built from.
    ///
    /// Uses `seed` when set, otherwise a fresh seed from the thread RNG.
    pub fn rng(&self) -> (u64, StdRng) {
        let seed = self.seed.unwrap_or_else(|| rand::rng().random());
        (seed, StdRng::seed_from_u64(seed))
    }
}

/// What a build pooled and kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildReport {
    pub images: usize,
    pub pooled: usize,
    pub kept: usize,
}

fn validate_fraction(fraction: f64) -> Result<()> {
    if fraction.is_nan() || !(0.0..=1.0).contains(&fraction) {
        return Err(AnomalyError::InvalidParameter(format!(
            "sample fraction must lie in (0, 1], got {fraction}"
        )));
    }
    if fraction == 0.0 {
        return Err(AnomalyError::InsufficientData(
            "sample fraction of 0 keeps no reference vectors".to_string(),
        ));
    }
    Ok(())
}

/// `round(fraction × pooled)`, at least one vector.
fn kept_count(fraction: f64, pooled: usize) -> usize {
    let kept = (fraction * pooled as f64).round() as usize;
    if kept == 0 {
        warn!(
            fraction,
            pooled, "sample fraction rounds to zero vectors; keeping one"
        );
        return 1;
    }
    kept.min(pooled)
}

impl MemoryBank {
    /// Extract every reference image and subsample the pooled patches
    /// according to `config`.
    pub fn build<B: Backbone>(
        extractor: &FeatureExtractor<B>,
        images: &[Image],
        config: &BankConfig,
    ) -> Result<Self> {
        config.validate()?;
        let (_, mut rng) = config.rng();
        let (bank, _) = Self::build_with_rng(extractor, images, config.sample_fraction, &mut rng)?;
        Ok(bank)
    }

    /// Like [`MemoryBank::build`] with an explicit random source.
    pub fn build_with_rng<B: Backbone, R: Rng + ?Sized>(
        extractor: &FeatureExtractor<B>,
        images: &[Image],
        sample_fraction: f64,
        rng: &mut R,
    ) -> Result<(Self, BuildReport)> {
        validate_fraction(sample_fraction)?;
        if images.is_empty() {
            return Err(AnomalyError::InsufficientData(
                "no reference images supplied".to_string(),
            ));
        }
        let grids = extractor.extract_all(images)?;
        Self::from_grids(&grids, sample_fraction, rng)
    }

    /// Pool already-extracted grids and draw a uniform subsample without
    /// replacement. Kept vectors are exact copies of pooled ones, stored in
    /// pool order.
    pub fn from_grids<R: Rng + ?Sized>(
        grids: &[PatchGrid],
        sample_fraction: f64,
        rng: &mut R,
    ) -> Result<(Self, BuildReport)> {
        validate_fraction(sample_fraction)?;
        let first = grids.first().ok_or_else(|| {
            AnomalyError::InsufficientData("no reference grids supplied".to_string())
        })?;
        let dim = first.dim();
        if let Some(bad) = grids.iter().find(|g| g.dim() != dim) {
            return Err(AnomalyError::DimensionMismatch {
                expected: dim,
                actual: bad.dim(),
            });
        }

        let pooled: usize = grids.iter().map(PatchGrid::len).sum();
        let kept = kept_count(sample_fraction, pooled);

        let mut picks = index::sample(rng, pooled, kept).into_vec();
        picks.sort_unstable();

        let mut vectors = Vec::with_capacity(kept * dim);
        let mut grid_iter = grids.iter();
        let mut current = grid_iter.next();
        let mut offset = 0usize;
        for pick in picks {
            while let Some(grid) = current {
                if pick < offset + grid.len() {
                    break;
                }
                offset += grid.len();
                current = grid_iter.next();
            }
            let patch = current
                .and_then(|g| g.patch(pick - offset))
                .ok_or_else(|| {
                    AnomalyError::InvalidParameter(format!("sample index {pick} out of range"))
                })?;
            vectors.extend_from_slice(patch);
        }

        let report = BuildReport {
            images: grids.len(),
            pooled,
            kept,
        };
        info!(
            images = report.images,
            pooled = report.pooled,
            kept = report.kept,
            fraction = sample_fraction,
            "built memory bank"
        );
        Ok((Self::from_flat(dim, vectors)?, report))
    }
}
