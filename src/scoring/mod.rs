//! Nearest-neighbour anomaly scoring.
//!
//! For each of the S·S patches of a query image the scorer finds the closest
//! bank vector. The image score is the **maximum** of those distances: a
//! single badly matching patch is enough to flag the whole image.
//!
//! The per-patch distances, folded back into an S×S [`AnomalyMap`] and
//! bilinearly upsampled to a [`HeatMap`], localise the anomaly.

mod map;

pub use map::{AnomalyMap, HeatMap};

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::debug;

use crate::error::{AnomalyError, Result};
use crate::feature::{Backbone, FeatureExtractor, PatchGrid};
use crate::image::Image;
use crate::memory::MemoryBank;

/// Scores and maps for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredImage {
    /// Worst-patch nearest-bank distance.
    pub score: f32,
    /// Per-patch distances on the S×S grid.
    pub patch_map: AnomalyMap,
    /// `patch_map` upsampled to image resolution.
    pub heat_map: HeatMap,
    /// Bank row matched by each patch, row-major.
    pub nearest: Vec<u32>,
}

/// Nearest-bank distance of every patch of `grid`.
///
/// Returns `(score, patch_map, nearest)` where `score == patch_map.max()`.
pub fn score_grid(grid: &PatchGrid, bank: &MemoryBank) -> Result<(f32, AnomalyMap, Vec<u32>)> {
    let hits = bank.nearest_all(grid)?;
    let mut distances = Vec::with_capacity(hits.len());
    let mut nearest = Vec::with_capacity(hits.len());
    for hit in hits {
        distances.push(hit.distance);
        nearest.push(hit.index);
    }
    let score = distances.iter().copied().fold(0.0f32, f32::max);
    let patch_map = AnomalyMap::from_flat(grid.side(), distances)?;
    Ok((score, patch_map, nearest))
}

/// Owns the reference bank for one evaluation session and scores images
/// against it.
#[derive(Debug, Clone)]
pub struct AnomalyScorer<B> {
    extractor: FeatureExtractor<B>,
    bank: MemoryBank,
}

impl<B: Backbone> AnomalyScorer<B> {
    pub fn new(extractor: FeatureExtractor<B>, bank: MemoryBank) -> Self {
        Self { extractor, bank }
    }

    pub fn extractor(&self) -> &FeatureExtractor<B> {
        &self.extractor
    }

    pub fn bank(&self) -> &MemoryBank {
        &self.bank
    }

    /// Release the bank, ending the session.
    pub fn into_parts(self) -> (FeatureExtractor<B>, MemoryBank) {
        (self.extractor, self.bank)
    }

    /// Score one image.
    pub fn score(&self, image: &Image) -> Result<ScoredImage> {
        if self.bank.is_empty() {
            return Err(AnomalyError::EmptyBank);
        }
        let grid = self.extractor.extract(image)?;
        let (score, patch_map, nearest) = score_grid(&grid, &self.bank)?;
        let heat_map = patch_map.upsample(image.height(), image.width())?;
        debug!(score, side = patch_map.side(), "scored image");
        Ok(ScoredImage {
            score,
            patch_map,
            heat_map,
            nearest,
        })
    }

    /// Score images independently; the output is in input order.
    #[cfg(not(feature = "parallel"))]
    pub fn score_batch(&self, images: &[Image]) -> Result<Vec<ScoredImage>> {
        images.iter().map(|img| self.score(img)).collect()
    }

    /// Score images independently; the output is in input order.
    #[cfg(feature = "parallel")]
    pub fn score_batch(&self, images: &[Image]) -> Result<Vec<ScoredImage>>
    where
        B: Sync,
    {
        images.par_iter().map(|img| self.score(img)).collect()
    }

    /// Image-level scores only.
    #[cfg(not(feature = "parallel"))]
    pub fn scores(&self, images: &[Image]) -> Result<Vec<f32>> {
        images.iter().map(|img| self.score(img).map(|s| s.score)).collect()
    }

    /// Image-level scores only.
    #[cfg(feature = "parallel")]
    pub fn scores(&self, images: &[Image]) -> Result<Vec<f32>>
    where
        B: Sync,
    {
        images
            .par_iter()
            .map(|img| self.score(img).map(|s| s.score))
            .collect()
    }
}
