//! Patch-level anomaly maps and their pixel-resolution heat maps.

use ndarray::ArrayView2;

use crate::error::{AnomalyError, Result};
use crate::feature::resample::bilinear_resize;
use crate::feature::{flat_index, grid_position};

/// S×S grid of per-patch nearest-bank distances, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyMap {
    side: usize,
    values: Vec<f32>,
}

impl AnomalyMap {
    /// Fold a row-major sequence of `side²` distances back into a grid.
    pub fn from_flat(side: usize, values: Vec<f32>) -> Result<Self> {
        if side == 0 || values.len() != side * side {
            return Err(AnomalyError::InvalidParameter(format!(
                "{} values cannot form a {side}x{side} map",
                values.len()
            )));
        }
        Ok(Self { side, values })
    }

    pub fn side(&self) -> usize {
        self.side
    }

    /// Value at cell `(row, col)`.
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row >= self.side || col >= self.side {
            return None;
        }
        Some(self.values[flat_index(self.side, row, col)])
    }

    /// Grid cell holding the largest value (first in row-major order on ties).
    pub fn argmax(&self) -> (usize, usize) {
        let mut best = 0usize;
        for (i, &v) in self.values.iter().enumerate() {
            if v > self.values[best] {
                best = i;
            }
        }
        grid_position(self.side, best)
    }

    pub fn max(&self) -> f32 {
        self.values.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }

    /// Rows of the grid, top to bottom.
    pub fn rows(&self) -> std::slice::ChunksExact<'_, f32> {
        self.values.chunks_exact(self.side)
    }

    pub fn as_flat(&self) -> &[f32] {
        &self.values
    }

    pub fn into_flat(self) -> Vec<f32> {
        self.values
    }

    /// Bilinear upsampling to `height`×`width` pixels.
    pub fn upsample(&self, height: usize, width: usize) -> Result<HeatMap> {
        if height == 0 || width == 0 {
            return Err(AnomalyError::InvalidParameter(format!(
                "cannot upsample to {height}x{width}"
            )));
        }
        let grid = ArrayView2::from_shape((self.side, self.side), self.values.as_slice())
            .map_err(|e| AnomalyError::InvalidParameter(format!("anomaly map: {e}")))?;
        let values = bilinear_resize(grid, height, width).iter().copied().collect();
        Ok(HeatMap {
            height,
            width,
            values,
        })
    }
}

/// Dense per-pixel anomaly intensity aligned with the input image.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatMap {
    height: usize,
    width: usize,
    values: Vec<f32>,
}

impl HeatMap {
    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn get(&self, y: usize, x: usize) -> Option<f32> {
        if y >= self.height || x >= self.width {
            return None;
        }
        Some(self.values[y * self.width + x])
    }

    pub fn as_flat(&self) -> &[f32] {
        &self.values
    }

    pub fn max(&self) -> f32 {
        self.values.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }

    pub fn min(&self) -> f32 {
        self.values.iter().copied().fold(f32::INFINITY, f32::min)
    }

    /// Binary segmentation: `true` where the intensity reaches `threshold`.
    pub fn segment(&self, threshold: f32) -> Vec<bool> {
        self.values.iter().map(|&v| v >= threshold).collect()
    }

    /// Min-max scaled copy in `[0, 1]`; a flat map becomes all zeros.
    pub fn normalized(&self) -> Vec<f32> {
        let (lo, hi) = (self.min(), self.max());
        let span = hi - lo;
        if span.is_nan() || span <= 0.0 {
            return vec![0.0; self.values.len()];
        }
        self.values.iter().map(|&v| (v - lo) / span).collect()
    }
}
