//! Patch-feature extraction from a frozen backbone.
//!
//! # Pipeline
//!
//! ```text
//! image ──▶ backbone ──┬─▶ early map (C₁×H₁×W₁) ─▶ 3×3 avg ─▶ adaptive pool ─┐
//!                      └─▶ late map  (C₂×H₂×W₂) ─▶ 3×3 avg ─▶ adaptive pool ─┴▶ concat ─▶ S·S × D
//! ```
//!
//! The local average widens each activation's receptive field without
//! changing resolution. Adaptive pooling then brings both maps onto one
//! S×S grid so a grid cell holds `D = C₁ + C₂` values describing the same
//! image region at two levels of abstraction.
//!
//! # Row-major invariant
//!
//! Cell `(r, c)` of an S×S grid is stored at flat index `r·S + c`
//! ([`flat_index`] / [`grid_position`]). Scoring relies on this to fold the
//! per-patch distance sequence back into a map.

pub mod backbone;
pub mod extractor;
pub mod grid;
pub mod resample;

pub use backbone::{conv_output_hw, Backbone, ConvBackbone, ConvBackboneConfig, ConvLayerWeights};
pub use extractor::{ExtractorConfig, FeatureExtractor, GridAlignment};
pub use grid::{flat_index, grid_position, PatchGrid};

use ndarray::{Array3, ArrayView2, ArrayView3, Axis};

use crate::error::{AnomalyError, Result};

/// Activation map of one backbone layer for one image, indexed
/// `[channel, row, col]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMap {
    data: Array3<f32>,
}

impl FeatureMap {
    /// Wrap a channel-major buffer.
    pub fn new(channels: usize, height: usize, width: usize, data: Vec<f32>) -> Result<Self> {
        let expected = channels * height * width;
        if expected != 0 && data.len() != expected {
            return Err(AnomalyError::InvalidParameter(format!(
                "feature map {channels}x{height}x{width} needs {expected} values, got {}",
                data.len()
            )));
        }
        let data = Array3::from_shape_vec((channels, height, width), data).map_err(|e| {
            AnomalyError::InvalidParameter(format!("feature map {channels}x{height}x{width}: {e}"))
        })?;
        Self::from_array(data)
    }

    pub fn from_array(data: Array3<f32>) -> Result<Self> {
        if data.is_empty() {
            let (c, h, w) = data.dim();
            return Err(AnomalyError::InvalidParameter(format!(
                "feature map {c}x{h}x{w} has no cells"
            )));
        }
        Ok(Self { data })
    }

    pub fn zeros(channels: usize, height: usize, width: usize) -> Result<Self> {
        Self::from_array(Array3::zeros((channels, height, width)))
    }

    pub fn channels(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn height(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    pub fn width(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    /// `(height, width)`.
    pub fn hw(&self) -> (usize, usize) {
        (self.height(), self.width())
    }

    pub fn array(&self) -> &Array3<f32> {
        &self.data
    }

    pub fn view(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    pub fn into_array(self) -> Array3<f32> {
        self.data
    }

    /// One channel plane, `None` past the last channel.
    pub fn plane(&self, channel: usize) -> Option<ArrayView2<'_, f32>> {
        (channel < self.channels()).then(|| self.data.index_axis(Axis(0), channel))
    }

    /// False if any activation is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    /// Concatenate maps along the channel axis. All maps must share `(h, w)`.
    pub fn concat_channels(maps: &[FeatureMap]) -> Result<FeatureMap> {
        let first = maps.first().ok_or_else(|| {
            AnomalyError::InvalidParameter("nothing to concatenate".to_string())
        })?;
        let (h, w) = first.hw();
        if let Some(bad) = maps.iter().find(|m| m.hw() != (h, w)) {
            return Err(AnomalyError::Backbone(format!(
                "cannot concatenate {h}x{w} with {}x{} maps",
                bad.height(),
                bad.width()
            )));
        }
        let views: Vec<ArrayView3<'_, f32>> = maps.iter().map(FeatureMap::view).collect();
        let data = ndarray::concatenate(Axis(0), &views)
            .map_err(|e| AnomalyError::Backbone(format!("channel concat: {e}")))?;
        Self::from_array(data)
    }
}
