//! Flattened S×S grids of patch feature vectors.

use super::FeatureMap;
use crate::error::{AnomalyError, Result};

/// Flat index of grid cell `(row, col)` in an `side`×`side` row-major grid.
#[inline]
#[must_use]
pub fn flat_index(side: usize, row: usize, col: usize) -> usize {
    row * side + col
}

/// Inverse of [`flat_index`].
#[inline]
#[must_use]
pub fn grid_position(side: usize, index: usize) -> (usize, usize) {
    (index / side, index % side)
}

/// Per-image output of the feature extractor.
///
/// `side * side` vectors of `dim` values each, stored patch-major: the vector
/// for cell `(r, c)` occupies `data[i * dim..(i + 1) * dim]` with
/// `i = r * side + c`.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchGrid {
    side: usize,
    dim: usize,
    data: Vec<f32>,
}

impl PatchGrid {
    /// Wrap patch-major data.
    pub fn new(side: usize, dim: usize, data: Vec<f32>) -> Result<Self> {
        if side == 0 || dim == 0 {
            return Err(AnomalyError::InvalidParameter(format!(
                "patch grid {side}x{side} of {dim}-d vectors is empty"
            )));
        }
        if data.len() != side * side * dim {
            return Err(AnomalyError::InvalidParameter(format!(
                "patch grid {side}x{side}x{dim} needs {} values, got {}",
                side * side * dim,
                data.len()
            )));
        }
        Ok(Self { side, dim, data })
    }

    /// Transpose a square channel-major map into patch-major vectors.
    pub fn from_feature_map(map: &FeatureMap) -> Result<Self> {
        let (h, w) = map.hw();
        if h != w {
            return Err(AnomalyError::Backbone(format!(
                "patch grids must be square, got {h}x{w}"
            )));
        }
        let dim = map.channels();
        // [c, r, col] -> [r, col, c]; logical iteration order is patch-major.
        let data: Vec<f32> = map.view().permuted_axes([1, 2, 0]).iter().copied().collect();
        Self::new(h, dim, data)
    }

    /// Grid side length `S`.
    pub fn side(&self) -> usize {
        self.side
    }

    /// Feature dimensionality `D`.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of patches, `S·S`.
    pub fn len(&self) -> usize {
        self.side * self.side
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vector at flat index `index`.
    pub fn patch(&self, index: usize) -> Option<&[f32]> {
        if index >= self.len() {
            return None;
        }
        Some(&self.data[index * self.dim..(index + 1) * self.dim])
    }

    /// Vector at grid cell `(row, col)`.
    pub fn patch_at(&self, row: usize, col: usize) -> Option<&[f32]> {
        if row >= self.side || col >= self.side {
            return None;
        }
        self.patch(flat_index(self.side, row, col))
    }

    /// Vectors in row-major order.
    pub fn iter(&self) -> std::slice::ChunksExact<'_, f32> {
        self.data.chunks_exact(self.dim)
    }

    pub fn as_flat(&self) -> &[f32] {
        &self.data
    }

    pub fn into_flat(self) -> Vec<f32> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_roundtrip() {
        let side = 7;
        for i in 0..side * side {
            let (r, c) = grid_position(side, i);
            assert_eq!(flat_index(side, r, c), i);
        }
    }

    #[test]
    fn transpose_places_channels_per_patch() {
        // 2 channels on a 2x2 grid
        let map = FeatureMap::new(
            2,
            2,
            2,
            vec![
                0.0, 1.0, 2.0, 3.0, // channel 0
                10.0, 11.0, 12.0, 13.0, // channel 1
            ],
        )
        .unwrap();
        let grid = PatchGrid::from_feature_map(&map).unwrap();
        assert_eq!(grid.len(), 4);
        assert_eq!(grid.dim(), 2);
        assert_eq!(grid.patch_at(0, 1).unwrap(), &[1.0, 11.0]);
        assert_eq!(grid.patch_at(1, 0).unwrap(), &[2.0, 12.0]);
        assert_eq!(grid.iter().count(), 4);
        assert!(grid.patch(4).is_none());
    }

    #[test]
    fn non_square_map_is_a_backbone_error() {
        let map = FeatureMap::zeros(1, 2, 3).unwrap();
        assert!(matches!(
            PatchGrid::from_feature_map(&map),
            Err(AnomalyError::Backbone(_))
        ));
    }
}
