//! Reference memory bank of "normal" patch features.
//!
//! The bank is a flat row-major `n × D` matrix. It is built once from
//! known-good images, then only read.
//!
//! # Why brute force
//!
//! Subsampling bounds the bank to a few hundred or thousand vectors per
//! category. At that size an exact scan is both faster than building a graph
//! index and free of recall loss, which matters because the image score is a
//! maximum over patches: one missed neighbour inflates it directly.

mod builder;
mod search;

pub use builder::{BankConfig, BuildReport};

use crate::error::{AnomalyError, Result};
use crate::feature::PatchGrid;

/// Nearest bank vector for one query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Row of the matched bank vector.
    pub index: u32,
    /// Euclidean distance to it.
    pub distance: f32,
}

/// Immutable collection of reference patch vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryBank {
    dimension: usize,
    vectors: Vec<f32>,
}

impl MemoryBank {
    /// Wrap a flat row-major matrix. An empty matrix is allowed; scoring
    /// against it fails with [`AnomalyError::EmptyBank`].
    pub fn from_flat(dimension: usize, vectors: Vec<f32>) -> Result<Self> {
        if dimension == 0 {
            return Err(AnomalyError::InvalidParameter(
                "bank dimension must be > 0".to_string(),
            ));
        }
        if vectors.len() % dimension != 0 {
            return Err(AnomalyError::InvalidParameter(format!(
                "{} values is not a whole number of {dimension}-d vectors",
                vectors.len()
            )));
        }
        if vectors.len() / dimension > u32::MAX as usize {
            return Err(AnomalyError::InvalidParameter(
                "bank exceeds u32 addressable rows".to_string(),
            ));
        }
        Ok(Self { dimension, vectors })
    }

    /// Number of vectors.
    pub fn len(&self) -> usize {
        self.vectors.len() / self.dimension
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Vector dimensionality `D`.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn vector(&self, index: usize) -> Option<&[f32]> {
        if index >= self.len() {
            return None;
        }
        Some(&self.vectors[index * self.dimension..(index + 1) * self.dimension])
    }

    pub fn iter(&self) -> std::slice::ChunksExact<'_, f32> {
        self.vectors.chunks_exact(self.dimension)
    }

    pub fn as_flat(&self) -> &[f32] {
        &self.vectors
    }

    /// Approximate heap footprint.
    pub fn size_bytes(&self) -> usize {
        self.vectors.len() * std::mem::size_of::<f32>()
    }

    /// Exact nearest neighbour of one query vector.
    pub fn nearest(&self, query: &[f32]) -> Result<Neighbor> {
        self.check_query(query.len())?;
        Ok(search::nearest(self, query))
    }

    /// Nearest neighbour of every patch, in the grid's row-major order.
    pub fn nearest_all(&self, grid: &PatchGrid) -> Result<Vec<Neighbor>> {
        self.check_query(grid.dim())?;
        Ok(search::nearest_all(self, grid))
    }

    fn check_query(&self, dim: usize) -> Result<()> {
        if self.is_empty() {
            return Err(AnomalyError::EmptyBank);
        }
        if dim != self.dimension {
            return Err(AnomalyError::DimensionMismatch {
                expected: self.dimension,
                actual: dim,
            });
        }
        Ok(())
    }
}
