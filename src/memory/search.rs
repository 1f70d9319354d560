//! Exact nearest-neighbour scan over the bank.
//!
//! Callers validate dimensions and non-emptiness first.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::{MemoryBank, Neighbor};
use crate::distance;
use crate::feature::PatchGrid;

/// Ties resolve to the lowest bank row.
pub(super) fn nearest(bank: &MemoryBank, query: &[f32]) -> Neighbor {
    let mut best_row = 0usize;
    let mut best = f32::INFINITY;
    for (row, candidate) in bank.iter().enumerate() {
        let d = distance::l2_distance_squared(query, candidate);
        if d < best {
            best = d;
            best_row = row;
        }
    }
    Neighbor {
        index: best_row as u32,
        distance: best.sqrt(),
    }
}

#[cfg(not(feature = "parallel"))]
pub(super) fn nearest_all(bank: &MemoryBank, grid: &PatchGrid) -> Vec<Neighbor> {
    grid.iter().map(|q| nearest(bank, q)).collect()
}

/// Patches are independent, and `collect` keeps their row-major order.
#[cfg(feature = "parallel")]
pub(super) fn nearest_all(bank: &MemoryBank, grid: &PatchGrid) -> Vec<Neighbor> {
    grid.as_flat()
        .par_chunks_exact(grid.dim())
        .map(|q| nearest(bank, q))
        .collect()
}
