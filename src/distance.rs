//! Distance between patch feature vectors.
//!
//! Scoring uses Euclidean distance only. The bank scan compares squared
//! distances and takes a single square root of the winner; since `sqrt` is
//! monotone this returns exactly the minimum of the unsquared distances.

use crate::simd;

/// L2 (Euclidean) distance.
///
/// Returns `f32::INFINITY` on a dimension mismatch so a malformed vector is
/// never selected as a nearest neighbour.
#[inline]
#[must_use]
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    simd::l2_distance(a, b)
}

/// Squared L2 distance, `f32::INFINITY` on a dimension mismatch.
#[inline]
#[must_use]
pub fn l2_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    simd::l2_distance_squared(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_is_zero_for_identical() {
        let a = [1.0_f32, 2.0, 3.0];
        assert_eq!(l2_distance(&a, &a), 0.0);
    }

    #[test]
    fn mismatch_is_infinite() {
        assert!(l2_distance(&[1.0], &[1.0, 2.0]).is_infinite());
        assert!(l2_distance_squared(&[1.0], &[1.0, 2.0]).is_infinite());
    }
}
