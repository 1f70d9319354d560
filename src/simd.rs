//! Vector kernels with SIMD acceleration.
//!
//! When the `innr` feature is enabled (default), the kernels come from the
//! `innr` crate. Otherwise portable lane loops are used. The nearest-neighbour
//! scan in [`crate::memory`] spends almost all of its time in
//! [`l2_distance_squared`].
//!
//! ```rust
//! use patchcore::simd::{dot, l2_distance, norm};
//!
//! let a = [3.0_f32, 4.0];
//! let b = [0.0_f32, 0.0];
//!
//! assert_eq!(norm(&a), 5.0);
//! assert_eq!(l2_distance(&a, &b), 5.0);
//! assert_eq!(dot(&a, &a), 25.0);
//! ```

#[cfg(feature = "innr")]
pub use innr::{dot, l2_distance, l2_distance_squared, norm};

#[cfg(not(feature = "innr"))]
mod fallback {
    //! Portable kernels for builds without `innr`.
    //!
    //! Accumulation runs in four independent lanes so the compiler can
    //! vectorise without target-specific intrinsics.

    const LANES: usize = 4;

    /// Dot product of two vectors.
    ///
    /// Extra elements of the longer slice are ignored.
    #[inline]
    #[must_use]
    pub fn dot(a: &[f32], b: &[f32]) -> f32 {
        let n = a.len().min(b.len());
        let (a, b) = (&a[..n], &b[..n]);
        let mut acc = [0.0f32; LANES];

        let chunks = n / LANES;
        for i in 0..chunks {
            let base = i * LANES;
            for lane in 0..LANES {
                acc[lane] += a[base + lane] * b[base + lane];
            }
        }
        let mut tail = 0.0f32;
        for i in chunks * LANES..n {
            tail += a[i] * b[i];
        }

        (acc[0] + acc[1]) + (acc[2] + acc[3]) + tail
    }

    /// L2 norm of a vector.
    #[inline]
    #[must_use]
    pub fn norm(v: &[f32]) -> f32 {
        dot(v, v).sqrt()
    }

    /// L2 (Euclidean) distance between two vectors.
    #[inline]
    #[must_use]
    pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
        l2_distance_squared(a, b).sqrt()
    }

    /// L2 distance squared (faster when only comparing distances).
    #[inline]
    #[must_use]
    pub fn l2_distance_squared(a: &[f32], b: &[f32]) -> f32 {
        let n = a.len().min(b.len());
        let (a, b) = (&a[..n], &b[..n]);
        let mut acc = [0.0f32; LANES];

        let chunks = n / LANES;
        for i in 0..chunks {
            let base = i * LANES;
            for lane in 0..LANES {
                let d = a[base + lane] - b[base + lane];
                acc[lane] += d * d;
            }
        }
        let mut tail = 0.0f32;
        for i in chunks * LANES..n {
            let d = a[i] - b[i];
            tail += d * d;
        }

        (acc[0] + acc[1]) + (acc[2] + acc[3]) + tail
    }

}

#[cfg(not(feature = "innr"))]
pub use fallback::*;
