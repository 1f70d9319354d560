//! Property-based tests for patchcore components.
//!
//! These tests verify invariants that should hold regardless of input:
//! - Grid reshaping is the row-major identity
//! - Scores are non-negative and equal the maximum of their patch map
//! - Nearest-neighbour search returns the true minimum, lowest index on ties
//! - Subsampled banks only hold pooled vectors
//! - Thresholds are monotone in `k` and metric-optimal among candidates
//! - Heat maps stay within the range of the patch map

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use ndarray::ArrayView2;
use patchcore::feature::resample::bilinear_resize;
use patchcore::feature::{flat_index, grid_position};
use patchcore::metrics::ConfusionMatrix;
use patchcore::{
    calibrate_by_metric, calibrate_statistical, score_grid, AnomalyMap, ConvBackbone,
    ConvBackboneConfig, ExtractorConfig, FeatureExtractor, Image, ImageShape, MemoryBank,
    PatchGrid,
};

prop_compose! {
    fn arb_grid(dim: usize)(side in 1usize..6)(
        side in Just(side),
        data in prop::collection::vec(-5.0f32..5.0, side * side * dim),
    ) -> PatchGrid {
        PatchGrid::new(side, dim, data).unwrap()
    }
}

prop_compose! {
    fn arb_bank(dim: usize)(rows in 1usize..30)(
        data in prop::collection::vec(-5.0f32..5.0, rows * dim),
    ) -> MemoryBank {
        MemoryBank::from_flat(dim, data).unwrap()
    }
}

mod grid_props {
    use super::*;

    proptest! {
        #[test]
        fn index_and_position_are_inverse(side in 1usize..64, seed in any::<usize>()) {
            let i = seed % (side * side);
            let (r, c) = grid_position(side, i);
            prop_assert!(r < side && c < side);
            prop_assert_eq!(flat_index(side, r, c), i);
            prop_assert_eq!(i, r * side + c);
        }

        #[test]
        fn map_reshape_is_row_major(side in 1usize..10, fill in -3.0f32..3.0) {
            let values: Vec<f32> = (0..side * side).map(|i| fill + i as f32).collect();
            let map = AnomalyMap::from_flat(side, values.clone()).unwrap();
            for r in 0..side {
                for c in 0..side {
                    prop_assert_eq!(map.get(r, c), Some(values[r * side + c]));
                }
            }
        }
    }
}

mod scoring_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn score_is_max_of_non_negative_map(grid in arb_grid(4), bank in arb_bank(4)) {
            let (score, map, nearest) = score_grid(&grid, &bank).unwrap();
            prop_assert!(score >= 0.0);
            prop_assert!(map.as_flat().iter().all(|&d| d >= 0.0));
            prop_assert_eq!(score, map.max());
            prop_assert_eq!(nearest.len(), grid.len());
            prop_assert!(nearest.iter().all(|&n| (n as usize) < bank.len()));
        }

        #[test]
        fn nearest_is_exact_minimum(grid in arb_grid(3), bank in arb_bank(3)) {
            for (q, hit) in grid.iter().zip(bank.nearest_all(&grid).unwrap()) {
                let brute: Vec<f32> = bank
                    .iter()
                    .map(|v| v.iter().zip(q).map(|(a, b)| (a - b) * (a - b)).sum::<f32>())
                    .collect();
                let best = brute.iter().copied().fold(f32::INFINITY, f32::min);
                prop_assert!((hit.distance - best.sqrt()).abs() <= 1e-3 * (1.0 + best.sqrt()));
                prop_assert!(brute[hit.index as usize] <= best * (1.0 + 1e-5) + 1e-6);
            }
        }

        #[test]
        fn bank_vector_has_zero_distance(bank in arb_bank(5), pick in any::<usize>()) {
            let i = pick % bank.len();
            let v = bank.vector(i).unwrap().to_vec();
            let hit = bank.nearest(&v).unwrap();
            prop_assert_eq!(hit.distance, 0.0);
            prop_assert!(hit.index as usize <= i);
        }

        #[test]
        fn upsampled_heat_stays_in_range(
            side in 1usize..6,
            h in 1usize..40,
            w in 1usize..40,
            values in prop::collection::vec(0.0f32..10.0, 36),
        ) {
            let values = values[..side * side].to_vec();
            let map = AnomalyMap::from_flat(side, values).unwrap();
            let heat = map.upsample(h, w).unwrap();
            let lo = map.as_flat().iter().copied().fold(f32::INFINITY, f32::min);
            prop_assert!(heat.min() >= lo - 1e-5);
            prop_assert!(heat.max() <= map.max() + 1e-5);
        }

        #[test]
        fn resize_to_same_size_is_identity(
            h in 1usize..8,
            w in 1usize..8,
            values in prop::collection::vec(-1.0f32..1.0, 64),
        ) {
            let plane = ArrayView2::from_shape((h, w), &values[..h * w]).unwrap();
            let out = bilinear_resize(plane, h, w);
            prop_assert_eq!(out, plane);
        }
    }
}

mod bank_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn subsample_holds_only_pooled_vectors(
            grids in prop::collection::vec(arb_grid(2), 1..4),
            fraction in 0.01f64..=1.0,
            seed in any::<u64>(),
        ) {
            // Grids of differing sides still share a dimension.
            let (bank, report) =
                MemoryBank::from_grids(&grids, fraction, &mut StdRng::seed_from_u64(seed)).unwrap();
            let pooled: usize = grids.iter().map(PatchGrid::len).sum();
            prop_assert_eq!(report.pooled, pooled);
            prop_assert!(bank.len() >= 1 && bank.len() <= pooled);
            for v in bank.iter() {
                prop_assert!(grids.iter().any(|g| g.iter().any(|p| p == v)));
            }
        }
    }
}

mod calibration_props {
    use super::*;

    proptest! {
        #[test]
        fn statistical_is_monotone_in_k(
            scores in prop::collection::vec(0.0f32..100.0, 1..50),
            k1 in -5.0f32..5.0,
            k2 in -5.0f32..5.0,
        ) {
            let (lo, hi) = if k1 <= k2 { (k1, k2) } else { (k2, k1) };
            let a = calibrate_statistical(&scores, lo).unwrap();
            let b = calibrate_statistical(&scores, hi).unwrap();
            prop_assert!(a.value() <= b.value());
        }

        #[test]
        fn metric_optimal_dominates_candidates(
            data in prop::collection::vec((0.0f32..1.0, any::<bool>()), 2..60),
        ) {
            let scores: Vec<f32> = data.iter().map(|d| d.0).collect();
            let labels: Vec<bool> = data.iter().map(|d| d.1).collect();
            prop_assume!(labels.contains(&true) && labels.contains(&false));

            let t = calibrate_by_metric(&scores, &labels).unwrap();
            let best = ConfusionMatrix::at_threshold(&scores, &labels, t.value()).unwrap().f1();
            for &s in &scores {
                let f1 = ConfusionMatrix::at_threshold(&scores, &labels, s).unwrap().f1();
                prop_assert!(best + 1e-12 >= f1);
                // First maximum: no smaller candidate reaches the same value.
                if s < t.value() {
                    prop_assert!(f1 < best);
                }
            }
        }
    }
}

mod extraction_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        #[test]
        fn extraction_is_deterministic(
            pixels in prop::collection::vec(0.0f32..1.0, 3 * 16 * 16),
            seed in any::<u64>(),
        ) {
            let backbone = ConvBackbone::new(
                ConvBackboneConfig {
                    input_size: 16,
                    stage_channels: vec![3, 4],
                    taps: [0, 1],
                    ..Default::default()
                }
                .with_seed(seed),
            )
            .unwrap();
            let extractor = FeatureExtractor::new(backbone, ExtractorConfig::default()).unwrap();
            let image = Image::new(ImageShape::rgb(16), pixels).unwrap();
            let a = extractor.extract(&image).unwrap();
            let b = extractor.extract(&image).unwrap();
            prop_assert_eq!(a.side(), 4);
            prop_assert_eq!(a.dim(), 7);
            prop_assert_eq!(a, b);
        }
    }
}
