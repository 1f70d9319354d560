//! Full pipeline on synthetic textures at the default 224px resolution.

mod common;

use common::{init_test_subscriber, texture, with_defect};
use patchcore::{
    calibrate_by_metric, calibrate_statistical, roc_auc, AnomalyDetector, AnomalyError,
    PatchCoreConfig,
};

fn fitted() -> AnomalyDetector<patchcore::ConvBackbone> {
    let mut config = PatchCoreConfig::default();
    config.bank = config.bank.with_seed(42);
    let good: Vec<_> = (0..5).map(|i| texture(224, i)).collect();
    AnomalyDetector::from_config(&config, &good).unwrap()
}

#[test]
fn five_references_pool_3920_and_keep_392() {
    let _guard = init_test_subscriber();
    let detector = fitted();
    let report = detector.build_report().unwrap();
    assert_eq!(report.images, 5);
    assert_eq!(report.pooled, 5 * 28 * 28);
    assert_eq!(report.pooled, 3920);
    assert_eq!(report.kept, 392);
    assert_eq!(detector.bank().len(), 392);
    assert_eq!(detector.bank().dimension(), 16 + 32);
}

#[test]
fn defect_scores_above_clean_and_localises() {
    let _guard = init_test_subscriber();
    let detector = fitted();

    let reference = detector.score(&texture(224, 0)).unwrap();
    let clean = detector.score(&texture(224, 100)).unwrap();
    let defect = detector
        .score(&with_defect(texture(224, 101), 100, 100, 48))
        .unwrap();

    assert!(clean.score >= 0.0);
    assert!(
        defect.score > reference.score,
        "defect {} <= reference {}",
        defect.score,
        reference.score
    );
    assert!(
        defect.score > clean.score,
        "defect {} <= clean {}",
        defect.score,
        clean.score
    );

    assert_eq!(defect.patch_map.side(), 28);
    assert_eq!(defect.score, defect.patch_map.max());
    assert_eq!((defect.heat_map.height(), defect.heat_map.width()), (224, 224));

    // Pixels 100..148 fall in grid cells 12..18; allow the smoothing halo.
    let (r, c) = defect.patch_map.argmax();
    assert!((10..=20).contains(&r), "argmax row {r}");
    assert!((10..=20).contains(&c), "argmax col {c}");
}

#[test]
fn mixed_set_separates_and_calibrates() {
    let _guard = init_test_subscriber();
    let mut detector = fitted();

    let mut images = Vec::new();
    let mut labels = Vec::new();
    for i in 0..3u64 {
        images.push(texture(224, 200 + i));
        labels.push(false);
        let offset = 40 + 50 * i as usize;
        images.push(with_defect(texture(224, 300 + i), offset, offset, 40));
        labels.push(true);
    }

    let scored = detector.score_batch(&images).unwrap();
    let scores: Vec<f32> = scored.iter().map(|s| s.score).collect();
    let auc = roc_auc(&scores, &labels).unwrap();
    assert!(auc > 0.5, "auc {auc}");

    let normal: Vec<f32> = scores
        .iter()
        .zip(&labels)
        .filter(|(_, &l)| !l)
        .map(|(&s, _)| s)
        .collect();
    let loose = calibrate_statistical(&normal, 3.0).unwrap();
    let mean = calibrate_statistical(&normal, 0.0).unwrap();
    let max_normal = normal.iter().copied().fold(f32::MIN, f32::max);
    assert!(loose >= mean);
    assert!(mean.value() <= max_normal);

    let optimal = calibrate_by_metric(&scores, &labels).unwrap();
    assert!(scores.contains(&optimal.value()));

    assert!(matches!(
        detector.predict(&images[0]),
        Err(AnomalyError::NotCalibrated)
    ));
    detector.set_threshold(optimal);
    let p = detector.predict(&images[1]).unwrap();
    assert_eq!(p.is_anomalous, p.score >= optimal.value());
    assert_eq!(p.mask.len(), 224 * 224);
}

#[test]
fn scoring_is_deterministic_for_fixed_seed() {
    let a = fitted();
    let b = fitted();
    assert_eq!(a.bank(), b.bank());
    let img = with_defect(texture(224, 7), 20, 150, 30);
    let sa = a.score(&img).unwrap();
    let sb = b.score(&img).unwrap();
    assert_eq!(sa.score, sb.score);
    assert_eq!(sa.nearest, sb.nearest);
}
