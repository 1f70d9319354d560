//! Shared fixtures for integration tests.
#![allow(dead_code)]

use ndarray::s;
use patchcore::{ConvBackboneConfig, Image, ImageShape, PatchCoreConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

/// Per-test subscriber honouring `RUST_LOG`; output goes through the test
/// harness so it only shows for failing tests.
pub fn init_test_subscriber() -> tracing::subscriber::DefaultGuard {
    let fmt_layer = fmt::layer().with_target(true).with_test_writer();

    let filter_layer = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .set_default()
}

/// Periodic texture plus a little noise. The period matches the backbone's
/// final stride, so every reference image shows the same patterns.
pub fn texture(size: usize, seed: u64) -> Image {
    let mut rng = StdRng::seed_from_u64(seed);
    let tau = std::f32::consts::TAU;
    let mut data = Vec::with_capacity(3 * size * size);
    for c in 0..3 {
        for y in 0..size {
            for x in 0..size {
                let base = 0.5 * (tau * x as f32 / 8.0).sin() * (tau * y as f32 / 8.0).cos();
                let noise: f32 = rng.random_range(-0.02..0.02);
                data.push(base + 0.1 * c as f32 + noise);
            }
        }
    }
    Image::new(ImageShape::rgb(size), data).unwrap()
}

/// `texture` with a bright square painted over `[top, top+side) × [left, left+side)`.
pub fn with_defect(mut image: Image, top: usize, left: usize, side: usize) -> Image {
    let (h, w) = (image.height(), image.width());
    image
        .array_mut()
        .slice_mut(s![.., top..(top + side).min(h), left..(left + side).min(w)])
        .fill(6.0);
    image
}

/// Small pipeline: 32px input, 8px final stride, 4x4 grid.
pub fn small_config(seed: u64) -> PatchCoreConfig {
    let mut config = PatchCoreConfig::default();
    config.backbone = ConvBackboneConfig {
        input_size: 32,
        stage_channels: vec![4, 8, 8],
        ..Default::default()
    }
    .with_seed(seed);
    config.bank = config.bank.with_sample_fraction(0.5).with_seed(seed);
    config
}
