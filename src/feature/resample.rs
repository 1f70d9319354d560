//! Spatial resampling: local averaging, adaptive pooling, bilinear resize.

use ndarray::{s, Array2, Array3, ArrayView2, Axis};

use super::FeatureMap;
use crate::error::{AnomalyError, Result};

/// `kernel`×`kernel` average pool with stride 1 and zero padding `kernel / 2`.
///
/// Output resolution equals input resolution. Padding cells count toward the
/// divisor, which is always `kernel²`, so border cells are damped.
pub fn avg_pool_same(map: &FeatureMap, kernel: usize) -> Result<FeatureMap> {
    if kernel == 0 || kernel % 2 == 0 {
        return Err(AnomalyError::InvalidParameter(format!(
            "smoothing kernel must be odd and positive, got {kernel}"
        )));
    }
    if kernel == 1 {
        return Ok(map.clone());
    }

    let (h, w) = map.hw();
    let pad = kernel / 2;
    let area = (kernel * kernel) as f32;
    let mut out = Array3::<f32>::zeros(map.array().raw_dim());

    for (src, mut dst) in map.array().axis_iter(Axis(0)).zip(out.axis_iter_mut(Axis(0))) {
        for ((y, x), cell) in dst.indexed_iter_mut() {
            let rows = y.saturating_sub(pad)..(y + pad + 1).min(h);
            let cols = x.saturating_sub(pad)..(x + pad + 1).min(w);
            *cell = src.slice(s![rows, cols]).sum() / area;
        }
    }
    FeatureMap::from_array(out)
}

/// Start (inclusive) and end (exclusive) of adaptive bin `i`.
#[inline]
fn adaptive_bin(i: usize, input: usize, output: usize) -> (usize, usize) {
    let start = (i * input) / output;
    let end = ((i + 1) * input).div_ceil(output);
    (start, end)
}

/// Adaptive average pooling to `out_h`×`out_w`.
///
/// Bin `i` covers input cells `[⌊i·in/out⌋, ⌈(i+1)·in/out⌉)`. The same rule
/// handles `out > in` by replicating cells.
pub fn adaptive_avg_pool(map: &FeatureMap, out_h: usize, out_w: usize) -> Result<FeatureMap> {
    if out_h == 0 || out_w == 0 {
        return Err(AnomalyError::InvalidParameter(format!(
            "adaptive pool target {out_h}x{out_w} is empty"
        )));
    }
    let (h, w) = map.hw();
    if (h, w) == (out_h, out_w) {
        return Ok(map.clone());
    }

    let mut out = Array3::<f32>::zeros((map.channels(), out_h, out_w));
    for (src, mut dst) in map.array().axis_iter(Axis(0)).zip(out.axis_iter_mut(Axis(0))) {
        for ((oy, ox), cell) in dst.indexed_iter_mut() {
            let (y0, y1) = adaptive_bin(oy, h, out_h);
            let (x0, x1) = adaptive_bin(ox, w, out_w);
            let bin = src.slice(s![y0..y1, x0..x1]);
            *cell = bin.sum() / bin.len() as f32;
        }
    }
    FeatureMap::from_array(out)
}

/// Half-pixel-centre source coordinate and blend weights along one axis.
#[inline]
fn bilinear_axis(dst: usize, input: usize, output: usize) -> (usize, usize, f32) {
    let scale = input as f64 / output as f64;
    let src = ((dst as f64 + 0.5) * scale - 0.5).max(0.0);
    let i0 = (src.floor() as usize).min(input - 1);
    let i1 = (i0 + 1).min(input - 1);
    let lambda = (src - i0 as f64).clamp(0.0, 1.0) as f32;
    (i0, i1, lambda)
}

/// Bilinear resize of one plane to `out_h`×`out_w`.
///
/// Every output value is a convex combination of input values, so the
/// output range never exceeds the input range. Callers guarantee the plane
/// and the target are non-empty.
#[must_use]
pub fn bilinear_resize(plane: ArrayView2<'_, f32>, out_h: usize, out_w: usize) -> Array2<f32> {
    let (in_h, in_w) = plane.dim();
    let rows: Vec<(usize, usize, f32)> =
        (0..out_h).map(|y| bilinear_axis(y, in_h, out_h)).collect();
    let cols: Vec<(usize, usize, f32)> =
        (0..out_w).map(|x| bilinear_axis(x, in_w, out_w)).collect();
    Array2::from_shape_fn((out_h, out_w), |(y, x)| {
        let (y0, y1, ly) = rows[y];
        let (x0, x1, lx) = cols[x];
        let t = plane[[y0, x0]] + (plane[[y0, x1]] - plane[[y0, x0]]) * lx;
        let b = plane[[y1, x0]] + (plane[[y1, x1]] - plane[[y1, x0]]) * lx;
        t + (b - t) * ly
    })
}
