//! Backbone abstraction and a frozen convolutional implementation.
//!
//! The extractor only needs two intermediate activations from one forward
//! pass, so the backbone exposes them directly through
//! [`Backbone::forward_taps`] instead of capture hooks. Implementations take
//! `&self`: weights are fixed for the backbone's lifetime.

use ndarray::{Array3, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::FeatureMap;
use crate::error::{AnomalyError, Result};
use crate::image::{Image, ImageShape};

/// Frozen feature network tapped at two depths.
pub trait Backbone {
    /// Shape every input image must have.
    fn input_shape(&self) -> ImageShape;

    /// Run one forward pass and return `[early, late]` activations: the
    /// earlier (finer, higher-resolution) stage first, the later (coarser,
    /// semantically richer) stage second.
    fn forward_taps(&self, image: &Image) -> Result<[FeatureMap; 2]>;
}

impl<B: Backbone + ?Sized> Backbone for &B {
    fn input_shape(&self) -> ImageShape {
        (**self).input_shape()
    }

    fn forward_taps(&self, image: &Image) -> Result<[FeatureMap; 2]> {
        (**self).forward_taps(image)
    }
}

impl<B: Backbone + ?Sized> Backbone for Box<B> {
    fn input_shape(&self) -> ImageShape {
        (**self).input_shape()
    }

    fn forward_taps(&self, image: &Image) -> Result<[FeatureMap; 2]> {
        (**self).forward_taps(image)
    }
}

/// Output size of a 2-D convolution.
pub fn conv_output_hw(
    input_hw: (usize, usize),
    kernel: usize,
    stride: usize,
    padding: usize,
) -> Result<(usize, usize)> {
    let (h, w) = input_hw;
    if h == 0 || w == 0 || kernel == 0 || stride == 0 {
        return Err(AnomalyError::InvalidParameter(format!(
            "invalid convolution: input {h}x{w}, kernel {kernel}, stride {stride}"
        )));
    }
    if h + 2 * padding < kernel || w + 2 * padding < kernel {
        return Err(AnomalyError::InvalidParameter(format!(
            "kernel {kernel} larger than padded input {}x{}",
            h + 2 * padding,
            w + 2 * padding
        )));
    }
    Ok((
        (h + 2 * padding - kernel) / stride + 1,
        (w + 2 * padding - kernel) / stride + 1,
    ))
}

/// Configuration of [`ConvBackbone`].
///
/// Every stage is a `kernel_size`×`kernel_size` convolution with stride 2 and
/// "same" padding followed by ReLU, so stage `i` runs at
/// `input_size / 2^(i+1)` (rounded up).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvBackboneConfig {
    pub input_channels: usize,
    pub input_size: usize,
    /// Output channels per stage.
    pub stage_channels: Vec<usize>,
    pub kernel_size: usize,
    /// Stage indices to tap, earlier first.
    pub taps: [usize; 2],
    /// Seed for the Kaiming-uniform weight initialisation.
    pub seed: u64,
}

impl Default for ConvBackboneConfig {
    fn default() -> Self {
        Self {
            input_channels: 3,
            input_size: 224,
            stage_channels: vec![8, 16, 32],
            kernel_size: 3,
            taps: [1, 2],
            seed: 0,
        }
    }
}

impl ConvBackboneConfig {
    /// Same architecture at a different input resolution.
    #[must_use]
    pub fn with_input_size(mut self, input_size: usize) -> Self {
        self.input_size = input_size;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.input_channels == 0 || self.input_size == 0 {
            return Err(AnomalyError::InvalidParameter(
                "backbone input must have channels and pixels".to_string(),
            ));
        }
        if self.kernel_size == 0 || self.kernel_size % 2 == 0 {
            return Err(AnomalyError::InvalidParameter(format!(
                "backbone kernel must be odd, got {}",
                self.kernel_size
            )));
        }
        if self.stage_channels.iter().any(|&c| c == 0) {
            return Err(AnomalyError::InvalidParameter(
                "stage with zero channels".to_string(),
            ));
        }
        let [early, late] = self.taps;
        if early >= late || late >= self.stage_channels.len() {
            return Err(AnomalyError::InvalidParameter(format!(
                "taps {:?} must be increasing stage indices below {}",
                self.taps,
                self.stage_channels.len()
            )));
        }
        Ok(())
    }
}

/// Weights of one convolution stage.
///
/// `weight` is laid out `[out_channels][in_channels][kernel][kernel]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvLayerWeights {
    pub weight: Vec<f32>,
    pub bias: Vec<f32>,
}

#[derive(Debug, Clone)]
struct Conv2d {
    in_channels: usize,
    out_channels: usize,
    kernel: usize,
    stride: usize,
    padding: usize,
    weights: ConvLayerWeights,
}

impl Conv2d {
    fn new(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        weights: ConvLayerWeights,
    ) -> Result<Self> {
        let expected = out_channels * in_channels * kernel * kernel;
        if weights.weight.len() != expected || weights.bias.len() != out_channels {
            return Err(AnomalyError::InvalidParameter(format!(
                "conv {in_channels}->{out_channels} k{kernel} needs {expected} weights and \
                 {out_channels} biases, got {} and {}",
                weights.weight.len(),
                weights.bias.len()
            )));
        }
        Ok(Self {
            in_channels,
            out_channels,
            kernel,
            stride: 2,
            padding: kernel / 2,
            weights,
        })
    }

    fn kaiming_uniform<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        rng: &mut R,
    ) -> ConvLayerWeights {
        let fan_in = (in_channels * kernel * kernel) as f32;
        let bound = (6.0 / fan_in).sqrt();
        let weight = (0..out_channels * in_channels * kernel * kernel)
            .map(|_| rng.random_range(-bound..bound))
            .collect();
        ConvLayerWeights {
            weight,
            bias: vec![0.0; out_channels],
        }
    }

    /// Convolution followed by ReLU.
    fn forward_relu(&self, input: &FeatureMap) -> Result<FeatureMap> {
        if input.channels() != self.in_channels {
            return Err(AnomalyError::Backbone(format!(
                "conv expects {} input channels, got {}",
                self.in_channels,
                input.channels()
            )));
        }
        let (h, w) = input.hw();
        let (oh, ow) = conv_output_hw((h, w), self.kernel, self.stride, self.padding)?;
        let (k, pad) = (self.kernel, self.padding);
        let mut out = Array3::<f32>::zeros((self.out_channels, oh, ow));

        for (oc, mut dst) in out.axis_iter_mut(Axis(0)).enumerate() {
            dst.fill(self.weights.bias[oc]);
            for (ic, src) in input.array().axis_iter(Axis(0)).enumerate() {
                let kbase = (oc * self.in_channels + ic) * k * k;
                for ky in 0..k {
                    for kx in 0..k {
                        let wv = self.weights.weight[kbase + ky * k + kx];
                        for (oy, mut out_row) in dst.rows_mut().into_iter().enumerate() {
                            let iy = oy * self.stride + ky;
                            if iy < pad || iy - pad >= h {
                                continue;
                            }
                            let row = src.row(iy - pad);
                            for (ox, o) in out_row.iter_mut().enumerate() {
                                let ix = ox * self.stride + kx;
                                if ix < pad || ix - pad >= w {
                                    continue;
                                }
                                *o += wv * row[ix - pad];
                            }
                        }
                    }
                }
            }
            // NaN passes through unchanged.
            dst.mapv_inplace(|v| if v < 0.0 { 0.0 } else { v });
        }
        FeatureMap::from_array(out)
    }
}

/// Frozen stack of strided convolutions.
///
/// Serves as the in-crate backbone: either load trained weights with
/// [`ConvBackbone::from_weights`] or draw seeded random weights with
/// [`ConvBackbone::new`]. Random convolutional features are a usable,
/// fully deterministic stand-in when no pretrained network is at hand.
#[derive(Debug, Clone)]
pub struct ConvBackbone {
    config: ConvBackboneConfig,
    layers: Vec<Conv2d>,
    stage_shapes: Vec<(usize, (usize, usize))>,
}

impl ConvBackbone {
    /// Build with Kaiming-uniform weights drawn from `config.seed`.
    pub fn new(config: ConvBackboneConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut weights = Vec::with_capacity(config.stage_channels.len());
        let mut in_channels = config.input_channels;
        for &out_channels in &config.stage_channels {
            weights.push(Conv2d::kaiming_uniform(
                in_channels,
                out_channels,
                config.kernel_size,
                &mut rng,
            ));
            in_channels = out_channels;
        }
        Self::from_weights(config, weights)
    }

    /// Build from explicit per-stage weights.
    pub fn from_weights(config: ConvBackboneConfig, weights: Vec<ConvLayerWeights>) -> Result<Self> {
        config.validate()?;
        if weights.len() != config.stage_channels.len() {
            return Err(AnomalyError::InvalidParameter(format!(
                "{} stages configured, {} weight sets supplied",
                config.stage_channels.len(),
                weights.len()
            )));
        }

        let mut layers = Vec::with_capacity(weights.len());
        let mut stage_shapes = Vec::with_capacity(weights.len());
        let mut in_channels = config.input_channels;
        let mut hw = (config.input_size, config.input_size);
        for (&out_channels, w) in config.stage_channels.iter().zip(weights) {
            let layer = Conv2d::new(in_channels, out_channels, config.kernel_size, w)?;
            hw = conv_output_hw(hw, layer.kernel, layer.stride, layer.padding)?;
            stage_shapes.push((out_channels, hw));
            layers.push(layer);
            in_channels = out_channels;
        }

        Ok(Self {
            config,
            layers,
            stage_shapes,
        })
    }

    pub fn config(&self) -> &ConvBackboneConfig {
        &self.config
    }

    /// `(channels, (height, width))` after each stage.
    pub fn stage_shapes(&self) -> &[(usize, (usize, usize))] {
        &self.stage_shapes
    }

    /// Shapes of the two tapped activations.
    pub fn tap_shapes(&self) -> [(usize, (usize, usize)); 2] {
        let [early, late] = self.config.taps;
        [self.stage_shapes[early], self.stage_shapes[late]]
    }
}

impl Backbone for ConvBackbone {
    fn input_shape(&self) -> ImageShape {
        ImageShape::new(
            self.config.input_channels,
            self.config.input_size,
            self.config.input_size,
        )
    }

    fn forward_taps(&self, image: &Image) -> Result<[FeatureMap; 2]> {
        image.ensure_shape(self.input_shape())?;
        let [early_idx, late_idx] = self.config.taps;

        let mut x = FeatureMap::from_array(image.array().clone())?;
        let mut early = None;
        // Stages past the later tap are never evaluated.
        for (i, layer) in self.layers.iter().enumerate().take(late_idx + 1) {
            x = layer.forward_relu(&x)?;
            if i == early_idx {
                early = Some(x.clone());
            }
        }
        let early = early.ok_or_else(|| {
            AnomalyError::Backbone(format!("stage {early_idx} produced no activation"))
        })?;
        Ok([early, x])
    }
}
