//! Planar image buffers fed to the backbone.
//!
//! Decoding is left to the caller. An [`Image`] is a dense `f32`
//! [`ndarray::Array3`] in channel-major (CHW) order; every image entering one
//! pipeline must share a single [`ImageShape`] so patch grids stay
//! geometrically comparable.

use std::fmt;

use ndarray::{Array2, Array3, ArrayView2, ArrayViewMut3, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{AnomalyError, Result};
use crate::feature::resample;

/// Channel count and spatial size of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageShape {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl ImageShape {
    pub const fn new(channels: usize, height: usize, width: usize) -> Self {
        Self {
            channels,
            height,
            width,
        }
    }

    /// Square RGB shape, the common case.
    pub const fn rgb(size: usize) -> Self {
        Self::new(3, size, size)
    }

    /// Number of scalars in an image of this shape.
    pub const fn len(&self) -> usize {
        self.channels * self.height * self.width
    }

    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for ImageShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.channels, self.height, self.width)
    }
}

/// Per-channel mean / standard deviation normalisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelNorm {
    pub mean: Vec<f32>,
    pub std: Vec<f32>,
}

impl ChannelNorm {
    /// ImageNet statistics, used by virtually every pretrained backbone.
    pub fn imagenet() -> Self {
        Self {
            mean: vec![0.485, 0.456, 0.406],
            std: vec![0.229, 0.224, 0.225],
        }
    }
}

impl Default for ChannelNorm {
    fn default() -> Self {
        Self::imagenet()
    }
}

/// Dense planar image, `channels × height × width`.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    data: Array3<f32>,
}

impl Image {
    /// Wrap a CHW buffer.
    pub fn new(shape: ImageShape, data: Vec<f32>) -> Result<Self> {
        if shape.is_empty() {
            return Err(AnomalyError::InvalidParameter(format!(
                "image shape {shape} has no pixels"
            )));
        }
        if data.len() != shape.len() {
            return Err(AnomalyError::InvalidParameter(format!(
                "buffer holds {} values, shape {shape} needs {}",
                data.len(),
                shape.len()
            )));
        }
        let data = Array3::from_shape_vec((shape.channels, shape.height, shape.width), data)
            .map_err(|e| AnomalyError::InvalidParameter(format!("image {shape}: {e}")))?;
        Self::from_array(data)
    }

    /// Wrap a CHW array.
    pub fn from_array(data: Array3<f32>) -> Result<Self> {
        if data.is_empty() {
            let (c, h, w) = data.dim();
            return Err(AnomalyError::InvalidParameter(format!(
                "image shape {c}x{h}x{w} has no pixels"
            )));
        }
        Ok(Self { data })
    }

    /// Image filled with a constant value.
    pub fn filled(shape: ImageShape, value: f32) -> Result<Self> {
        Self::from_array(Array3::from_elem(
            (shape.channels, shape.height, shape.width),
            value,
        ))
    }

    /// Build from an interleaved 8-bit RGB buffer (`height * width * 3` bytes),
    /// scaling to `[0, 1]`.
    pub fn from_rgb8(width: usize, height: usize, pixels: &[u8]) -> Result<Self> {
        let shape = ImageShape::new(3, height, width);
        if pixels.len() != shape.len() {
            return Err(AnomalyError::InvalidParameter(format!(
                "expected {} RGB bytes for {width}x{height}, got {}",
                shape.len(),
                pixels.len()
            )));
        }
        let hwc = Array3::from_shape_vec(
            (height, width, 3),
            pixels.iter().map(|&v| f32::from(v) / 255.0).collect(),
        )
        .map_err(|e| AnomalyError::InvalidParameter(format!("RGB buffer: {e}")))?;
        // HWC -> CHW
        let chw = hwc.permuted_axes([2, 0, 1]).as_standard_layout().into_owned();
        Self::from_array(chw)
    }

    pub fn shape(&self) -> ImageShape {
        let (channels, height, width) = self.data.dim();
        ImageShape::new(channels, height, width)
    }

    pub fn channels(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn height(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    pub fn width(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    /// Pixels indexed `[channel, row, col]`.
    pub fn array(&self) -> &Array3<f32> {
        &self.data
    }

    /// Mutable pixels. The shape is fixed.
    pub fn array_mut(&mut self) -> ArrayViewMut3<'_, f32> {
        self.data.view_mut()
    }

    pub fn into_array(self) -> Array3<f32> {
        self.data
    }

    /// One channel plane.
    pub fn plane(&self, channel: usize) -> Option<ArrayView2<'_, f32>> {
        (channel < self.channels()).then(|| self.data.index_axis(Axis(0), channel))
    }

    /// Apply `(x - mean[c]) / std[c]` in place.
    pub fn normalize(&mut self, norm: &ChannelNorm) -> Result<()> {
        let channels = self.channels();
        if norm.mean.len() != channels || norm.std.len() != channels {
            return Err(AnomalyError::InvalidParameter(format!(
                "normalisation has {}/{} entries for a {channels}-channel image",
                norm.mean.len(),
                norm.std.len()
            )));
        }
        if norm.std.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(AnomalyError::InvalidParameter(
                "normalisation std must be finite and positive".to_string(),
            ));
        }
        let stats = norm.mean.iter().zip(&norm.std);
        for (mut plane, (&mean, &std)) in self.data.axis_iter_mut(Axis(0)).zip(stats) {
            plane.mapv_inplace(|v| (v - mean) / std);
        }
        Ok(())
    }

    /// Bilinear resize of every channel.
    pub fn resize(&self, height: usize, width: usize) -> Result<Self> {
        if height == 0 || width == 0 {
            return Err(AnomalyError::InvalidParameter(format!(
                "cannot resize to {height}x{width}"
            )));
        }
        let planes: Vec<Array2<f32>> = self
            .data
            .axis_iter(Axis(0))
            .map(|plane| resample::bilinear_resize(plane, height, width))
            .collect();
        let views: Vec<ArrayView2<'_, f32>> = planes.iter().map(|p| p.view()).collect();
        let data = ndarray::stack(Axis(0), &views)
            .map_err(|e| AnomalyError::InvalidParameter(format!("resize: {e}")))?;
        Self::from_array(data)
    }

    /// Fail with [`AnomalyError::InvalidImage`] unless the shape is `expected`.
    pub fn ensure_shape(&self, expected: ImageShape) -> Result<()> {
        let actual = self.shape();
        if actual != expected {
            return Err(AnomalyError::InvalidImage { expected, actual });
        }
        Ok(())
    }

    /// Fail with [`AnomalyError::NonFinitePixel`] at the first NaN or
    /// infinite value, in CHW order.
    pub fn ensure_finite(&self) -> Result<()> {
        match self.data.indexed_iter().find(|(_, v)| !v.is_finite()) {
            Some(((channel, row, col), &value)) => Err(AnomalyError::NonFinitePixel {
                channel,
                row,
                col,
                value,
            }),
            None => Ok(()),
        }
    }
}
