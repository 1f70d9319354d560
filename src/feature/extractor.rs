//! Two-scale patch feature extraction.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::backbone::Backbone;
use super::grid::PatchGrid;
use super::resample::{adaptive_avg_pool, avg_pool_same};
use super::FeatureMap;
use crate::error::{AnomalyError, Result};
use crate::image::{Image, ImageShape};

/// Which tapped map fixes the grid side `S`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridAlignment {
    /// Pool both maps down to the later, lower-resolution map.
    #[default]
    Coarser,
    /// Bring both maps up to the earlier, higher-resolution map.
    Finer,
}

/// Feature extraction parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Window of the stride-1 local average applied to each tapped map.
    pub smoothing_kernel: usize,
    pub alignment: GridAlignment,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            smoothing_kernel: 3,
            alignment: GridAlignment::Coarser,
        }
    }
}

impl ExtractorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.smoothing_kernel == 0 || self.smoothing_kernel % 2 == 0 {
            return Err(AnomalyError::InvalidParameter(format!(
                "smoothing kernel must be odd and positive, got {}",
                self.smoothing_kernel
            )));
        }
        Ok(())
    }
}

/// Turns images into [`PatchGrid`]s.
///
/// Holds no per-call state; `extract` is a pure function of the image and the
/// frozen backbone, so one extractor can serve concurrent callers.
#[derive(Debug, Clone)]
pub struct FeatureExtractor<B> {
    backbone: B,
    config: ExtractorConfig,
}

impl<B: Backbone> FeatureExtractor<B> {
    pub fn new(backbone: B, config: ExtractorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { backbone, config })
    }

    pub fn backbone(&self) -> &B {
        &self.backbone
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Shape every input image must have.
    pub fn input_shape(&self) -> ImageShape {
        self.backbone.input_shape()
    }

    /// Extract the S·S × D patch grid of one image.
    ///
    /// Fails with [`AnomalyError::NonFinitePixel`] if any pixel is NaN or
    /// infinite.
    pub fn extract(&self, image: &Image) -> Result<PatchGrid> {
        image.ensure_shape(self.backbone.input_shape())?;
        image.ensure_finite()?;
        let [early, late] = self.backbone.forward_taps(image)?;

        for map in [&early, &late] {
            if !map.is_finite() {
                return Err(AnomalyError::Backbone(
                    "tapped activation holds non-finite values".to_string(),
                ));
            }
            if map.height() != map.width() {
                return Err(AnomalyError::Backbone(format!(
                    "tapped activation is {}x{}, expected a square map",
                    map.height(),
                    map.width()
                )));
            }
        }
        let side = match self.config.alignment {
            GridAlignment::Coarser => early.height().min(late.height()),
            GridAlignment::Finer => early.height().max(late.height()),
        };

        let aligned = [early, late]
            .iter()
            .map(|map| {
                let smoothed = avg_pool_same(map, self.config.smoothing_kernel)?;
                adaptive_avg_pool(&smoothed, side, side)
            })
            .collect::<Result<Vec<FeatureMap>>>()?;
        let stacked = FeatureMap::concat_channels(&aligned)?;
        let grid = PatchGrid::from_feature_map(&stacked)?;

        debug!(side = grid.side(), dim = grid.dim(), "extracted patch grid");
        Ok(grid)
    }

    /// Extract every image, stopping at the first failure.
    pub fn extract_all(&self, images: &[Image]) -> Result<Vec<PatchGrid>> {
        images.iter().map(|img| self.extract(img)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::backbone::{ConvBackbone, ConvBackboneConfig};

    fn extractor(alignment: GridAlignment) -> FeatureExtractor<ConvBackbone> {
        let backbone = ConvBackbone::new(ConvBackboneConfig {
            input_size: 32,
            stage_channels: vec![4, 6, 8],
            ..Default::default()
        })
        .unwrap();
        FeatureExtractor::new(
            backbone,
            ExtractorConfig {
                alignment,
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn image(seed: f32) -> Image {
        Image::new(
            ImageShape::rgb(32),
            (0..3 * 32 * 32).map(|i| ((i as f32) * seed).sin()).collect(),
        )
        .unwrap()
    }

    #[test]
    fn coarser_alignment_uses_late_resolution() {
        let grid = extractor(GridAlignment::Coarser).extract(&image(0.1)).unwrap();
        assert_eq!(grid.side(), 4);
        assert_eq!(grid.dim(), 6 + 8);
        assert_eq!(grid.len(), 16);
    }

    #[test]
    fn finer_alignment_uses_early_resolution() {
        let grid = extractor(GridAlignment::Finer).extract(&image(0.1)).unwrap();
        assert_eq!(grid.side(), 8);
        assert_eq!(grid.dim(), 14);
    }

    #[test]
    fn extraction_is_deterministic() {
        let ex = extractor(GridAlignment::Coarser);
        let img = image(0.37);
        assert_eq!(ex.extract(&img).unwrap(), ex.extract(&img).unwrap());
    }

    #[test]
    fn wrong_resolution_is_input_error() {
        let ex = extractor(GridAlignment::Coarser);
        let img = Image::filled(ImageShape::rgb(31), 0.0).unwrap();
        assert!(ex.extract(&img).unwrap_err().is_input_error());
        let gray = Image::filled(ImageShape::new(1, 32, 32), 0.0).unwrap();
        assert!(ex.extract(&gray).unwrap_err().is_input_error());
    }

    #[test]
    fn non_finite_pixel_is_input_error() {
        let ex = extractor(GridAlignment::Coarser);
        let mut img = image(0.1);
        let mut px = img.array_mut();
        px[[1, 5, 7]] = f32::NAN;
        match ex.extract(&img) {
            Err(AnomalyError::NonFinitePixel {
                channel, row, col, ..
            }) => assert_eq!((channel, row, col), (1, 5, 7)),
            other => panic!("unexpected: {other:?}"),
        }
    }

    /// Emits a NaN in its late tap regardless of input.
    struct LeakyBackbone;

    impl Backbone for LeakyBackbone {
        fn input_shape(&self) -> ImageShape {
            ImageShape::rgb(8)
        }

        fn forward_taps(&self, _image: &Image) -> Result<[FeatureMap; 2]> {
            let early = FeatureMap::zeros(2, 4, 4)?;
            let mut late = vec![0.0; 3 * 2 * 2];
            late[5] = f32::NAN;
            Ok([early, FeatureMap::new(3, 2, 2, late)?])
        }
    }

    #[test]
    fn non_finite_activation_is_backbone_error() {
        let ex = FeatureExtractor::new(LeakyBackbone, ExtractorConfig::default()).unwrap();
        let img = Image::filled(ImageShape::rgb(8), 0.5).unwrap();
        assert!(matches!(ex.extract(&img), Err(AnomalyError::Backbone(_))));
    }

    #[test]
    fn rejects_even_smoothing_kernel() {
        let backbone = ConvBackbone::new(ConvBackboneConfig::default()).unwrap();
        let config = ExtractorConfig {
            smoothing_kernel: 4,
            ..Default::default()
        };
        assert!(FeatureExtractor::new(backbone, config).is_err());
    }
}
