use std::path::Path;

use image::imageops::FilterType;
use image::DynamicImage;
use log::debug;
use ndarray::Array1;

use super::{load_image, ColorMode, FeatureVector, Featurizer, FeaturizerConfig, PixelConfig};
use crate::error::{PipelineError, Result};

const INV_255: f32 = 1.0 / 255.0;

/// Resize-and-flatten featurizer.
///
/// The image is resized to exactly `width x height` (aspect ratio is not kept),
/// scaled to [0, 1], normalised with `(v - mean) / std` and flattened
/// channel-major, so all red values come before all green values.
#[derive(Debug, Clone)]
pub struct PixelFeaturizer {
    config: PixelConfig,
}

impl PixelFeaturizer {
    pub fn new(config: PixelConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "Target size must be non-zero, got {}x{}",
                config.width, config.height
            )));
        }
        if !(config.std.is_finite() && config.std > 0.0) || !config.mean.is_finite() {
            return Err(PipelineError::InvalidConfig(format!(
                "Normalization needs a finite mean and positive std, got mean={} std={}",
                config.mean, config.std
            )));
        }
        Ok(Self { config })
    }

    /// Featurizes an already decoded image
    pub fn extract_image(&self, image: &DynamicImage) -> FeatureVector {
        let PixelConfig {
            width,
            height,
            color,
            mean,
            std,
        } = self.config;
        let inv_std = 1.0 / std;
        let plane = width as usize * height as usize;
        let mut features = vec![0.0f32; self.config.dimensionality()];

        match color {
            ColorMode::Rgb => {
                let resized = image.resize_exact(width, height, FilterType::Triangle).to_rgb8();
                for (i, pixel) in resized.pixels().enumerate() {
                    for c in 0..3 {
                        features[c * plane + i] = (pixel[c] as f32 * INV_255 - mean) * inv_std;
                    }
                }
            }
            ColorMode::Grayscale => {
                let resized = image.resize_exact(width, height, FilterType::Triangle).to_luma8();
                for (i, pixel) in resized.pixels().enumerate() {
                    features[i] = (pixel[0] as f32 * INV_255 - mean) * inv_std;
                }
            }
        }

        Array1::from_vec(features)
    }
}

impl Featurizer for PixelFeaturizer {
    fn extract(&self, path: &Path) -> Result<FeatureVector> {
        let image = load_image(path)?;
        debug!(
            "Featurizing {:?} ({}x{}) to {}x{}",
            path,
            image.width(),
            image.height(),
            self.config.width,
            self.config.height
        );
        Ok(self.extract_image(&image))
    }

    fn config(&self) -> FeaturizerConfig {
        FeaturizerConfig::Pixels(self.config.clone())
    }
}
