//! Deterministic image to feature-vector extraction.
//!
//! Two strategies are provided: [`PixelFeaturizer`] flattens a resized,
//! normalised copy of the image, and [`EmbeddingFeaturizer`] runs a pretrained
//! ONNX image model. Both are described by a [`FeaturizerConfig`] that is stored
//! in the model artifact, so prediction rebuilds exactly the featurizer used for
//! training.

use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageError, ImageReader};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::context::PipelineContext;
use crate::error::{PipelineError, Result};

mod embedding;
mod pixels;
mod utils;

pub use embedding::{EmbeddingFeaturizer, IMAGENET_MEAN, IMAGENET_STD};
pub use pixels::PixelFeaturizer;

/// Fixed-length numeric representation of one image
pub type FeatureVector = Array1<f32>;

/// Maps an image on disk to a [`FeatureVector`].
///
/// Implementations must be deterministic: the same image bytes always give the
/// same vector, and every vector has length [`Featurizer::dimensionality`].
pub trait Featurizer: Send + Sync {
    /// Extracts the feature vector for the image at `path`.
    ///
    /// # Errors
    /// - `ImageDecodeError` if the file cannot be read or decoded
    /// - `UnsupportedImageFormat` if the decoder does not know the format
    fn extract(&self, path: &Path) -> Result<FeatureVector>;

    /// Parameters that fully determine this featurizer's output
    fn config(&self) -> FeaturizerConfig;

    fn dimensionality(&self) -> usize {
        self.config().dimensionality()
    }
}

/// Color handling applied before flattening pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorMode {
    Rgb,
    Grayscale,
}

impl ColorMode {
    pub fn channels(self) -> usize {
        match self {
            ColorMode::Rgb => 3,
            ColorMode::Grayscale => 1,
        }
    }
}

/// Settings of the raw-pixel featurizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixelConfig {
    pub width: u32,
    pub height: u32,
    pub color: ColorMode,
    /// Subtracted from every [0, 1] pixel value
    pub mean: f32,
    /// Divides every centred pixel value
    pub std: f32,
}

impl Default for PixelConfig {
    fn default() -> Self {
        Self {
            width: 32,
            height: 32,
            color: ColorMode::Rgb,
            mean: 0.5,
            std: 0.25,
        }
    }
}

impl PixelConfig {
    pub fn dimensionality(&self) -> usize {
        self.width as usize * self.height as usize * self.color.channels()
    }
}

/// Settings of the ONNX embedding featurizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model_path: PathBuf,
    /// Hex SHA-256 of the model file the embeddings were produced with
    pub model_sha256: String,
    pub input_width: u32,
    pub input_height: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
    pub dimensionality: usize,
}

/// Serialized description of a featurizer, recorded in every model artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeaturizerConfig {
    Pixels(PixelConfig),
    Embedding(EmbeddingConfig),
}

impl Default for FeaturizerConfig {
    fn default() -> Self {
        FeaturizerConfig::Pixels(PixelConfig::default())
    }
}

impl FeaturizerConfig {
    /// Length of every vector this configuration produces
    pub fn dimensionality(&self) -> usize {
        match self {
            FeaturizerConfig::Pixels(config) => config.dimensionality(),
            FeaturizerConfig::Embedding(config) => config.dimensionality,
        }
    }
}

/// Rebuilds the featurizer described by `config`.
///
/// For embeddings the model file is reopened and its hash compared with the
/// recorded one.
pub fn from_config(config: &FeaturizerConfig, ctx: &PipelineContext) -> Result<Box<dyn Featurizer>> {
    match config {
        FeaturizerConfig::Pixels(config) => Ok(Box::new(PixelFeaturizer::new(config.clone())?)),
        FeaturizerConfig::Embedding(config) => Ok(Box::new(EmbeddingFeaturizer::from_config(
            config,
            ctx.runtime_config(),
        )?)),
    }
}

/// Decodes an image, sniffing the format from its bytes
pub(crate) fn load_image(path: &Path) -> Result<DynamicImage> {
    let decode_error = |reason: String| PipelineError::ImageDecodeError {
        path: path.to_path_buf(),
        reason,
    };

    let reader = ImageReader::open(path)
        .map_err(|e| decode_error(e.to_string()))?
        .with_guessed_format()
        .map_err(|e| decode_error(e.to_string()))?;

    reader.decode().map_err(|e| match e {
        ImageError::Unsupported(_) => PipelineError::UnsupportedImageFormat {
            path: path.to_path_buf(),
            reason: e.to_string(),
        },
        other => decode_error(other.to_string()),
    })
}
