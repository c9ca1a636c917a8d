use std::collections::HashMap;
use std::fs;
use std::path::Path;

use image::imageops::FilterType;
use image::DynamicImage;
use log::{error, info};
use ndarray::{Array4, ArrayView1, ArrayViewD, Axis};
use ort::session::Session;
use ort::value::Tensor;
use sha2::{Digest, Sha256};

use super::utils::normalize_vector;
use super::{load_image, EmbeddingConfig, FeatureVector, Featurizer, FeaturizerConfig};
use crate::error::{PipelineError, Result};
use crate::runtime::{create_session_builder, RuntimeConfig};

/// ImageNet channel statistics, the usual preprocessing for pretrained backbones
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Pretrained-embedding featurizer backed by an ONNX image model.
///
/// The model is expected to:
/// - Accept one f32 input of shape [1, 3, height, width]
/// - Produce the embedding as its first output; all values of batch 0 are used
///
/// Embeddings are L2-normalised before being returned.
#[derive(Debug)]
pub struct EmbeddingFeaturizer {
    session: Session,
    input_name: String,
    config: EmbeddingConfig,
}

impl EmbeddingFeaturizer {
    /// Opens an ONNX model and infers its embedding size with a probe run.
    ///
    /// # Errors
    /// - `InvalidConfig` if the model file is missing or the input size is zero
    /// - `Runtime` if the session cannot be created or run
    pub fn open(
        model_path: impl AsRef<Path>,
        input_size: (u32, u32),
        mean: [f32; 3],
        std: [f32; 3],
        runtime: &RuntimeConfig,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let (input_width, input_height) = input_size;
        if input_width == 0 || input_height == 0 {
            return Err(PipelineError::InvalidConfig("Model input size must be non-zero".into()));
        }
        if std.iter().any(|&s| !(s.is_finite() && s > 0.0)) {
            return Err(PipelineError::InvalidConfig(format!(
                "Channel std must be positive, got {:?}",
                std
            )));
        }

        let model_sha256 = hash_file(model_path)?;
        let session = Self::open_session(model_path, runtime)?;
        let input_name = session.inputs[0].name.clone();

        let mut featurizer = Self {
            session,
            input_name,
            config: EmbeddingConfig {
                model_path: model_path.to_path_buf(),
                model_sha256,
                input_width,
                input_height,
                mean,
                std,
                dimensionality: 0,
            },
        };

        let probe = DynamicImage::new_rgb8(input_width, input_height);
        let dimensionality = featurizer.embed(&probe)?.len();
        info!("Inferred embedding size from model: {}", dimensionality);
        featurizer.config.dimensionality = dimensionality;
        Ok(featurizer)
    }

    /// Reopens the featurizer recorded in a model artifact.
    ///
    /// # Errors
    /// - `FeaturizerMismatch` if the model file changed since training
    pub fn from_config(config: &EmbeddingConfig, runtime: &RuntimeConfig) -> Result<Self> {
        let actual_hash = hash_file(&config.model_path)?;
        if actual_hash != config.model_sha256 {
            return Err(PipelineError::FeaturizerMismatch(format!(
                "Embedding model {:?} has hash {}, artifact expects {}",
                config.model_path, actual_hash, config.model_sha256
            )));
        }

        let featurizer = Self::open(
            &config.model_path,
            (config.input_width, config.input_height),
            config.mean,
            config.std,
            runtime,
        )?;
        if featurizer.config != *config {
            return Err(PipelineError::FeaturizerMismatch(format!(
                "Embedding model {:?} now produces {} values, artifact expects {}",
                config.model_path, featurizer.config.dimensionality, config.dimensionality
            )));
        }
        Ok(featurizer)
    }

    fn open_session(model_path: &Path, runtime: &RuntimeConfig) -> Result<Session> {
        let session = create_session_builder(runtime)?
            .commit_from_file(model_path)
            .map_err(|e| {
                error!("Failed to load embedding model {:?}: {}", model_path, e);
                PipelineError::Runtime(format!("Failed to load model {:?}: {}", model_path, e))
            })?;

        if session.inputs.is_empty() {
            return Err(PipelineError::Runtime(
                "Model must have at least 1 input for the image tensor".to_string(),
            ));
        }
        if session.outputs.is_empty() {
            return Err(PipelineError::Runtime(
                "Model must have at least 1 output for embeddings".to_string(),
            ));
        }
        Ok(session)
    }

    fn embed(&self, image: &DynamicImage) -> Result<FeatureVector> {
        let input = to_nchw(image, &self.config).into_dyn();
        let input = input.as_standard_layout();

        let mut input_tensors = HashMap::new();
        input_tensors.insert(
            self.input_name.as_str(),
            Tensor::from_array(&input).map_err(|e| {
                PipelineError::Runtime(format!("Failed to create input tensor: {}", e))
            })?,
        );

        let outputs = self
            .session
            .run(input_tensors)
            .map_err(|e| PipelineError::Runtime(format!("Failed to run model: {}", e)))?;
        let output_tensor = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| PipelineError::Runtime(format!("Failed to extract output tensor: {}", e)))?;

        first_embedding(output_tensor.view())
    }
}

impl Featurizer for EmbeddingFeaturizer {
    fn extract(&self, path: &Path) -> Result<FeatureVector> {
        let image = load_image(path)?;
        let embedding = self.embed(&image)?;
        if embedding.len() != self.config.dimensionality {
            return Err(PipelineError::FeatureDimensionMismatch {
                expected: self.config.dimensionality,
                actual: embedding.len(),
            });
        }
        Ok(embedding)
    }

    fn config(&self) -> FeaturizerConfig {
        FeaturizerConfig::Embedding(self.config.clone())
    }
}

/// Resizes `image` to the model input and lays it out as a normalised [1, 3, H, W] tensor
fn to_nchw(image: &DynamicImage, config: &EmbeddingConfig) -> Array4<f32> {
    let (width, height) = (config.input_width, config.input_height);
    let rgb = image.resize_exact(width, height, FilterType::Triangle).to_rgb8();

    let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
    for (x, y, pixel) in rgb.enumerate_pixels() {
        for c in 0..3 {
            let value = pixel[c] as f32 / 255.0;
            tensor[[0, c, y as usize, x as usize]] = (value - config.mean[c]) / config.std[c];
        }
    }
    tensor
}

/// Flattens everything belonging to batch 0, whatever the trailing shape, and L2-normalises it
fn first_embedding(output: ArrayViewD<f32>) -> Result<FeatureVector> {
    let embedding: Vec<f32> = if output.ndim() > 1 {
        output.index_axis(Axis(0), 0).iter().cloned().collect()
    } else {
        output.iter().cloned().collect()
    };
    if embedding.is_empty() {
        return Err(PipelineError::Runtime("Model produced an empty embedding".into()));
    }

    Ok(normalize_vector(ArrayView1::from(&embedding)))
}

fn hash_file(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| {
        PipelineError::InvalidConfig(format!("Cannot read embedding model {:?}: {}", path, e))
    })?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use ndarray::{arr3, Array2};
    use tempfile::TempDir;

    fn config(width: u32, height: u32) -> EmbeddingConfig {
        EmbeddingConfig {
            model_path: "model.onnx".into(),
            model_sha256: String::new(),
            input_width: width,
            input_height: height,
            mean: [0.5, 0.0, 0.2],
            std: [0.5, 1.0, 0.4],
            dimensionality: 4,
        }
    }

    #[test]
    fn test_to_nchw_layout_and_normalisation() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(9, 5, Rgb([255, 51, 0])));
        let tensor = to_nchw(&image, &config(4, 2));

        assert_eq!(tensor.shape(), &[1, 3, 2, 4]);
        // (1.0 - 0.5) / 0.5, (0.2 - 0.0) / 1.0, (0.0 - 0.2) / 0.4
        for (c, expected) in [1.0f32, 0.2, -0.5].into_iter().enumerate() {
            assert!(tensor
                .index_axis(Axis(1), c)
                .iter()
                .all(|&v| (v - expected).abs() < 1e-6));
        }
    }

    #[test]
    fn test_to_nchw_keeps_rows_and_columns() {
        // left half black, right half white
        let image = DynamicImage::ImageRgb8(RgbImage::from_fn(4, 2, |x, _| {
            if x < 2 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        }));
        let mut config = config(4, 2);
        config.mean = [0.0; 3];
        config.std = [1.0; 3];

        let tensor = to_nchw(&image, &config);
        for y in 0..2 {
            assert!(tensor[[0, 1, y, 0]] < 0.5);
            assert!(tensor[[0, 1, y, 3]] > 0.5);
        }
    }

    #[test]
    fn test_first_embedding_takes_batch_zero_and_normalises() {
        let output = arr3(&[[[3.0f32, 0.0], [0.0, 4.0]], [[9.0, 9.0], [9.0, 9.0]]]);
        let embedding = first_embedding(output.view().into_dyn()).unwrap();

        assert_eq!(embedding.len(), 4);
        let expected = [0.6f32, 0.0, 0.0, 0.8];
        assert!(embedding
            .iter()
            .zip(expected.iter())
            .all(|(a, b)| (a - b).abs() < 1e-6));
    }

    #[test]
    fn test_first_embedding_accepts_flat_output_and_rejects_empty() {
        let flat = ndarray::arr1(&[0.0f32, 2.0]);
        let embedding = first_embedding(flat.view().into_dyn()).unwrap();
        assert!((embedding[1] - 1.0).abs() < 1e-6);

        let empty = Array2::<f32>::zeros((1, 0));
        assert!(matches!(
            first_embedding(empty.view().into_dyn()),
            Err(PipelineError::Runtime(_))
        ));
    }

    #[test]
    fn test_missing_model_file() {
        let result = EmbeddingFeaturizer::open(
            "/no/such/model.onnx",
            (224, 224),
            IMAGENET_MEAN,
            IMAGENET_STD,
            &RuntimeConfig::default(),
        );
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_changed_model_is_rejected() {
        let dir = TempDir::new().unwrap();
        let model_path = dir.path().join("model.onnx");
        fs::write(&model_path, b"weights v2").unwrap();

        let config = EmbeddingConfig {
            model_path,
            model_sha256: "00".repeat(32),
            input_width: 224,
            input_height: 224,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
            dimensionality: 512,
        };
        let result = EmbeddingFeaturizer::from_config(&config, &RuntimeConfig::default());
        assert!(matches!(result, Err(PipelineError::FeaturizerMismatch(_))));
    }

    #[test]
    fn test_hash_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("abc.bin");
        fs::write(&path, b"abc").unwrap();
        assert_eq!(
            hash_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
