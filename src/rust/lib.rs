//! Cat breed image classifier: train from a labeled manifest, predict new images.
//!
//! # Basic Usage
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::path::Path;
//! use cattracker::{pipeline, PipelineContext};
//!
//! let ctx = PipelineContext::builder().build()?;
//!
//! let report = pipeline::train(&ctx, Path::new("cats/cats.tsv"), Path::new("model.ctm"))?;
//! println!("{}", report);
//!
//! let batch = pipeline::predict_file(&ctx, Path::new("model.ctm"), Path::new("tabby.jpg"))?;
//! for prediction in batch.predictions {
//!     println!("Predicted class: {}", prediction.result?.predicted_label);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Components
//!
//! - [`ManifestReader`] parses `Label<TAB>ImageSource` files into [`ManifestRecord`]s
//! - [`Featurizer`] implementations turn images into fixed-length vectors
//! - [`Trainer`] fits a softmax classifier and returns a [`ModelArtifact`]
//! - [`ModelArtifact::save`] / [`ModelArtifact::load`] persist it as one file
//! - [`Predictor`] rebuilds the recorded featurizer and scores images
//!
//! # Thread Safety
//!
//! A [`Predictor`] holds no per-call state and is `Send + Sync`; batch
//! prediction runs on the worker pool owned by the [`PipelineContext`].

pub mod artifact;
pub mod classifier;
mod context;
mod error;
pub mod featurizer;
pub mod manifest;
pub mod paths;
pub mod pipeline;
mod predictor;
mod runtime;

pub use artifact::{ModelArtifact, FORMAT_VERSION};
pub use classifier::{EvaluationMetrics, LabelVocabulary, Trainer, TrainerBuilder, TrainingConfig, TrainingReport};
pub use context::{PipelineContext, PipelineContextBuilder};
pub use error::{PipelineError, Result};
pub use featurizer::{
    ColorMode, EmbeddingConfig, EmbeddingFeaturizer, FeatureVector, Featurizer, FeaturizerConfig,
    PixelConfig, PixelFeaturizer,
};
pub use manifest::{FieldDescriptor, FieldKind, ManifestReader, ManifestRecord, ManifestSchema};
pub use predictor::{predict, PredictionResult, Predictor};
pub use runtime::{create_session_builder, OptimizationLevel, RuntimeConfig};

/// Installs the env_logger backend, defaulting to `info` when `RUST_LOG` is unset
pub fn init_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
