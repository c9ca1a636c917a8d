use std::io;
use std::path::PathBuf;

/// Represents the different types of errors that can occur while training or predicting.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The manifest file does not exist
    #[error("Manifest not found: {}", path.display())]
    ManifestNotFound { path: PathBuf },

    /// A manifest line could not be split into the expected fields
    #[error("Malformed manifest {} at line {line}: {reason}", path.display())]
    MalformedManifest {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// The image could not be read or decoded
    #[error("Failed to decode image {}: {reason}", path.display())]
    ImageDecodeError { path: PathBuf, reason: String },

    /// The image is in a format the decoder does not support
    #[error("Unsupported image format for {}: {reason}", path.display())]
    UnsupportedImageFormat { path: PathBuf, reason: String },

    /// Not enough records or classes to fit a classifier
    #[error("Insufficient training data: {0}")]
    InsufficientData(String),

    /// No model artifact exists at the given path
    #[error("Model not found: {}", path.display())]
    ModelNotFound { path: PathBuf },

    /// The artifact exists but cannot be used
    #[error("Corrupt model artifact {}: {reason}", path.display())]
    CorruptArtifact { path: PathBuf, reason: String },

    /// Feature vector length does not match the artifact's featurizer
    #[error("Feature dimension mismatch: expected {expected}, got {actual}")]
    FeatureDimensionMismatch { expected: usize, actual: usize },

    /// A featurizer configured differently from the artifact was supplied
    #[error("Featurizer mismatch: {0}")]
    FeaturizerMismatch(String),

    /// The model artifact could not be written
    #[error("Failed to write {}: {source}", path.display())]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Training or featurizer parameters are out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Error occurred while loading or running an ONNX model
    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<ort::Error> for PipelineError {
    fn from(err: ort::Error) -> Self {
        PipelineError::Runtime(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
