//! Persisted model bundle.
//!
//! File layout (little endian):
//!
//! | offset | size | field                      |
//! |--------|------|----------------------------|
//! | 0      | 4    | magic `CATM`               |
//! | 4      | 4    | format version             |
//! | 8      | 8    | payload length             |
//! | 16     | 32   | SHA-256 of the payload     |
//! | 48     | n    | bincode payload            |
//!
//! [`FORMAT_VERSION`] must be bumped whenever the serialized shape of any
//! payload type changes, so stale files are rejected instead of misread.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::classifier::{LabelVocabulary, SoftmaxModel, TrainingConfig};
use crate::error::{PipelineError, Result};
use crate::featurizer::FeaturizerConfig;

pub const FORMAT_VERSION: u32 = 1;

const MAGIC: [u8; 4] = *b"CATM";
const HEADER_LEN: usize = 4 + 4 + 8 + 32;

/// A trained classifier together with everything needed to reproduce its inputs.
///
/// Immutable once created by the trainer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    format_version: u32,
    featurizer_config: FeaturizerConfig,
    label_vocabulary: LabelVocabulary,
    trained_model: SoftmaxModel,
    training_config: TrainingConfig,
}

impl ModelArtifact {
    pub(crate) fn new(
        featurizer_config: FeaturizerConfig,
        label_vocabulary: LabelVocabulary,
        trained_model: SoftmaxModel,
        training_config: TrainingConfig,
    ) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            featurizer_config,
            label_vocabulary,
            trained_model,
            training_config,
        }
    }

    pub fn format_version(&self) -> u32 {
        self.format_version
    }

    pub fn featurizer_config(&self) -> &FeaturizerConfig {
        &self.featurizer_config
    }

    pub fn label_vocabulary(&self) -> &LabelVocabulary {
        &self.label_vocabulary
    }

    pub fn trained_model(&self) -> &SoftmaxModel {
        &self.trained_model
    }

    /// Hyperparameters, including the seed, the model was trained with
    pub fn training_config(&self) -> &TrainingConfig {
        &self.training_config
    }

    /// Writes the artifact to `path`, replacing any existing file.
    ///
    /// # Errors
    /// - `WriteError` if the file cannot be created or written
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let write_error = |source: io::Error| PipelineError::WriteError {
            path: path.to_path_buf(),
            source,
        };

        let payload = bincode::serialize(self)
            .map_err(|e| write_error(io::Error::new(io::ErrorKind::InvalidData, e)))?;
        let checksum = Sha256::digest(&payload);

        let file = File::create(path).map_err(write_error)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&MAGIC).map_err(write_error)?;
        writer
            .write_all(&self.format_version.to_le_bytes())
            .map_err(write_error)?;
        writer
            .write_all(&(payload.len() as u64).to_le_bytes())
            .map_err(write_error)?;
        writer.write_all(&checksum).map_err(write_error)?;
        writer.write_all(&payload).map_err(write_error)?;
        writer.flush().map_err(write_error)?;

        info!("Saved model artifact to {:?} ({} bytes)", path, HEADER_LEN + payload.len());
        Ok(())
    }

    /// Reads and validates an artifact.
    ///
    /// The file handle is released before the payload is decoded.
    ///
    /// # Errors
    /// - `ModelNotFound` if `path` does not exist
    /// - `CorruptArtifact` for a bad header, unknown version, checksum mismatch,
    ///   undecodable payload or inconsistent contents
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = {
            let mut file = File::open(path).map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    PipelineError::ModelNotFound {
                        path: path.to_path_buf(),
                    }
                } else {
                    PipelineError::Io(e)
                }
            })?;
            let mut bytes = Vec::new();
            file.read_to_end(&mut bytes)?;
            bytes
        };

        let artifact = Self::decode(&bytes).map_err(|reason| PipelineError::CorruptArtifact {
            path: path.to_path_buf(),
            reason,
        })?;
        debug!(
            "Loaded model artifact {:?}: {} classes, {} features",
            path,
            artifact.label_vocabulary.len(),
            artifact.featurizer_config.dimensionality()
        );
        Ok(artifact)
    }

    fn decode(bytes: &[u8]) -> std::result::Result<Self, String> {
        if bytes.len() < HEADER_LEN {
            return Err(format!("file is {} bytes, shorter than the header", bytes.len()));
        }
        let (header, payload) = bytes.split_at(HEADER_LEN);

        if header[0..4] != MAGIC {
            return Err("not a model artifact (bad magic)".into());
        }
        let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        if version != FORMAT_VERSION {
            return Err(format!(
                "unsupported format version {} (expected {})",
                version, FORMAT_VERSION
            ));
        }
        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&header[8..16]);
        let payload_len = u64::from_le_bytes(len_bytes);
        if payload_len != payload.len() as u64 {
            return Err(format!(
                "payload is {} bytes, header says {}",
                payload.len(),
                payload_len
            ));
        }
        if Sha256::digest(payload).as_slice() != &header[16..48] {
            return Err("checksum mismatch".into());
        }

        let artifact: Self = bincode::deserialize(payload)
            .map_err(|e| format!("failed to deserialize payload: {}", e))?;
        artifact.check_consistency(version)?;
        Ok(artifact)
    }

    fn check_consistency(&self, header_version: u32) -> std::result::Result<(), String> {
        if self.format_version != header_version {
            return Err(format!(
                "payload version {} differs from header version {}",
                self.format_version, header_version
            ));
        }
        if self.label_vocabulary.len() < 2 {
            return Err("label vocabulary has fewer than 2 labels".into());
        }
        if self.trained_model.num_classes() != self.label_vocabulary.len() {
            return Err(format!(
                "model has {} classes, vocabulary has {}",
                self.trained_model.num_classes(),
                self.label_vocabulary.len()
            ));
        }
        if self.trained_model.num_features() != self.featurizer_config.dimensionality() {
            return Err(format!(
                "model expects {} features, featurizer produces {}",
                self.trained_model.num_features(),
                self.featurizer_config.dimensionality()
            ));
        }
        Ok(())
    }
}

/// Writes `artifact` to `path`; see [`ModelArtifact::save`]
pub fn save(artifact: &ModelArtifact, path: impl AsRef<Path>) -> Result<()> {
    artifact.save(path)
}

/// Reads the artifact at `path`; see [`ModelArtifact::load`]
pub fn load(path: impl AsRef<Path>) -> Result<ModelArtifact> {
    ModelArtifact::load(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Trainer;
    use crate::featurizer::{ColorMode, PixelConfig};
    use ndarray::Array1;
    use std::fs;
    use tempfile::TempDir;

    fn sample_artifact() -> ModelArtifact {
        let featurizer_config = FeaturizerConfig::Pixels(PixelConfig {
            width: 3,
            height: 1,
            color: ColorMode::Grayscale,
            mean: 0.5,
            std: 0.25,
        });
        let records = vec![
            (Array1::from_vec(vec![0.0, 0.1, 0.0]), "siamese".to_string()),
            (Array1::from_vec(vec![0.1, 0.0, 0.1]), "siamese".to_string()),
            (Array1::from_vec(vec![1.0, 0.9, 1.0]), "maine_coon".to_string()),
            (Array1::from_vec(vec![0.9, 1.0, 0.9]), "maine_coon".to_string()),
        ];
        Trainer::builder()
            .with_featurizer_config(featurizer_config)
            .with_epochs(50)
            .build()
            .unwrap()
            .fit(records)
            .unwrap()
    }

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.ctm");
        let artifact = sample_artifact();

        save(&artifact, &path).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded, artifact);
        assert_eq!(loaded.format_version(), FORMAT_VERSION);
    }

    #[test]
    fn test_save_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.ctm");
        fs::write(&path, b"old contents that are not an artifact").unwrap();

        sample_artifact().save(&path).unwrap();
        assert!(load(&path).is_ok());
    }

    #[test]
    fn test_missing_file() {
        let result = load("/no/such/dir/model.ctm");
        assert!(matches!(result, Err(PipelineError::ModelNotFound { .. })));
    }

    #[test]
    fn test_unwritable_destination() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing-dir").join("model.ctm");
        let result = sample_artifact().save(&path);
        assert!(matches!(result, Err(PipelineError::WriteError { .. })));
    }

    #[test]
    fn test_rejects_unknown_version() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.ctm");
        sample_artifact().save(&path).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        bytes[4..8].copy_from_slice(&99u32.to_le_bytes());
        fs::write(&path, &bytes).unwrap();

        match load(&path) {
            Err(PipelineError::CorruptArtifact { reason, .. }) => {
                assert!(reason.contains("version 99"))
            }
            other => panic!("expected CorruptArtifact, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_damaged_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.ctm");
        sample_artifact().save(&path).unwrap();
        let original = fs::read(&path).unwrap();

        // flipped payload byte
        let mut bytes = original.clone();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(&path, &bytes).unwrap();
        assert!(matches!(load(&path), Err(PipelineError::CorruptArtifact { .. })));

        // truncated
        fs::write(&path, &original[..original.len() / 2]).unwrap();
        assert!(matches!(load(&path), Err(PipelineError::CorruptArtifact { .. })));

        // wrong magic
        let mut bytes = original.clone();
        bytes[0] = b'X';
        fs::write(&path, &bytes).unwrap();
        assert!(matches!(load(&path), Err(PipelineError::CorruptArtifact { .. })));

        // empty
        fs::write(&path, b"").unwrap();
        assert!(matches!(load(&path), Err(PipelineError::CorruptArtifact { .. })));
    }
}
