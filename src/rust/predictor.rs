use std::path::Path;

use log::debug;
use rayon::prelude::*;

use crate::artifact::ModelArtifact;
use crate::classifier::metrics::argmax;
use crate::classifier::LabelVocabulary;
use crate::context::PipelineContext;
use crate::error::{PipelineError, Result};
use crate::featurizer::{self, FeatureVector, Featurizer};
use crate::manifest::ManifestRecord;

/// Outcome of scoring one feature vector
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    pub predicted_label: String,
    /// One probability per label, in label-vocabulary order
    pub scores: Vec<f32>,
}

impl PredictionResult {
    /// Pairs each score with its label, highest score first
    pub fn ranked<'a>(&self, vocabulary: &'a LabelVocabulary) -> Vec<(&'a str, f32)> {
        let mut ranked: Vec<(&str, f32)> = vocabulary.iter().zip(self.scores.iter().copied()).collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked
    }
}

/// Scores a feature vector against an artifact's model.
///
/// # Errors
/// - `FeatureDimensionMismatch` if `features` does not have the length the
///   artifact's featurizer produces
pub fn predict(artifact: &ModelArtifact, features: &FeatureVector) -> Result<PredictionResult> {
    let expected = artifact.featurizer_config().dimensionality();
    if features.len() != expected {
        return Err(PipelineError::FeatureDimensionMismatch {
            expected,
            actual: features.len(),
        });
    }

    let scores = artifact.trained_model().scores(features.view());
    let best = argmax(scores.view());
    let predicted_label = artifact
        .label_vocabulary()
        .label(best)
        .ok_or_else(|| PipelineError::CorruptArtifact {
            path: Default::default(),
            reason: format!("score index {} has no label", best),
        })?
        .to_string();

    Ok(PredictionResult {
        predicted_label,
        scores: scores.to_vec(),
    })
}

/// A loaded artifact paired with the featurizer it was trained with.
///
/// Stateless between calls, so it can be shared across threads.
pub struct Predictor {
    artifact: ModelArtifact,
    featurizer: Box<dyn Featurizer>,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<Predictor>();
    }
};

impl Predictor {
    /// Rebuilds the featurizer recorded in `artifact`
    pub fn new(artifact: ModelArtifact, ctx: &PipelineContext) -> Result<Self> {
        let featurizer = featurizer::from_config(artifact.featurizer_config(), ctx)?;
        Ok(Self {
            artifact,
            featurizer,
        })
    }

    /// Uses a caller-supplied featurizer.
    ///
    /// # Errors
    /// - `FeaturizerMismatch` if its configuration differs from the one the
    ///   artifact was trained with
    pub fn with_featurizer(artifact: ModelArtifact, featurizer: Box<dyn Featurizer>) -> Result<Self> {
        let actual = featurizer.config();
        if actual != *artifact.featurizer_config() {
            return Err(PipelineError::FeaturizerMismatch(format!(
                "artifact was trained with {:?}, got {:?}",
                artifact.featurizer_config(),
                actual
            )));
        }
        Ok(Self {
            artifact,
            featurizer,
        })
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    pub fn label_vocabulary(&self) -> &LabelVocabulary {
        self.artifact.label_vocabulary()
    }

    pub fn predict(&self, features: &FeatureVector) -> Result<PredictionResult> {
        predict(&self.artifact, features)
    }

    pub fn predict_image(&self, path: &Path) -> Result<PredictionResult> {
        let features = self.featurizer.extract(path)?;
        let result = self.predict(&features)?;
        debug!("{:?} -> {}", path, result.predicted_label);
        Ok(result)
    }

    /// Predicts every record on the context's worker pool.
    ///
    /// Results are in input order; a failing record does not affect the others.
    pub fn predict_batch(
        &self,
        records: &[ManifestRecord],
        ctx: &PipelineContext,
    ) -> Vec<Result<PredictionResult>> {
        ctx.install(|| {
            records
                .par_iter()
                .map(|record| self.predict_image(&record.image_path))
                .collect()
        })
    }
}

impl std::fmt::Debug for Predictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Predictor")
            .field("featurizer", &self.featurizer.config())
            .field("labels", &self.artifact.label_vocabulary().labels())
            .finish()
    }
}
