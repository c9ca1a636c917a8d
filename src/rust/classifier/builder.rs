use std::collections::BTreeMap;

use log::{info, warn};
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::metrics::EvaluationMetrics;
use super::model::SoftmaxModel;
use super::vocabulary::LabelVocabulary;
use super::{TrainingConfig, TrainingReport};
use crate::artifact::ModelArtifact;
use crate::error::{PipelineError, Result};
use crate::featurizer::{FeatureVector, FeaturizerConfig};

/// Fits a softmax classifier over `(feature vector, label)` pairs.
///
/// Construct it with [`Trainer::builder`]:
///
/// ```
/// use cattracker::{Trainer, FeaturizerConfig};
///
/// let trainer = Trainer::builder()
///     .with_seed(7)
///     .with_epochs(100)
///     .with_featurizer_config(FeaturizerConfig::default())
///     .build()
///     .unwrap();
/// assert_eq!(trainer.training_config().seed, 7);
/// ```
#[derive(Debug, Clone)]
pub struct Trainer {
    config: TrainingConfig,
    featurizer_config: FeaturizerConfig,
}

impl Trainer {
    /// Creates a new TrainerBuilder for fluent construction
    pub fn builder() -> TrainerBuilder {
        TrainerBuilder::new()
    }

    pub fn training_config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn featurizer_config(&self) -> &FeaturizerConfig {
        &self.featurizer_config
    }

    /// Fits a model and packages it as an artifact.
    ///
    /// # Errors
    /// - `InsufficientData` if there are no records, a label is empty, or fewer
    ///   than two distinct labels are present
    /// - `FeatureDimensionMismatch` if a vector's length differs from the
    ///   featurizer's dimensionality
    pub fn fit<I>(&self, records: I) -> Result<ModelArtifact>
    where
        I: IntoIterator<Item = (FeatureVector, String)>,
    {
        let (artifact, report) = self.fit_with_report(records)?;
        info!("{}", report);
        Ok(artifact)
    }

    /// Like [`Trainer::fit`], also returning the training diagnostics
    pub fn fit_with_report<I>(&self, records: I) -> Result<(ModelArtifact, TrainingReport)>
    where
        I: IntoIterator<Item = (FeatureVector, String)>,
    {
        let records: Vec<(FeatureVector, String)> = records.into_iter().collect();
        let dimensionality = self.featurizer_config.dimensionality();
        Self::validate_records(&records, dimensionality)?;

        let vocabulary = LabelVocabulary::from_labels(records.iter().map(|(_, label)| label));
        if vocabulary.len() < 2 {
            return Err(PipelineError::InsufficientData(format!(
                "At least 2 distinct labels are required, found {}",
                vocabulary.len()
            )));
        }

        let mut x = Array2::<f32>::zeros((records.len(), dimensionality));
        let mut y = Vec::with_capacity(records.len());
        for (row, (features, label)) in records.iter().enumerate() {
            x.row_mut(row).assign(features);
            // Every label is in the vocabulary it was built from
            y.push(vocabulary.index_of(label).unwrap_or_default());
        }
        info!(
            "Training on {} records, {} classes, {} features",
            records.len(),
            vocabulary.len(),
            dimensionality
        );

        let validation = self.validate_holdout(&x, &y, vocabulary.len());

        let (model, epochs) = SoftmaxModel::fit(&x, &y, vocabulary.len(), &self.config);
        let training = EvaluationMetrics::evaluate(&model.scores_batch(&x), &y);

        let report = TrainingReport {
            records: records.len(),
            classes: vocabulary.len(),
            epochs,
            training,
            validation,
        };
        let artifact = ModelArtifact::new(
            self.featurizer_config.clone(),
            vocabulary,
            model,
            self.config.clone(),
        );
        Ok((artifact, report))
    }

    fn validate_records(records: &[(FeatureVector, String)], dimensionality: usize) -> Result<()> {
        if records.is_empty() {
            return Err(PipelineError::InsufficientData("No training records".into()));
        }
        if let Some(pos) = records.iter().position(|(_, label)| label.is_empty()) {
            return Err(PipelineError::InsufficientData(format!(
                "Record {} has an empty label",
                pos + 1
            )));
        }
        if let Some((features, _)) = records.iter().find(|(f, _)| f.len() != dimensionality) {
            return Err(PipelineError::FeatureDimensionMismatch {
                expected: dimensionality,
                actual: features.len(),
            });
        }
        Ok(())
    }

    /// Fits on a stratified split and scores the held-out part.
    ///
    /// Returns `None` when the split would leave nothing to validate on.
    fn validate_holdout(
        &self,
        x: &Array2<f32>,
        y: &[usize],
        num_classes: usize,
    ) -> Option<EvaluationMetrics> {
        let (train_rows, validation_rows) = self.stratified_split(y);
        if validation_rows.is_empty() {
            if self.config.validation_fraction > 0.0 {
                warn!("Not enough records per class for a validation split, skipping it");
            }
            return None;
        }

        let x_train = x.select(Axis(0), &train_rows);
        let y_train: Vec<usize> = train_rows.iter().map(|&i| y[i]).collect();
        let x_valid = x.select(Axis(0), &validation_rows);
        let y_valid: Vec<usize> = validation_rows.iter().map(|&i| y[i]).collect();

        let (model, _) = SoftmaxModel::fit(&x_train, &y_train, num_classes, &self.config);
        let metrics = EvaluationMetrics::evaluate(&model.scores_batch(&x_valid), &y_valid);
        info!("Validation on {} held-out records: {}", validation_rows.len(), metrics);
        Some(metrics)
    }

    /// Splits row indices per class; classes with fewer than two rows stay in training
    fn stratified_split(&self, y: &[usize]) -> (Vec<usize>, Vec<usize>) {
        let fraction = self.config.validation_fraction;
        let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (row, &class) in y.iter().enumerate() {
            by_class.entry(class).or_default().push(row);
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut train = Vec::with_capacity(y.len());
        let mut validation = Vec::new();
        for (_, mut rows) in by_class {
            rows.shuffle(&mut rng);
            let held_out = if rows.len() < 2 {
                0
            } else {
                ((rows.len() as f32 * fraction).round() as usize).min(rows.len() - 1)
            };
            validation.extend_from_slice(&rows[..held_out]);
            train.extend_from_slice(&rows[held_out..]);
        }
        train.sort_unstable();
        validation.sort_unstable();
        (train, validation)
    }
}

/// A builder for constructing a Trainer with a fluent interface.
#[derive(Debug, Default)]
pub struct TrainerBuilder {
    config: TrainingConfig,
    featurizer_config: Option<FeaturizerConfig>,
}

impl TrainerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all hyperparameters at once
    pub fn with_training_config(mut self, config: TrainingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f32) -> Self {
        self.config.learning_rate = learning_rate;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.config.epochs = epochs;
        self
    }

    pub fn with_l2(mut self, l2: f32) -> Self {
        self.config.l2 = l2;
        self
    }

    pub fn with_validation_fraction(mut self, fraction: f32) -> Self {
        self.config.validation_fraction = fraction;
        self
    }

    /// Sets the featurizer configuration recorded in the produced artifact.
    ///
    /// Feature vectors passed to `fit` must come from this configuration.
    pub fn with_featurizer_config(mut self, config: FeaturizerConfig) -> Self {
        self.featurizer_config = Some(config);
        self
    }

    /// Builds the Trainer
    ///
    /// # Errors
    /// - `InvalidConfig` if a hyperparameter is out of range or no featurizer
    ///   configuration was set
    pub fn build(self) -> Result<Trainer> {
        self.config.validate()?;
        let featurizer_config = self.featurizer_config.ok_or_else(|| {
            PipelineError::InvalidConfig("A featurizer configuration must be set".into())
        })?;
        if featurizer_config.dimensionality() == 0 {
            return Err(PipelineError::InvalidConfig(
                "Featurizer dimensionality must be non-zero".into(),
            ));
        }
        Ok(Trainer {
            config: self.config,
            featurizer_config,
        })
    }
}
