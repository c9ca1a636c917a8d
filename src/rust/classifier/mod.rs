use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

pub mod builder;
pub mod metrics;
mod model;
mod vocabulary;

pub use builder::{Trainer, TrainerBuilder};
pub use metrics::EvaluationMetrics;
pub use model::SoftmaxModel;
pub use vocabulary::LabelVocabulary;

/// Hyperparameters of a training run.
///
/// The seed drives weight initialisation and the validation split, so two runs
/// with the same config and data produce the same artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub learning_rate: f32,
    pub epochs: usize,
    /// L2 penalty on the weights
    pub l2: f32,
    /// Training stops early once every gradient component is below this
    pub tolerance: f32,
    /// Share of each class held out to report validation metrics
    pub validation_fraction: f32,
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            epochs: 300,
            l2: 1e-4,
            tolerance: 1e-5,
            validation_fraction: 0.2,
            seed: 42,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.epochs == 0 {
            return Err(PipelineError::InvalidConfig("epochs must be at least 1".into()));
        }
        if !(self.l2.is_finite() && self.l2 >= 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "l2 must be non-negative, got {}",
                self.l2
            )));
        }
        if !(0.0..1.0).contains(&self.validation_fraction) {
            return Err(PipelineError::InvalidConfig(format!(
                "validation_fraction must be in [0, 1), got {}",
                self.validation_fraction
            )));
        }
        Ok(())
    }
}

/// Diagnostics of a training run; advisory only, not stored in the artifact
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub records: usize,
    pub classes: usize,
    /// Epochs run by the final fit on all records
    pub epochs: usize,
    /// Metrics of the final model on the records it was fit on
    pub training: EvaluationMetrics,
    /// Metrics on the held-out split, when one could be made
    pub validation: Option<EvaluationMetrics>,
}

impl fmt::Display for TrainingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Trained on {} records, {} classes, {} epochs",
            self.records, self.classes, self.epochs
        )?;
        write!(f, "  training:   {}", self.training)?;
        if let Some(validation) = &self.validation {
            write!(f, "\n  validation: {}", validation)?;
        }
        Ok(())
    }
}
