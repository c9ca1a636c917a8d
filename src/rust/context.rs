use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::classifier::TrainingConfig;
use crate::error::{PipelineError, Result};
use crate::featurizer::FeaturizerConfig;
use crate::runtime::RuntimeConfig;

/// Explicit state shared by one train or predict pipeline.
///
/// Every component receives the context by reference; nothing is kept in
/// process-wide globals, so independent pipelines can run side by side.
#[derive(Debug)]
pub struct PipelineContext {
    training: TrainingConfig,
    featurizer: FeaturizerConfig,
    runtime: RuntimeConfig,
    pool: ThreadPool,
}

impl PipelineContext {
    pub fn builder() -> PipelineContextBuilder {
        PipelineContextBuilder::default()
    }

    pub fn training_config(&self) -> &TrainingConfig {
        &self.training
    }

    /// Featurizer configuration used when training a new model
    pub fn featurizer_config(&self) -> &FeaturizerConfig {
        &self.featurizer
    }

    pub fn runtime_config(&self) -> &RuntimeConfig {
        &self.runtime
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Runs `op` on this context's worker pool
    pub fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }
}

#[derive(Debug, Default)]
pub struct PipelineContextBuilder {
    training: TrainingConfig,
    featurizer: FeaturizerConfig,
    runtime: RuntimeConfig,
    threads: usize,
}

impl PipelineContextBuilder {
    pub fn with_training_config(mut self, config: TrainingConfig) -> Self {
        self.training = config;
        self
    }

    pub fn with_featurizer_config(mut self, config: FeaturizerConfig) -> Self {
        self.featurizer = config;
        self
    }

    pub fn with_runtime_config(mut self, config: RuntimeConfig) -> Self {
        self.runtime = config;
        self
    }

    /// Number of worker threads; 0 uses one per available core
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn build(self) -> Result<PipelineContext> {
        self.training.validate()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .thread_name(|i| format!("cattracker-worker-{}", i))
            .build()
            .map_err(|e| PipelineError::InvalidConfig(format!("Failed to start worker pool: {}", e)))?;

        Ok(PipelineContext {
            training: self.training,
            featurizer: self.featurizer,
            runtime: self.runtime,
            pool,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_count() {
        let ctx = PipelineContext::builder().with_threads(2).build().unwrap();
        assert_eq!(ctx.threads(), 2);
        assert_eq!(ctx.install(|| rayon::current_num_threads()), 2);
    }

    #[test]
    fn test_rejects_invalid_training_config() {
        let result = PipelineContext::builder()
            .with_training_config(TrainingConfig {
                epochs: 0,
                ..TrainingConfig::default()
            })
            .build();
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_independent_contexts() {
        let a = PipelineContext::builder().with_threads(1).build().unwrap();
        let b = PipelineContext::builder().with_threads(3).build().unwrap();
        assert_eq!(a.threads(), 1);
        assert_eq!(b.threads(), 3);
    }
}
