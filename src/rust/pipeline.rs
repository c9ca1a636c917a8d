//! End-to-end `train` and `predict` flows built from the individual components.

use std::path::Path;

use log::info;
use rayon::prelude::*;

use crate::artifact::ModelArtifact;
use crate::classifier::{LabelVocabulary, Trainer, TrainingReport};
use crate::context::PipelineContext;
use crate::error::Result;
use crate::featurizer::{self, FeatureVector};
use crate::manifest::{ManifestReader, ManifestRecord};
use crate::predictor::{PredictionResult, Predictor};

/// One input record and what the model made of it
#[derive(Debug)]
pub struct BatchPrediction {
    pub record: ManifestRecord,
    pub result: Result<PredictionResult>,
}

/// Predictions of one `predict` invocation with the labels their scores refer to
#[derive(Debug)]
pub struct PredictionBatch {
    pub vocabulary: LabelVocabulary,
    pub predictions: Vec<BatchPrediction>,
}

/// Trains on `manifest` and writes the artifact to `model_path`.
///
/// Any unreadable image fails the whole run with the error of the first such
/// row in manifest order; rows are never skipped.
pub fn train(ctx: &PipelineContext, manifest: &Path, model_path: &Path) -> Result<TrainingReport> {
    let records = ManifestReader::new().read_all(manifest)?;
    info!("Read {} records from {:?}", records.len(), manifest);

    let featurizer = featurizer::from_config(ctx.featurizer_config(), ctx)?;
    let extracted: Vec<Result<FeatureVector>> = ctx.install(|| {
        records
            .par_iter()
            .map(|record| featurizer.extract(&record.image_path))
            .collect()
    });
    // Results are in manifest order, so the reported failure is always the earliest row
    let features = extracted.into_iter().collect::<Result<Vec<_>>>()?;

    let trainer = Trainer::builder()
        .with_training_config(ctx.training_config().clone())
        .with_featurizer_config(featurizer.config())
        .build()?;
    let labels = records.into_iter().map(|record| record.label);
    let (artifact, report) = trainer.fit_with_report(features.into_iter().zip(labels))?;
    info!("{}", report);

    artifact.save(model_path)?;
    Ok(report)
}

/// Loads `model_path` and predicts every record of `manifest`, in file order
pub fn predict_manifest(
    ctx: &PipelineContext,
    model_path: &Path,
    manifest: &Path,
) -> Result<PredictionBatch> {
    let predictor = load_predictor(ctx, model_path)?;
    let records = ManifestReader::new().read_all(manifest)?;
    info!("Predicting {} records from {:?}", records.len(), manifest);

    let results = predictor.predict_batch(&records, ctx);
    let predictions = records
        .into_iter()
        .zip(results)
        .map(|(record, result)| BatchPrediction { record, result })
        .collect();
    Ok(PredictionBatch {
        vocabulary: predictor.label_vocabulary().clone(),
        predictions,
    })
}

/// Loads `model_path` and predicts a single image; its label is the file name
pub fn predict_file(ctx: &PipelineContext, model_path: &Path, image: &Path) -> Result<PredictionBatch> {
    let predictor = load_predictor(ctx, model_path)?;
    let record = ManifestRecord::adhoc(image)?;
    let result = predictor.predict_image(&record.image_path);
    Ok(PredictionBatch {
        vocabulary: predictor.label_vocabulary().clone(),
        predictions: vec![BatchPrediction { record, result }],
    })
}

fn load_predictor(ctx: &PipelineContext, model_path: &Path) -> Result<Predictor> {
    let artifact = ModelArtifact::load(model_path)?;
    info!(
        "Loaded model {:?} with labels {:?}",
        model_path,
        artifact.label_vocabulary().labels()
    );
    Predictor::new(artifact, ctx)
}
