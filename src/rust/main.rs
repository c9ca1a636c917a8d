use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Context;
use cattracker::featurizer::{IMAGENET_MEAN, IMAGENET_STD};
use cattracker::pipeline::{self, BatchPrediction};
use cattracker::{
    paths, ColorMode, EmbeddingFeaturizer, Featurizer, FeaturizerConfig, LabelVocabulary,
    PipelineContext, PixelConfig, RuntimeConfig, TrainingConfig,
};
use clap::{Args, Parser, Subcommand};
use log::info;

/// Cat Breed Trainer/Classifier
#[derive(Parser, Debug)]
#[command(author, version, about = "Trains and classifies cat breeds", long_about = None)]
#[command(after_help = "use 'cattracker train' or 'cattracker predict' to either (re)train the model or classify an image")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train the cat model
    Train(TrainArgs),
    /// Predict a cat image or multiple cat images
    Predict(PredictArgs),
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// The full path of a TSV file
    #[arg(short = 't', long = "tsv-file")]
    tsv_file: Option<PathBuf>,

    /// Where to save the model file
    #[arg(short = 'm', long = "model-file")]
    model_file: Option<PathBuf>,

    /// Seed for weight initialisation and the validation split
    #[arg(long, default_value_t = TrainingConfig::default().seed)]
    seed: u64,

    #[arg(long, default_value_t = TrainingConfig::default().epochs)]
    epochs: usize,

    #[arg(long, default_value_t = TrainingConfig::default().learning_rate)]
    learning_rate: f32,

    /// Share of each class held out for validation metrics
    #[arg(long, default_value_t = TrainingConfig::default().validation_fraction)]
    validation_fraction: f32,

    /// Side length images are resized to before flattening
    #[arg(long, default_value_t = 32)]
    image_size: u32,

    /// Flatten grayscale pixels instead of RGB
    #[arg(long, default_value_t = false)]
    grayscale: bool,

    /// Use a pretrained ONNX image model for features instead of raw pixels
    #[arg(long)]
    embedding_model: Option<PathBuf>,

    /// Input side length of the embedding model
    #[arg(long, default_value_t = 224)]
    embedding_input_size: u32,

    /// Worker threads for featurization (0 = all cores)
    #[arg(long, default_value_t = 0)]
    threads: usize,
}

#[derive(Args, Debug)]
struct PredictArgs {
    /// An image to classify
    #[arg(short = 'f', long = "file", conflicts_with = "tsv_file")]
    file: Option<PathBuf>,

    /// The full path of a TSV file
    #[arg(short = 't', long = "tsv-file")]
    tsv_file: Option<PathBuf>,

    /// The model file to load
    #[arg(short = 'm', long = "model-file")]
    model_file: Option<PathBuf>,

    /// Worker threads for batch prediction (0 = all cores)
    #[arg(long, default_value_t = 0)]
    threads: usize,
}

fn main() -> ExitCode {
    cattracker::init_logger();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Usage errors and --help both end here; neither is a failure of the app
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Unable to execute application: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Train(args) => train(args),
        Commands::Predict(args) => predict(args),
    }
}

fn train(args: TrainArgs) -> anyhow::Result<()> {
    println!("=============== Start training ===============");
    let start_time = Instant::now();

    let tsv_file = args.tsv_file.clone().unwrap_or_else(paths::default_train_manifest);
    let model_file = args.model_file.clone().unwrap_or_else(paths::default_model_file);
    if args.model_file.is_none() {
        if let Some(parent) = model_file.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create model directory {:?}", parent))?;
        }
    }

    let runtime = RuntimeConfig::default();
    let featurizer_config = match &args.embedding_model {
        Some(model) => EmbeddingFeaturizer::open(
            model,
            (args.embedding_input_size, args.embedding_input_size),
            IMAGENET_MEAN,
            IMAGENET_STD,
            &runtime,
        )
        .with_context(|| format!("Failed to open embedding model {:?}", model))?
        .config(),
        None => FeaturizerConfig::Pixels(PixelConfig {
            width: args.image_size,
            height: args.image_size,
            color: if args.grayscale {
                ColorMode::Grayscale
            } else {
                ColorMode::Rgb
            },
            ..PixelConfig::default()
        }),
    };

    let ctx = PipelineContext::builder()
        .with_training_config(TrainingConfig {
            seed: args.seed,
            epochs: args.epochs,
            learning_rate: args.learning_rate,
            validation_fraction: args.validation_fraction,
            ..TrainingConfig::default()
        })
        .with_featurizer_config(featurizer_config)
        .with_runtime_config(runtime)
        .with_threads(args.threads)
        .build()?;

    let report = pipeline::train(&ctx, &tsv_file, &model_file)?;
    println!("{}", report);
    println!("Model saved to {}", model_file.display());
    info!("Training took {:.2?}", start_time.elapsed());
    println!("=============== Finish training ===============");
    Ok(())
}

fn predict(args: PredictArgs) -> anyhow::Result<()> {
    println!("=============== Start prediction ===============");
    let model_file = args.model_file.unwrap_or_else(paths::default_model_file);
    let ctx = PipelineContext::builder().with_threads(args.threads).build()?;

    let batch = match args.file {
        Some(file) => pipeline::predict_file(&ctx, &model_file, &file)?,
        None => {
            let tsv_file = args.tsv_file.unwrap_or_else(paths::default_test_manifest);
            pipeline::predict_manifest(&ctx, &model_file, &tsv_file)?
        }
    };

    for prediction in &batch.predictions {
        print_prediction(prediction, &batch.vocabulary);
    }

    println!("=============== End of process ===============");
    Ok(())
}

fn print_prediction(prediction: &BatchPrediction, vocabulary: &LabelVocabulary) {
    println!("ImageSource: {}", prediction.record.image_path.display());
    println!("Actual Label: {}", prediction.record.label);
    match &prediction.result {
        Ok(result) => {
            let scores: Vec<String> = result.scores.iter().map(|s| format!("{:.4}", s)).collect();
            println!("Predicted Label value: {}", result.predicted_label);
            println!("Predicted Label scores: [{}]", scores.join(","));
            for (label, score) in result.ranked(vocabulary) {
                println!("    {}: {:.1}%", label, score * 100.0);
            }
        }
        Err(e) => {
            eprintln!("Prediction failed: {}", e);
        }
    }
    println!();
}
