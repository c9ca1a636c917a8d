//! Synthetic cat-image fixtures shared by the integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use cattracker::{ColorMode, FeaturizerConfig, PipelineContext, PixelConfig, TrainingConfig};
use env_logger::{Builder, Env};
use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Breed name and the base coat color its images are drawn around
pub const BREEDS: [(&str, [u8; 3]); 3] = [
    ("abyssinian", [200, 60, 40]),
    ("british-shorthair", [60, 180, 70]),
    ("russian-blue", [50, 70, 210]),
];

/// Writes a 16x16 PNG of `base` with per-pixel noise
pub fn write_image(path: &Path, base: [u8; 3], rng: &mut StdRng) {
    let image = RgbImage::from_fn(16, 16, |_, _| {
        let mut pixel = [0u8; 3];
        for (channel, value) in pixel.iter_mut().zip(base) {
            let noisy = value as i16 + rng.gen_range(-30i16..=30);
            *channel = noisy.clamp(0, 255) as u8;
        }
        Rgb(pixel)
    });
    image.save(path).unwrap();
}

/// Writes `per_class` images for every breed under `dir/<prefix>` and a manifest
/// listing them with relative paths. Returns the manifest path.
pub fn write_dataset(dir: &Path, prefix: &str, per_class: usize, seed: u64) -> PathBuf {
    let mut rng = StdRng::seed_from_u64(seed);
    let image_dir = dir.join(prefix);
    fs::create_dir_all(&image_dir).unwrap();

    let mut manifest = String::from("Label\tImageSource\n");
    for i in 0..per_class {
        for (breed, base) in BREEDS {
            let name = format!("{}-{:02}.png", breed, i);
            write_image(&image_dir.join(&name), base, &mut rng);
            manifest.push_str(&format!("{}\t{}/{}\n", breed, prefix, name));
        }
    }

    let manifest_path = dir.join(format!("{}.tsv", prefix));
    fs::write(&manifest_path, manifest).unwrap();
    manifest_path
}

pub fn pixel_config() -> FeaturizerConfig {
    FeaturizerConfig::Pixels(PixelConfig {
        width: 8,
        height: 8,
        color: ColorMode::Rgb,
        ..PixelConfig::default()
    })
}

// Initialize test logger
pub fn init() {
    let _ = Builder::from_env(Env::default().default_filter_or("warn"))
        .is_test(true)
        .try_init();
}

pub fn context(seed: u64) -> PipelineContext {
    init();
    PipelineContext::builder()
        .with_training_config(TrainingConfig {
            seed,
            epochs: 200,
            ..TrainingConfig::default()
        })
        .with_featurizer_config(pixel_config())
        .with_threads(2)
        .build()
        .unwrap()
}
