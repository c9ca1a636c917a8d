//! Default file locations used when the caller does not supply a path.

use std::env;
use std::path::PathBuf;

/// Environment variable overriding the base data directory.
pub const HOME_ENV: &str = "CATTRACKER_HOME";

/// Returns the base directory holding manifests and the model file
pub fn default_base_dir() -> PathBuf {
    // 1. Check environment variable
    if let Ok(path) = env::var(HOME_ENV) {
        return PathBuf::from(path);
    }

    // 2. Use platform-specific data directory
    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("cattracker");
    }

    // 3. Fallback to user's home directory
    if let Some(home_dir) = dirs::home_dir() {
        return home_dir.join(".cattracker");
    }

    env::temp_dir().join("cattracker")
}

pub fn default_train_manifest() -> PathBuf {
    default_base_dir().join("cats").join("cats.tsv")
}

pub fn default_test_manifest() -> PathBuf {
    default_base_dir().join("testImages").join("test.tsv")
}

pub fn default_model_file() -> PathBuf {
    default_base_dir().join("model").join("MLModel.ctm")
}
