//! Application configuration.
//!
//! Loaded from `asl-recognizer.json` in the working directory. Every field is optional in the
//! file; missing ones take the defaults below.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "asl-recognizer.json";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root of the captured image corpus (`<data_dir>/<LETTER>/<n>.<ext>`).
    pub data_dir: PathBuf,
    /// Extension (and encoding) of captured images.
    pub image_extension: String,
    /// Serialized feature corpus.
    pub corpus_path: PathBuf,
    /// Serialized trained model.
    pub model_path: PathBuf,
    /// Capture settings.
    pub capture: CaptureConfig,
    /// Training settings.
    pub training: TrainingConfig,
    /// Hand detector settings.
    pub detector: DetectorConfig,
    /// Camera device index.
    pub camera_index: u32,
    /// Directory of images replayed as a camera when no webcam backend is available.
    pub replay_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            image_extension: "jpg".to_string(),
            corpus_path: PathBuf::from("data.json"),
            model_path: PathBuf::from("model.bin"),
            capture: CaptureConfig::default(),
            training: TrainingConfig::default(),
            detector: DetectorConfig::default(),
            camera_index: 0,
            replay_dir: None,
        }
    }
}

impl AppConfig {
    /// Loads the configuration from `path`, or returns the defaults if the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&text)?;
        log::info!("Loaded config from {:?}", path);
        Ok(config)
    }
}

/// Image capture pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Images captured per letter.
    pub images_per_class: usize,
    /// Minimum time between two frame grabs.
    pub interval_ms: u64,
}

impl CaptureConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            images_per_class: 100,
            interval_ms: 50,
        }
    }
}

/// Classifier training.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Fraction of each class held out for evaluation.
    pub test_fraction: f64,
    /// Seed for the split and the forest.
    pub seed: u64,
    /// Number of trees in the forest.
    pub tree_count: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: 42,
            tree_count: 100,
        }
    }
}

/// ONNX hand detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Directory holding `palm_detection_lite.onnx` and `hand_landmark_lite.onnx`.
    pub model_dir: PathBuf,
    /// Minimum palm score when every image is processed independently.
    pub single_shot_min_detection: f32,
    /// Maximum hands reported per image in single-shot mode.
    pub single_shot_max_hands: usize,
    /// Minimum palm score while tracking.
    pub tracking_min_detection: f32,
    /// Minimum landmark presence to keep tracking a hand without re-detecting it.
    pub tracking_min_presence: f32,
    /// ONNX Runtime intra-op threads per session.
    pub intra_threads: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            single_shot_min_detection: 0.3,
            single_shot_max_hands: 2,
            tracking_min_detection: 0.7,
            tracking_min_presence: 0.7,
            intra_threads: 2,
        }
    }
}
