//! Error types shared by the recognition pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur anywhere in the pipeline.
///
/// Per-item failures (`DecodeFailure`, `NoHandDetected`, `InvalidLandmarkSet`,
/// `InvalidFeatureLength`) are caught inside the batch loops and turned into status text.
/// The remaining kinds abort the operation that raised them.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to load image: {}", .path.display())]
    DecodeFailure {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("No hand detected")]
    NoHandDetected,
    #[error("Invalid landmark set: expected 21 points, got {0}")]
    InvalidLandmarkSet(usize),
    #[error("Invalid feature vector length: expected {expected}, got {actual}")]
    InvalidFeatureLength { expected: usize, actual: usize },
    #[error("Dataset not found at {}", .0.display())]
    CorpusNotFound(PathBuf),
    #[error("Model not found at {}", .0.display())]
    ModelNotFound(PathBuf),
    #[error("Camera unavailable: {0}")]
    CameraUnavailable(String),
    #[error("Camera is already in use by {0}")]
    CameraBusy(&'static str),
    #[error("{artifact} schema mismatch: found version {found_version} with {found_features} features, expected version {expected_version} with {expected_features} features")]
    SchemaMismatch {
        artifact: &'static str,
        found_version: u32,
        found_features: usize,
        expected_version: u32,
        expected_features: usize,
    },
    #[error("Malformed {artifact}: {reason}")]
    MalformedArtifact {
        artifact: &'static str,
        reason: String,
    },
    #[error("Hand detector error: {0}")]
    Detector(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Bincode(#[from] bincode::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
