//! Dataset builder
//!
//! Walks `<data_dir>/<LETTER>/*`, extracts the hands in every image and stores one feature
//! vector per hand, labeled with the letter's class index.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};

use crate::alphabet::{self, CLASS_COUNT};
use crate::artifact::{self, SchemaTag};
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::features::{self, FeatureVector, FEATURE_LEN};
use crate::ml::{DetectionMode, DetectorFactory, LandmarkExtractor};
use crate::status::StatusSender;

/// Labeled feature vectors, persisted as one JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Corpus {
    #[serde(flatten)]
    pub tag: SchemaTag,
    /// One row of [`FEATURE_LEN`] values per sample.
    pub data: Vec<Vec<f32>>,
    /// Class index of each row.
    pub labels: Vec<u8>,
}

impl Default for Corpus {
    fn default() -> Self {
        Self {
            tag: SchemaTag::current(FEATURE_LEN),
            data: Vec::new(),
            labels: Vec::new(),
        }
    }
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, features: FeatureVector, class_index: usize) {
        debug_assert!(class_index < CLASS_COUNT);
        self.data.push(features.into_inner());
        self.labels.push(class_index as u8);
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Class indices widened for indexing.
    pub fn class_indices(&self) -> Vec<usize> {
        self.labels.iter().map(|&l| l as usize).collect()
    }

    /// Replaces the artifact at `path` with this corpus.
    pub fn save(&self, path: &Path) -> Result<()> {
        artifact::write_atomic(path, |w| Ok(serde_json::to_writer(w, self)?))?;
        log::info!("Saved {} samples to {:?}", self.len(), path);
        Ok(())
    }

    /// Loads and validates the corpus at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::CorpusNotFound(path.to_path_buf()));
        }
        let text = fs::read_to_string(path)?;
        let corpus: Corpus = serde_json::from_str(&text)?;
        corpus.validate()?;
        Ok(corpus)
    }

    fn validate(&self) -> Result<()> {
        self.tag.check("corpus", SchemaTag::current(FEATURE_LEN))?;

        let malformed = |reason: String| Error::MalformedArtifact {
            artifact: "corpus",
            reason,
        };
        if self.data.len() != self.labels.len() {
            return Err(malformed(format!(
                "{} feature rows but {} labels",
                self.data.len(),
                self.labels.len()
            )));
        }
        if let Some((i, row)) = self.data.iter().enumerate().find(|(_, r)| r.len() != FEATURE_LEN) {
            return Err(malformed(format!("row {} has {} values", i, row.len())));
        }
        if let Some(label) = self.labels.iter().find(|&&l| l as usize >= CLASS_COUNT) {
            return Err(malformed(format!("label {} is not a class index", label)));
        }
        Ok(())
    }
}

/// Builds the corpus from the image tree under `config.data_dir` and writes it to
/// `config.corpus_path`.
///
/// Unreadable images and images without a hand are reported and skipped. Only a missing or
/// unreadable data directory, or a failure to write the corpus, aborts the build.
pub fn build_dataset(
    config: &AppConfig,
    extractor: &mut LandmarkExtractor,
    status: &StatusSender,
) -> Result<Corpus> {
    status.info("Creating dataset...");

    let mut corpus = Corpus::new();
    for (class_index, dir) in class_dirs(&config.data_dir)? {
        let letter = alphabet::ALPHABET[class_index];
        status.info(format!("Processing folder: {}", letter));

        for path in sorted_files(&dir)? {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let image = match image::open(&path) {
                Ok(img) => img.to_rgb8(),
                Err(source) => {
                    status.warn(Error::DecodeFailure { path, source }.to_string());
                    continue;
                }
            };

            let mut hands = 0;
            for landmarks in extractor.extract(&image) {
                match features::encode(&landmarks) {
                    Ok(vector) => {
                        corpus.push(vector, class_index);
                        hands += 1;
                    }
                    Err(e) => log::warn!("Discarding hand in {}: {}", name, e),
                }
            }

            if hands == 0 {
                status.info(format!("{} in {}", Error::NoHandDetected, name));
                continue;
            }
            status.info(format!("Processed image: {}", name));
        }
    }

    corpus.save(&config.corpus_path)?;
    status.complete("Dataset creation complete!");
    Ok(corpus)
}

/// Runs [`build_dataset`] on a background thread. Failures end up as an error status.
pub fn spawn_build(
    config: AppConfig,
    detectors: Arc<dyn DetectorFactory>,
    status: StatusSender,
) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("dataset-builder".into())
        .spawn(move || {
            let result = detectors
                .create(DetectionMode::SingleShot)
                .and_then(|detector| {
                    let mut extractor = LandmarkExtractor::new(detector, DetectionMode::SingleShot);
                    build_dataset(&config, &mut extractor, &status)
                });
            if let Err(e) = result {
                status.error(format!("Dataset creation failed: {}", e));
            }
        })?;
    Ok(handle)
}

/// Letter subdirectories of `root`, in alphabet order.
fn class_dirs(root: &Path) -> Result<Vec<(usize, PathBuf)>> {
    let mut dirs: Vec<(usize, PathBuf)> = fs::read_dir(root)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?;
            match alphabet::class_index_for_dir_name(name) {
                Some(index) => Some((index, path)),
                None => {
                    log::debug!("Ignoring non-letter directory {:?}", path);
                    None
                }
            }
        })
        .collect();
    dirs.sort();
    Ok(dirs)
}

fn sorted_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::test_support::PixelKeyedDetector;
    use crate::status::{self, StatusEvent};
    use image::{Rgb, RgbImage};

    fn test_config(root: &Path) -> AppConfig {
        AppConfig {
            data_dir: root.join("data"),
            corpus_path: root.join("data.json"),
            ..Default::default()
        }
    }

    fn save_image(path: &Path, pixel: [u8; 3]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbImage::from_pixel(16, 16, Rgb(pixel)).save(path).unwrap();
    }

    fn extractor() -> LandmarkExtractor {
        LandmarkExtractor::new(Box::new(PixelKeyedDetector), DetectionMode::SingleShot)
    }

    #[test]
    fn test_corrupt_image_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let letter_dir = config.data_dir.join("A");
        for i in 0..3 {
            save_image(&letter_dir.join(format!("{}.png", i)), [1, 1, 1]);
        }
        fs::write(letter_dir.join("3.png"), b"definitely not a png").unwrap();

        let (tx, rx) = status::channel();
        let corpus = build_dataset(&config, &mut extractor(), &tx).unwrap();

        assert_eq!(corpus.len(), 3);
        assert!(corpus.labels.iter().all(|&l| l == 0));

        let events: Vec<StatusEvent> = rx.try_iter().collect();
        assert!(events
            .iter()
            .any(|e| matches!(
                e,
                StatusEvent::Warning(msg)
                    if msg.starts_with("Failed to load image:") && msg.contains("3.png")
            )));
        assert_eq!(
            events.last(),
            Some(&StatusEvent::Complete("Dataset creation complete!".into()))
        );

        let loaded = Corpus::load(&config.corpus_path).unwrap();
        assert_eq!(loaded, corpus);
    }

    #[test]
    fn test_labels_follow_directories_and_hands() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        // Blue channel set: the detector reports two hands.
        save_image(&config.data_dir.join("C").join("0.png"), [2, 1, 255]);
        save_image(&config.data_dir.join("B").join("0.png"), [1, 1, 1]);
        // No hand in this one.
        save_image(&config.data_dir.join("B").join("1.png"), [0, 0, 0]);
        save_image(&config.data_dir.join("notes").join("0.png"), [1, 1, 1]);

        let (tx, rx) = status::channel();
        let corpus = build_dataset(&config, &mut extractor(), &tx).unwrap();

        assert_eq!(corpus.labels, vec![1, 2, 2]);
        assert!(corpus.data.iter().all(|row| row.len() == FEATURE_LEN));

        let messages: Vec<String> = rx.try_iter().map(|e| e.to_string()).collect();
        assert!(messages.contains(&"Processing folder: B".to_string()));
        assert!(messages.contains(&"No hand detected in 1.png".to_string()));
        assert!(messages.contains(&"Processed image: 0.png".to_string()));
    }

    #[test]
    fn test_missing_data_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = status::channel();
        assert!(build_dataset(&test_config(dir.path()), &mut extractor(), &tx).is_err());
    }

    #[test]
    fn test_load_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        assert!(matches!(Corpus::load(&path), Err(Error::CorpusNotFound(_))));

        fs::write(
            &path,
            r#"{"schema_version":1,"feature_len":42,"data":[[0.0,1.0]],"labels":[0]}"#,
        )
        .unwrap();
        assert!(matches!(
            Corpus::load(&path),
            Err(Error::MalformedArtifact { artifact: "corpus", .. })
        ));

        fs::write(&path, r#"{"schema_version":1,"feature_len":63,"data":[],"labels":[]}"#).unwrap();
        assert!(matches!(Corpus::load(&path), Err(Error::SchemaMismatch { .. })));

        fs::write(&path, r#"{"data":[],"labels":[]}"#).unwrap();
        assert!(Corpus::load(&path).is_err());
    }
}
