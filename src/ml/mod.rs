//! Hand landmark extraction
//!
//! A [`HandDetector`] turns an RGB image into zero or more [`LandmarkSet`]s. The
//! [`LandmarkExtractor`] wraps one and fixes how it is used:
//!
//! - [`DetectionMode::SingleShot`]: every image is processed independently, best effort. Used
//!   when building the dataset from still images.
//! - [`DetectionMode::Tracking`]: the detector keeps cross-frame state and reports at most
//!   `max_hands` hands. Used by the live inference loop.
//!
//! The production backend is [`OnnxHandDetector`], which runs MediaPipe-compatible palm
//! detection and hand landmark models through ONNX Runtime.

mod onnx;
mod palm;
mod roi;

use image::RgbImage;

use crate::config::DetectorConfig;
use crate::error::Result;
use crate::landmarks::LandmarkSet;

pub use onnx::OnnxHandDetector;

/// How the detector treats consecutive images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionMode {
    /// Independent per image; no state carried over.
    SingleShot,
    /// Keeps a continuity model across frames.
    Tracking { max_hands: usize },
}

impl DetectionMode {
    /// The mode used by the live inference loop.
    pub const LIVE: DetectionMode = DetectionMode::Tracking { max_hands: 1 };
}

/// A hand-pose detector.
pub trait HandDetector: Send {
    /// Detects hands in `image` and returns one landmark set per hand.
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<LandmarkSet>>;

    /// Forgets any cross-frame state.
    fn reset(&mut self) {}
}

/// Creates detectors for a given mode. Each background task builds its own.
pub trait DetectorFactory: Send + Sync {
    fn create(&self, mode: DetectionMode) -> Result<Box<dyn HandDetector>>;
}

/// Builds [`OnnxHandDetector`]s from the configured model directory.
pub struct OnnxDetectorFactory {
    config: DetectorConfig,
}

impl OnnxDetectorFactory {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }
}

impl DetectorFactory for OnnxDetectorFactory {
    fn create(&self, mode: DetectionMode) -> Result<Box<dyn HandDetector>> {
        Ok(Box::new(OnnxHandDetector::new(&self.config, mode)?))
    }
}

/// Runs a [`HandDetector`] in a fixed [`DetectionMode`].
pub struct LandmarkExtractor {
    detector: Box<dyn HandDetector>,
    mode: DetectionMode,
}

impl LandmarkExtractor {
    pub fn new(detector: Box<dyn HandDetector>, mode: DetectionMode) -> Self {
        Self { detector, mode }
    }

    /// Extracts the landmark sets of all hands in `image`.
    ///
    /// The result is computed fresh on every call. Detector failures are logged and yield no
    /// hands, so a single bad image never aborts a batch.
    pub fn extract(&mut self, image: &RgbImage) -> impl Iterator<Item = LandmarkSet> {
        let mut hands = match self.detector.detect(image) {
            Ok(hands) => hands,
            Err(e) => {
                log::warn!("Hand detection failed: {}", e);
                Vec::new()
            }
        };
        if let DetectionMode::Tracking { max_hands } = self.mode {
            hands.truncate(max_hands);
        }
        hands.into_iter()
    }

    /// Drops the detector's cross-frame state.
    pub fn reset(&mut self) {
        self.detector.reset();
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::landmarks::{Landmark, LANDMARK_COUNT};

    /// Deterministic hand shape used throughout the tests. `variant` selects one of a few
    /// clearly distinct poses; `(dx, dy)` moves the whole hand.
    pub fn synthetic_hand(variant: usize, dx: f32, dy: f32) -> LandmarkSet {
        LandmarkSet::new(
            (0..LANDMARK_COUNT)
                .map(|i| {
                    let t = i as f32 / LANDMARK_COUNT as f32;
                    let (x, y) = match variant % 3 {
                        0 => (0.3 * t, 0.05 * (i % 4) as f32),
                        1 => (0.05 * (i % 5) as f32, 0.3 * t),
                        _ => (0.15 * (1.0 - t), 0.2 * t * t),
                    };
                    Landmark::new(dx + x, dy + y)
                })
                .collect(),
        )
    }

    /// Reports a hand whenever the image's top-left pixel is not black. The red channel picks
    /// the pose variant, which lets tests control what the "detector" sees.
    pub struct PixelKeyedDetector;

    impl HandDetector for PixelKeyedDetector {
        fn detect(&mut self, image: &RgbImage) -> Result<Vec<LandmarkSet>> {
            let px = image.get_pixel(0, 0);
            if px.0 == [0, 0, 0] {
                return Ok(Vec::new());
            }
            let hands = 1 + usize::from(px.0[2] > 127);
            Ok((0..hands)
                .map(|h| synthetic_hand(px.0[0] as usize, 0.2 + 0.3 * h as f32, 0.4))
                .collect())
        }
    }

    pub struct PixelKeyedFactory;

    impl DetectorFactory for PixelKeyedFactory {
        fn create(&self, _mode: DetectionMode) -> Result<Box<dyn HandDetector>> {
            Ok(Box::new(PixelKeyedDetector))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::error::Error;

    struct Failing;

    impl HandDetector for Failing {
        fn detect(&mut self, _image: &RgbImage) -> Result<Vec<LandmarkSet>> {
            Err(Error::Detector("model exploded".into()))
        }
    }

    fn keyed_image(r: u8, b: u8) -> RgbImage {
        RgbImage::from_pixel(8, 8, image::Rgb([r, 1, b]))
    }

    #[test]
    fn test_tracking_mode_limits_hands() {
        let mut single =
            LandmarkExtractor::new(Box::new(PixelKeyedDetector), DetectionMode::SingleShot);
        assert_eq!(single.extract(&keyed_image(1, 255)).count(), 2);

        let mut live = LandmarkExtractor::new(Box::new(PixelKeyedDetector), DetectionMode::LIVE);
        assert_eq!(live.extract(&keyed_image(1, 255)).count(), 1);
    }

    #[test]
    fn test_no_hand_and_failure_yield_nothing() {
        let mut extractor =
            LandmarkExtractor::new(Box::new(PixelKeyedDetector), DetectionMode::SingleShot);
        assert_eq!(extractor.extract(&RgbImage::new(4, 4)).count(), 0);

        let mut failing = LandmarkExtractor::new(Box::new(Failing), DetectionMode::SingleShot);
        assert_eq!(failing.extract(&keyed_image(1, 0)).count(), 0);
    }
}
