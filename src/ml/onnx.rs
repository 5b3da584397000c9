//! ONNX Runtime hand detector.
//!
//! Uses the MediaPipe palm detection and hand landmark models (PINTO Model Zoo ONNX exports,
//! NHWC float input in `0.0..=1.0`):
//!
//! - `palm_detection_lite.onnx`: `[1, 192, 192, 3]` -> boxes `[1, 2016, 18]`, scores `[1, 2016, 1]`
//! - `hand_landmark_lite.onnx`: `[1, 224, 224, 3]` -> landmarks `[1, 63]` (x, y, z in input
//!   pixels), presence `[1, 1]` (logit), plus outputs that are ignored here

use std::path::Path;
use std::sync::OnceLock;

use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;

use super::palm::{
    self, Anchor, PalmDetection, KEYPOINT_MIDDLE_MCP, KEYPOINT_WRIST, PALM_INPUT_SIZE,
};
use super::roi::{crop_hwc, Roi};
use super::{DetectionMode, HandDetector};
use crate::config::DetectorConfig;
use crate::error::{Error, Result};
use crate::landmarks::{Landmark, LandmarkSet, LANDMARK_COUNT};

const PALM_MODEL: &str = "palm_detection_lite.onnx";
const LANDMARK_MODEL: &str = "hand_landmark_lite.onnx";
const LANDMARK_INPUT_SIZE: u32 = 224;
const SINGLE_SHOT_MIN_PRESENCE: f32 = 0.5;

/// Hand detector running palm detection + landmark regression through ONNX Runtime.
pub struct OnnxHandDetector {
    palm: Session,
    landmark: Session,
    anchors: Vec<Anchor>,
    mode: DetectionMode,
    min_detection: f32,
    min_presence: f32,
    max_hands: usize,
    /// Regions to re-use on the next frame (tracking mode only).
    tracked: Vec<Roi>,
}

impl OnnxHandDetector {
    pub fn new(config: &DetectorConfig, mode: DetectionMode) -> Result<Self> {
        init_runtime()?;

        let palm = load_session(&config.model_dir.join(PALM_MODEL), config.intra_threads)?;
        let landmark = load_session(&config.model_dir.join(LANDMARK_MODEL), config.intra_threads)?;

        let (min_detection, min_presence, max_hands) = match mode {
            DetectionMode::SingleShot => (
                config.single_shot_min_detection,
                SINGLE_SHOT_MIN_PRESENCE,
                config.single_shot_max_hands,
            ),
            DetectionMode::Tracking { max_hands } => (
                config.tracking_min_detection,
                config.tracking_min_presence,
                max_hands,
            ),
        };

        log::info!("Hand detector ready ({:?})", mode);

        Ok(Self {
            palm,
            landmark,
            anchors: palm::anchors(),
            mode,
            min_detection,
            min_presence,
            max_hands,
            tracked: Vec::new(),
        })
    }

    fn detect_palms(&mut self, image: &RgbImage) -> Result<Vec<Roi>> {
        let frame_roi = Roi::full_image(image.width(), image.height());
        let input = crop_hwc(image, &frame_roi, PALM_INPUT_SIZE);
        let outputs = run(&mut self.palm, input, PALM_INPUT_SIZE)?;

        let expected_boxes = self.anchors.len() * palm::VALUES_PER_ANCHOR;
        let boxes = outputs
            .iter()
            .find(|o| o.len() == expected_boxes)
            .ok_or_else(|| Error::Detector("palm model has no box output".to_string()))?;
        let scores = outputs
            .iter()
            .find(|o| o.len() == self.anchors.len())
            .ok_or_else(|| Error::Detector("palm model has no score output".to_string()))?;

        let decoded = palm::decode(boxes, scores, &self.anchors, self.min_detection);
        let detections = palm::weighted_nms(decoded);

        Ok(detections
            .iter()
            .take(self.max_hands)
            .map(|d| palm_roi(d, &frame_roi))
            .collect())
    }

    /// Runs the landmark model on `roi`. Returns the landmarks (normalized to the image) and the
    /// hand presence score.
    fn landmarks_in(&mut self, image: &RgbImage, roi: &Roi) -> Result<(LandmarkSet, f32)> {
        let input = crop_hwc(image, roi, LANDMARK_INPUT_SIZE);
        let outputs = run(&mut self.landmark, input, LANDMARK_INPUT_SIZE)?;

        let coords = outputs
            .iter()
            .find(|o| o.len() == LANDMARK_COUNT * 3)
            .ok_or_else(|| Error::Detector("landmark model has no landmark output".to_string()))?;
        let presence = outputs
            .iter()
            .find(|o| o.len() == 1)
            .map(|o| palm::sigmoid(o[0]))
            .ok_or_else(|| Error::Detector("landmark model has no presence output".to_string()))?;

        let side = LANDMARK_INPUT_SIZE as f32;
        let (w, h) = (image.width() as f32, image.height() as f32);
        let points = coords
            .chunks_exact(3)
            .map(|c| {
                let (px, py) = roi.to_image(c[0] / side, c[1] / side);
                Landmark::new(px / w, py / h)
            })
            .collect();

        Ok((LandmarkSet::new(points), presence))
    }
}

impl HandDetector for OnnxHandDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<LandmarkSet>> {
        let rois = match self.mode {
            DetectionMode::Tracking { .. } if !self.tracked.is_empty() => {
                std::mem::take(&mut self.tracked)
            }
            _ => self.detect_palms(image)?,
        };

        let mut hands = Vec::new();
        let mut next = Vec::new();
        for roi in rois {
            let (landmarks, presence) = self.landmarks_in(image, &roi)?;
            if presence < self.min_presence {
                log::trace!("dropping hand with presence {:.2}", presence);
                continue;
            }
            if let Some(roi) = Roi::from_landmarks(&landmarks, image.width(), image.height()) {
                next.push(roi);
            }
            hands.push(landmarks);
        }

        if matches!(self.mode, DetectionMode::Tracking { .. }) {
            self.tracked = next;
        }
        Ok(hands)
    }

    fn reset(&mut self) {
        self.tracked.clear();
    }
}

/// Maps a palm detection (normalized to the letterboxed network input) to a hand ROI in image
/// pixels.
fn palm_roi(d: &PalmDetection, frame: &Roi) -> Roi {
    let (cx, cy) = frame.to_image(d.x_center, d.y_center);
    let (wx, wy) = d.keypoints[KEYPOINT_WRIST];
    let (mx, my) = d.keypoints[KEYPOINT_MIDDLE_MCP];
    let wrist = frame.to_image(wx, wy);
    let middle = frame.to_image(mx, my);
    Roi::from_palm(cx, cy, d.width * frame.size, d.height * frame.size, wrist, middle)
}

fn init_runtime() -> Result<()> {
    static INIT: OnceLock<std::result::Result<(), String>> = OnceLock::new();
    INIT.get_or_init(|| {
        ort::init()
            .with_name("AslRecognizer")
            .commit()
            .map(|_| ())
            .map_err(|e| format!("Failed to initialize ORT: {}", e))
    })
    .clone()
    .map_err(Error::Detector)
}

fn load_session(path: &Path, intra_threads: usize) -> Result<Session> {
    if !path.exists() {
        return Err(Error::Detector(format!("Model not found: {:?}", path)));
    }

    let session = Session::builder()
        .map_err(|e| Error::Detector(format!("Failed to create session builder: {}", e)))?
        .with_intra_threads(intra_threads)
        .map_err(|e| Error::Detector(format!("Failed to set threads: {}", e)))?
        .commit_from_file(path)
        .map_err(|e| Error::Detector(format!("Failed to load {:?}: {}", path, e)))?;

    log::info!("Loaded model from {:?}", path);
    Ok(session)
}

/// Runs a single-input NHWC model and returns every output flattened.
fn run(session: &mut Session, input: Vec<f32>, side: u32) -> Result<Vec<Vec<f32>>> {
    let side = side as usize;
    let input_array = Array4::from_shape_vec((1, side, side, 3), input)
        .map_err(|e| Error::Detector(format!("Failed to create input array: {}", e)))?;
    let input_tensor = ort::value::Tensor::from_array(input_array)
        .map_err(|e| Error::Detector(format!("Failed to create tensor: {}", e)))?;

    let outputs = session
        .run(ort::inputs![input_tensor])
        .map_err(|e| Error::Detector(format!("Inference failed: {}", e)))?;

    let mut flattened = Vec::new();
    for output in outputs.iter() {
        let (_shape, data) = output
            .1
            .try_extract_tensor::<f32>()
            .map_err(|e| Error::Detector(format!("Failed to extract output: {}", e)))?;
        flattened.push(data.to_vec());
    }
    Ok(flattened)
}
