//! Live inference loop
//!
//! Reads frames from the camera, mirrors them, classifies the hand in view and streams the
//! annotated frames back together with status events.

mod overlay;

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use image::RgbImage;

use crate::camera::{Frame, FrameSource, SharedCamera};
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::features;
use crate::ml::{DetectionMode, DetectorFactory, LandmarkExtractor};
use crate::status::{self, StatusEvent, StopToken};
use crate::trainer::TrainedModel;

pub use overlay::{draw_hand, draw_label};

/// Frames that may queue up for a slow display before new ones are dropped.
const FRAME_QUEUE: usize = 4;

/// Output of the inference task.
#[derive(Debug, Clone)]
pub enum InferenceEvent {
    Status(StatusEvent),
    /// A mirrored frame, annotated if a hand was classified.
    Frame(Frame),
}

/// Classifies the hand in `image` (if any) and draws the prediction onto it.
///
/// Returns the predicted letter. The image is left untouched when no hand is found or the
/// hand cannot be classified.
pub fn annotate_frame(
    image: &mut RgbImage,
    extractor: &mut LandmarkExtractor,
    model: &TrainedModel,
) -> Option<char> {
    let hand = extractor.extract(image).next()?;

    let features = match features::encode(&hand) {
        Ok(features) => features,
        Err(e) => {
            log::debug!("Skipping hand: {}", e);
            return None;
        }
    };
    let letter = match model.predict(features.as_slice()) {
        Ok(letter) => letter,
        Err(e) => {
            log::warn!("Classification failed: {}", e);
            return None;
        }
    };

    draw_hand(image, &hand);
    if let Some(bounds) = hand.bounds() {
        draw_label(image, &bounds, letter);
    }
    Some(letter)
}

/// Runs the frame loop until the source stops yielding frames, `stop` is tripped or the
/// receiving side goes away. Returns the number of frames processed.
pub fn run_inference(
    model: &TrainedModel,
    source: &mut dyn FrameSource,
    extractor: &mut LandmarkExtractor,
    events: &Sender<InferenceEvent>,
    stop: &StopToken,
) -> u64 {
    let mut frames = 0;

    if !source.is_open() {
        report(events, StatusEvent::Error("Webcam is not open. Please check your webcam.".into()));
        return frames;
    }
    // Tracked hands from an earlier session say nothing about this one.
    extractor.reset();

    while source.is_open() && !stop.is_stopped() {
        let Some(frame) = source.read() else {
            break;
        };
        let mut frame = frame.mirrored();
        if let Some(letter) = annotate_frame(&mut frame.image, extractor, model) {
            log::trace!("Frame {}: {}", frame.frame_number, letter);
        }
        frames += 1;

        // Status events are never dropped, frames are once the display falls behind.
        if events.len() >= FRAME_QUEUE {
            log::trace!("Display is behind, dropping frame {}", frame.frame_number);
        } else if events.send(InferenceEvent::Frame(frame)).is_err() {
            break;
        }
    }

    report(events, StatusEvent::Complete("ASL detection stopped.".into()));
    frames
}

/// Starts live detection on a background thread and returns its event stream.
pub fn spawn_inference(
    config: &AppConfig,
    camera: SharedCamera,
    detectors: Arc<dyn DetectorFactory>,
    stop: StopToken,
) -> Result<(Receiver<InferenceEvent>, JoinHandle<()>)> {
    let (tx, rx) = unbounded();
    let model_path = config.model_path.clone();

    let handle = thread::Builder::new()
        .name("inference".into())
        .spawn(move || {
            report(&tx, StatusEvent::Info("Starting ASL detection...".into()));

            let model = match TrainedModel::load(&model_path) {
                Ok(model) => model,
                Err(Error::ModelNotFound(_)) => {
                    report(
                        &tx,
                        StatusEvent::Error(
                            "Model file not found. Please train the model first.".into(),
                        ),
                    );
                    return;
                }
                Err(e) => {
                    report(&tx, StatusEvent::Error(format!("Error during ASL detection: {}", e)));
                    return;
                }
            };
            report(&tx, StatusEvent::Info("Model loaded successfully!".into()));

            let mut lease = match camera.acquire("live detection") {
                Ok(lease) => lease,
                Err(e) => {
                    report(&tx, StatusEvent::Error(e.to_string()));
                    return;
                }
            };
            let mut extractor = match detectors.create(DetectionMode::LIVE) {
                Ok(detector) => LandmarkExtractor::new(detector, DetectionMode::LIVE),
                Err(e) => {
                    report(&tx, StatusEvent::Error(format!("Error during ASL detection: {}", e)));
                    return;
                }
            };

            let frames = run_inference(&model, &mut *lease, &mut extractor, &tx, &stop);
            log::info!("Inference processed {} frames", frames);
        })?;

    Ok((rx, handle))
}

fn report(events: &Sender<InferenceEvent>, event: StatusEvent) {
    status::log_event(&event);
    let _ = events.send(InferenceEvent::Status(event));
}
