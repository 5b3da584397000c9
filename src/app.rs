//! Command interface for the host UI.
//!
//! [`Controller`] launches every operation on a background thread and hands back a channel of
//! events. Nothing here blocks the calling thread except [`Controller::stop`], which waits for
//! the camera tasks to wind down.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::Receiver;

use crate::camera::SharedCamera;
use crate::capture::{self, CaptureHandle};
use crate::config::AppConfig;
use crate::dataset;
use crate::inference::{self, InferenceEvent};
use crate::ml::DetectorFactory;
use crate::status::{self, StatusEvent, StatusSender, StopToken};
use crate::trainer;

pub struct Controller {
    config: AppConfig,
    camera: Option<SharedCamera>,
    detectors: Arc<dyn DetectorFactory>,
    stop: StopToken,
    capture: Option<CaptureHandle>,
    inference: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
}

impl Controller {
    /// `camera` is `None` when no capture device is available; camera operations then report
    /// an error instead of starting.
    pub fn new(
        config: AppConfig,
        camera: Option<SharedCamera>,
        detectors: Arc<dyn DetectorFactory>,
    ) -> Self {
        Self {
            config,
            camera,
            detectors,
            stop: StopToken::new(),
            capture: None,
            inference: None,
            workers: Vec::new(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Starts a new capture session at letter A, replacing any session in progress.
    pub fn start_collection(&mut self) -> Receiver<StatusEvent> {
        let (tx, rx) = status::channel();
        self.capture = None;

        let Some(camera) = self.camera_or_report(&tx) else {
            return rx;
        };
        match capture::spawn_capture(&self.config, camera, tx.clone(), self.stop.clone()) {
            Ok(handle) => self.capture = Some(handle),
            Err(e) => tx.error(format!("Failed to start data collection: {}", e)),
        }
        rx
    }

    /// Moves the capture session from waiting to capturing. Ignored if nothing is waiting.
    pub fn trigger_capture(&self) {
        match &self.capture {
            Some(capture) if !capture.is_finished() => capture.trigger(),
            _ => log::debug!("No capture session to trigger"),
        }
    }

    pub fn build_dataset(&mut self) -> Receiver<StatusEvent> {
        let (tx, rx) = status::channel();
        match dataset::spawn_build(self.config.clone(), self.detectors.clone(), tx.clone()) {
            Ok(handle) => self.workers.push(handle),
            Err(e) => tx.error(format!("Failed to start dataset creation: {}", e)),
        }
        self.reap_workers();
        rx
    }

    /// Trains the classifier. The stream ends with a [`StatusEvent::Trained`] carrying the
    /// accuracy.
    pub fn train(&mut self) -> Receiver<StatusEvent> {
        let (tx, rx) = status::channel();
        match trainer::spawn_training(self.config.clone(), tx.clone()) {
            Ok(handle) => self.workers.push(handle),
            Err(e) => tx.error(format!("Failed to start training: {}", e)),
        }
        self.reap_workers();
        rx
    }

    /// Starts live detection. Runs until [`stop`](Self::stop) or until the camera runs dry.
    pub fn start_inference(&mut self) -> Receiver<InferenceEvent> {
        self.join_inference();

        let camera = match &self.camera {
            Some(camera) => camera.clone(),
            None => {
                let (tx, rx) = crossbeam_channel::unbounded();
                let event =
                    StatusEvent::Error("Webcam is not open. Please check your webcam.".into());
                status::log_event(&event);
                let _ = tx.send(InferenceEvent::Status(event));
                return rx;
            }
        };

        let detectors = self.detectors.clone();
        match inference::spawn_inference(&self.config, camera, detectors, self.stop.clone()) {
            Ok((rx, handle)) => {
                self.inference = Some(handle);
                rx
            }
            Err(e) => {
                let (tx, rx) = crossbeam_channel::unbounded();
                let event = StatusEvent::Error(format!("Failed to start ASL detection: {}", e));
                status::log_event(&event);
                let _ = tx.send(InferenceEvent::Status(event));
                rx
            }
        }
    }

    /// Stops data collection and live detection and waits for both to release the camera.
    pub fn stop(&mut self) {
        self.stop.stop();
        if let Some(capture) = self.capture.take() {
            capture.stop();
            capture.join();
        }
        self.join_inference();
        // Later tasks get a fresh token.
        self.stop = StopToken::new();
    }

    fn camera_or_report(&self, tx: &StatusSender) -> Option<SharedCamera> {
        if self.camera.is_none() {
            tx.error("Webcam is not open. Please check your webcam.");
        }
        self.camera.clone()
    }

    fn join_inference(&mut self) {
        if let Some(handle) = self.inference.take() {
            if !handle.is_finished() {
                self.stop.stop();
            }
            let _ = handle.join();
            self.stop = StopToken::new();
        }
    }

    fn reap_workers(&mut self) {
        self.workers.retain(|h| !h.is_finished());
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.stop();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        if let Some(camera) = &self.camera {
            camera.close();
        }
        log::info!("Controller shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::test_support::{gradient, ScriptedSource};
    use crate::config::{CaptureConfig, TrainingConfig};
    use crate::ml::test_support::PixelKeyedFactory;
    use image::{Rgb, RgbImage};
    use std::path::Path;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn test_config(root: &Path) -> AppConfig {
        AppConfig {
            data_dir: root.join("data"),
            image_extension: "png".to_string(),
            corpus_path: root.join("data.json"),
            model_path: root.join("model.bin"),
            capture: CaptureConfig {
                images_per_class: 3,
                interval_ms: 1,
            },
            training: TrainingConfig {
                tree_count: 5,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn wait_for_terminal(rx: &Receiver<StatusEvent>) -> StatusEvent {
        loop {
            let event = rx.recv_timeout(TIMEOUT).unwrap();
            if event.is_terminal() {
                return event;
            }
        }
    }

    #[test]
    fn test_pipeline_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        // Every frame shows pose variant 1 to the test detector.
        let camera = SharedCamera::new(Box::new(ScriptedSource::repeating(RgbImage::from_pixel(
            32,
            32,
            Rgb([1, 10, 10]),
        ))));
        let mut controller = Controller::new(
            config.clone(),
            Some(camera.clone()),
            Arc::new(PixelKeyedFactory),
        );

        // Collect letter A only, then stop.
        let rx = controller.start_collection();
        loop {
            let event = rx.recv_timeout(TIMEOUT).unwrap();
            if event.to_string().starts_with("Prepare to gesture for letter: A") {
                controller.trigger_capture();
            }
            if event.to_string().starts_with("Prepare to gesture for letter: B") {
                break;
            }
        }
        controller.stop();
        assert_eq!(camera.holder(), None);

        let rx = controller.build_dataset();
        assert_eq!(
            wait_for_terminal(&rx),
            StatusEvent::Complete("Dataset creation complete!".into())
        );

        let rx = controller.train();
        let events: Vec<StatusEvent> =
            std::iter::from_fn(|| rx.recv_timeout(TIMEOUT).ok()).collect();
        assert!(events.contains(&StatusEvent::Info("Model saved as 'model.bin'.".into())));
        assert!(matches!(events.last(), Some(StatusEvent::Trained { .. })));

        let rx = controller.start_inference();
        let mut frames = 0;
        while frames < 2 {
            if let InferenceEvent::Frame(_) = rx.recv_timeout(TIMEOUT).unwrap() {
                frames += 1;
            }
        }
        controller.stop();
        assert_eq!(camera.holder(), None);
    }

    #[test]
    fn test_camera_operations_without_camera() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller =
            Controller::new(test_config(dir.path()), None, Arc::new(PixelKeyedFactory));

        let rx = controller.start_collection();
        assert!(rx.recv_timeout(TIMEOUT).unwrap().is_error());
        controller.trigger_capture();

        let rx = controller.start_inference();
        assert!(matches!(
            rx.recv_timeout(TIMEOUT).unwrap(),
            InferenceEvent::Status(StatusEvent::Error(_))
        ));
    }

    #[test]
    fn test_train_without_dataset_reports() {
        let dir = tempfile::tempdir().unwrap();
        let camera = SharedCamera::new(Box::new(ScriptedSource::repeating(gradient(4, 4))));
        let mut controller =
            Controller::new(test_config(dir.path()), Some(camera), Arc::new(PixelKeyedFactory));

        let rx = controller.train();
        assert_eq!(
            wait_for_terminal(&rx),
            StatusEvent::Error("Dataset not found. Please create the dataset first.".into())
        );
    }
}
