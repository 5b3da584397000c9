//! Native webcam backend using the nokhwa crate.
//!
//! The nokhwa camera handle is not `Send` on every platform, so it is created and driven by a
//! dedicated capture thread. Frames are handed over through a one-slot channel that always
//! holds the newest frame.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;

use super::{Frame, FrameSource};
use crate::error::{Error, Result};

/// How long a single `read` waits for the capture thread before reporting a failed grab.
const READ_TIMEOUT: Duration = Duration::from_millis(1000);

/// Information about an available camera
#[derive(Clone, Debug)]
pub struct CameraInfo {
    /// Camera index
    pub index: u32,
    /// Camera name
    pub name: String,
}

/// List available cameras
pub fn list_cameras() -> Vec<CameraInfo> {
    match nokhwa::query(nokhwa::utils::ApiBackend::Auto) {
        Ok(camera_list) => camera_list
            .iter()
            .enumerate()
            .map(|(idx, info)| CameraInfo {
                index: idx as u32,
                name: info.human_name().to_string(),
            })
            .collect(),
        Err(e) => {
            log::warn!("Failed to enumerate cameras: {:?}", e);
            Vec::new()
        }
    }
}

/// A live webcam.
pub struct WebcamSource {
    frames: Receiver<RgbImage>,
    running: Arc<AtomicBool>,
    open: Arc<AtomicBool>,
    thread_handle: Option<std::thread::JoinHandle<()>>,
    frame_count: u64,
}

impl WebcamSource {
    /// Opens camera `camera_index` and starts streaming.
    ///
    /// Fails with [`Error::CameraUnavailable`] if the device cannot be opened.
    pub fn open(camera_index: u32) -> Result<Self> {
        let (tx, rx) = crossbeam_channel::bounded::<RgbImage>(1);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<std::result::Result<(), String>>(1);
        let running = Arc::new(AtomicBool::new(true));
        let open = Arc::new(AtomicBool::new(false));

        let stale = rx.clone();
        let running_clone = running.clone();
        let open_clone = open.clone();

        let thread_handle = std::thread::Builder::new()
            .name("camera-capture".to_string())
            .spawn(move || {
                capture_thread(camera_index, tx, stale, ready_tx, running_clone, open_clone);
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => {
                let _ = thread_handle.join();
                return Err(Error::CameraUnavailable(reason));
            }
            Err(_) => {
                let _ = thread_handle.join();
                return Err(Error::CameraUnavailable("capture thread exited".to_string()));
            }
        }

        Ok(Self {
            frames: rx,
            running,
            open,
            thread_handle: Some(thread_handle),
            frame_count: 0,
        })
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
        self.open.store(false, Ordering::Release);
    }
}

impl FrameSource for WebcamSource {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn read(&mut self) -> Option<Frame> {
        match self.frames.recv_timeout(READ_TIMEOUT) {
            Ok(image) => {
                let frame = Frame::new(image, self.frame_count);
                self.frame_count += 1;
                Some(frame)
            }
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                self.open.store(false, Ordering::Release);
                None
            }
        }
    }

    fn close(&mut self) {
        self.stop();
    }
}

impl Drop for WebcamSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_camera(camera_index: u32) -> std::result::Result<Camera, String> {
    let index = CameraIndex::Index(camera_index);

    // First try with AbsoluteHighestResolution
    let requested =
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution);
    match Camera::new(index.clone(), requested) {
        Ok(c) => return Ok(c),
        Err(e) => log::warn!("Failed to open camera with highest resolution: {:?}", e),
    }

    let requested =
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::HighestResolution(
            Resolution::new(640, 480),
        ));
    match Camera::new(index.clone(), requested) {
        Ok(c) => return Ok(c),
        Err(e) => log::warn!("Failed with HighestResolution: {:?}", e),
    }

    let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::None);
    Camera::new(index, requested)
        .map_err(|e| format!("Failed to open camera with all format attempts: {:?}", e))
}

/// Hands `image` to the reader, replacing a frame it has not picked up yet.
fn publish_latest(frames: &Sender<RgbImage>, stale: &Receiver<RgbImage>, image: RgbImage) {
    if let Err(TrySendError::Full(image)) = frames.try_send(image) {
        let _ = stale.try_recv();
        // Single producer: the slot is free now, whoever emptied it.
        let _ = frames.try_send(image);
    }
}

fn capture_thread(
    camera_index: u32,
    frames: Sender<RgbImage>,
    stale: Receiver<RgbImage>,
    ready: Sender<std::result::Result<(), String>>,
    running: Arc<AtomicBool>,
    open: Arc<AtomicBool>,
) {
    log::info!("Starting camera capture thread (camera {})", camera_index);

    let mut camera = match open_camera(camera_index) {
        Ok(c) => c,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    if let Err(e) = camera.open_stream() {
        let _ = ready.send(Err(format!("Failed to open camera stream: {:?}", e)));
        return;
    }

    log::info!(
        "Camera opened: {} ({}x{})",
        camera.info().human_name(),
        camera.resolution().width(),
        camera.resolution().height()
    );
    open.store(true, Ordering::Release);
    let _ = ready.send(Ok(()));

    while running.load(Ordering::Acquire) {
        let frame = match camera.frame() {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("Failed to capture frame: {:?}", e);
                std::thread::sleep(Duration::from_millis(10));
                continue;
            }
        };

        let (width, height) = (frame.resolution().width(), frame.resolution().height());
        let image = match frame.decode_image::<RgbFormat>() {
            Ok(decoded) => RgbImage::from_raw(width, height, decoded.into_raw()),
            Err(e) => {
                log::warn!("Failed to decode frame: {:?}", e);
                continue;
            }
        };
        let Some(image) = image else {
            log::warn!("Decoded frame does not match {}x{}", width, height);
            continue;
        };

        publish_latest(&frames, &stale, image);
    }

    let _ = camera.stop_stream();
    open.store(false, Ordering::Release);
    log::info!("Camera capture thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_reader_gets_newest_frame() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        for value in 1..=3u8 {
            publish_latest(&tx, &rx, RgbImage::from_pixel(1, 1, Rgb([value, 0, 0])));
        }

        assert_eq!(rx.try_recv().unwrap().get_pixel(0, 0).0, [3, 0, 0]);
        assert!(rx.try_recv().is_err());

        publish_latest(&tx, &rx, RgbImage::from_pixel(1, 1, Rgb([4, 0, 0])));
        assert_eq!(rx.try_recv().unwrap().get_pixel(0, 0).0, [4, 0, 0]);
    }
}
