//! Camera capture module
//!
//! Frames come from a [`FrameSource`]. The native webcam backend (nokhwa) lives behind the
//! `webcam` feature; [`ImageDirSource`] replays a directory of images instead.
//!
//! The device is a single shared resource. [`SharedCamera`] hands it out through a
//! [`CameraLease`], so the capture sequencer and the inference loop can never read from it at
//! the same time.

mod replay;
#[cfg(feature = "webcam")]
mod webcam;

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Instant;

use image::RgbImage;
use parking_lot::Mutex;

use crate::error::{Error, Result};

pub use replay::ImageDirSource;
#[cfg(feature = "webcam")]
pub use webcam::{list_cameras, CameraInfo, WebcamSource};

/// Camera frame data
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    /// RGB pixel data
    pub image: RgbImage,
    /// Frame number
    pub frame_number: u64,
    /// Frame timestamp
    pub timestamp: Instant,
}

impl Frame {
    pub fn new(image: RgbImage, frame_number: u64) -> Self {
        Self {
            image,
            frame_number,
            timestamp: Instant::now(),
        }
    }

    /// Returns a horizontally flipped copy, so the picture behaves like a mirror.
    pub fn mirrored(&self) -> Frame {
        Frame {
            image: image::imageops::flip_horizontal(&self.image),
            frame_number: self.frame_number,
            timestamp: self.timestamp,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Something that yields camera frames.
pub trait FrameSource: Send {
    /// Whether the device is open at all.
    fn is_open(&self) -> bool;

    /// Grabs the next frame. `None` means this grab failed; callers decide whether to retry.
    fn read(&mut self) -> Option<Frame>;

    /// Releases the underlying device.
    fn close(&mut self) {}
}

/// Placeholder left in a lease after the device went back to its slot.
struct Released;

impl FrameSource for Released {
    fn is_open(&self) -> bool {
        false
    }

    fn read(&mut self) -> Option<Frame> {
        None
    }
}

struct Slot {
    source: Option<Box<dyn FrameSource>>,
    holder: Option<&'static str>,
}

/// The camera, shared between the tasks that may want to read from it.
#[derive(Clone)]
pub struct SharedCamera {
    slot: Arc<Mutex<Slot>>,
}

impl SharedCamera {
    pub fn new(source: Box<dyn FrameSource>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot {
                source: Some(source),
                holder: None,
            })),
        }
    }

    /// Takes exclusive ownership of the device until the returned lease is dropped.
    ///
    /// Fails with [`Error::CameraBusy`] if another task currently holds it.
    pub fn acquire(&self, holder: &'static str) -> Result<CameraLease> {
        let mut slot = self.slot.lock();
        match slot.source.take() {
            Some(source) => {
                slot.holder = Some(holder);
                log::debug!("Camera acquired by {}", holder);
                Ok(CameraLease {
                    source,
                    slot: self.slot.clone(),
                })
            }
            None => Err(Error::CameraBusy(slot.holder.unwrap_or("another task"))),
        }
    }

    /// Returns the name of the task holding the camera, if any.
    pub fn holder(&self) -> Option<&'static str> {
        self.slot.lock().holder
    }

    /// Closes the device if nobody holds it. Used on shutdown.
    pub fn close(&self) {
        let mut slot = self.slot.lock();
        if let Some(source) = slot.source.as_mut() {
            source.close();
        }
    }
}

/// Exclusive access to the camera. Returns the device to its [`SharedCamera`] when dropped.
pub struct CameraLease {
    source: Box<dyn FrameSource>,
    slot: Arc<Mutex<Slot>>,
}

impl Deref for CameraLease {
    type Target = dyn FrameSource;

    fn deref(&self) -> &Self::Target {
        &*self.source
    }
}

impl DerefMut for CameraLease {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.source
    }
}

impl Drop for CameraLease {
    fn drop(&mut self) {
        let mut slot = self.slot.lock();
        if let Some(holder) = slot.holder.take() {
            log::debug!("Camera released by {}", holder);
        }
        slot.source = Some(std::mem::replace(&mut self.source, Box::new(Released)));
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::VecDeque;

    /// A scripted frame source. `None` entries simulate failed grabs; once the script runs out
    /// the source reports itself closed.
    pub struct ScriptedSource {
        pub frames: VecDeque<Option<RgbImage>>,
        pub open: bool,
        pub reads: usize,
        pub repeat: Option<RgbImage>,
    }

    impl ScriptedSource {
        pub fn new(frames: Vec<Option<RgbImage>>) -> Self {
            Self {
                frames: frames.into(),
                open: true,
                reads: 0,
                repeat: None,
            }
        }

        /// A source that yields the same image forever.
        pub fn repeating(image: RgbImage) -> Self {
            Self {
                frames: VecDeque::new(),
                open: true,
                reads: 0,
                repeat: Some(image),
            }
        }

        pub fn closed() -> Self {
            Self {
                frames: VecDeque::new(),
                open: false,
                reads: 0,
                repeat: None,
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn is_open(&self) -> bool {
            self.open
        }

        fn read(&mut self) -> Option<Frame> {
            let n = self.reads as u64;
            self.reads += 1;
            if let Some(image) = &self.repeat {
                return Some(Frame::new(image.clone(), n));
            }
            match self.frames.pop_front() {
                Some(image) => image.map(|img| Frame::new(img, n)),
                None => {
                    self.open = false;
                    None
                }
            }
        }
    }

    pub fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| image::Rgb([x as u8, y as u8, (x + y) as u8]))
    }
}
