//! Capture sequencer
//!
//! Drives image collection through the alphabet. For each letter the sequencer waits for a
//! trigger, then grabs `images_per_class` mirrored frames at a fixed pace and saves them as
//! `<data_dir>/<LETTER>/<n>.<ext>`.

use std::fs;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{at, bounded, select, Receiver, Sender};

use crate::alphabet::{ALPHABET, CLASS_COUNT};
use crate::camera::{FrameSource, SharedCamera};
use crate::config::AppConfig;
use crate::error::Result;
use crate::status::{StatusEvent, StatusSender, StopToken};

/// Where the capture session currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    /// Waiting for the user to get ready for `letter_index`.
    AwaitingTrigger { letter_index: usize },
    /// `count` images of `letter_index` saved so far.
    Capturing { letter_index: usize, count: usize },
}

/// The capture session state machine.
///
/// Frame pacing is left to the caller: every [`tick`](Self::tick) attempts at most one grab.
pub struct CaptureSequencer {
    state: CaptureState,
    data_dir: PathBuf,
    extension: String,
    images_per_class: usize,
}

impl CaptureSequencer {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            state: CaptureState::Idle,
            data_dir: config.data_dir.clone(),
            extension: config.image_extension.clone(),
            images_per_class: config.capture.images_per_class.max(1),
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Starts (or restarts) collection at the first letter.
    pub fn start(&mut self, status: &StatusSender) {
        status.info("Starting data collection...");
        self.await_letter(0, status);
    }

    /// Begins capturing the pending letter. Ignored unless waiting for a trigger.
    pub fn trigger(&mut self, status: &StatusSender) -> bool {
        match self.state {
            CaptureState::AwaitingTrigger { letter_index } => {
                status.info(format!("Capturing images for letter: {}", ALPHABET[letter_index]));
                self.state = CaptureState::Capturing {
                    letter_index,
                    count: 0,
                };
                true
            }
            state => {
                log::debug!("Ignoring trigger in state {:?}", state);
                false
            }
        }
    }

    /// Attempts one frame grab while capturing.
    pub fn tick(&mut self, source: &mut dyn FrameSource, status: &StatusSender) {
        let CaptureState::Capturing {
            letter_index,
            count,
        } = self.state
        else {
            return;
        };

        if !source.is_open() {
            status.error("Webcam is not open. Please check your webcam.");
            self.state = CaptureState::Idle;
            return;
        }

        let Some(frame) = source.read() else {
            status.warn("Failed to capture frame. Retrying...");
            return;
        };

        let letter = ALPHABET[letter_index];
        let letter_dir = self.data_dir.join(letter.to_string());
        let path = letter_dir.join(format!("{}.{}", count, self.extension));
        let saved = fs::create_dir_all(&letter_dir)
            .map_err(|e| e.to_string())
            .and_then(|_| frame.mirrored().image.save(&path).map_err(|e| e.to_string()));
        if let Err(e) = saved {
            status.warn(format!("Failed to save {}: {}", path.display(), e));
            return;
        }

        let count = count + 1;
        status.send(StatusEvent::Captured {
            letter,
            count,
            total: self.images_per_class,
        });

        if count < self.images_per_class {
            self.state = CaptureState::Capturing {
                letter_index,
                count,
            };
            return;
        }

        status.info(format!("Finished capturing for letter: {}", letter));
        if letter_index + 1 < CLASS_COUNT {
            self.await_letter(letter_index + 1, status);
        } else {
            self.state = CaptureState::Idle;
            status.complete("Data collection complete!");
        }
    }

    fn await_letter(&mut self, letter_index: usize, status: &StatusSender) {
        self.state = CaptureState::AwaitingTrigger { letter_index };
        status.info(format!(
            "Prepare to gesture for letter: {}. Press SPACE to start.",
            ALPHABET[letter_index]
        ));
    }
}

/// Commands accepted by the capture task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureCommand {
    Trigger,
    Stop,
}

/// Handle to a running capture task. Dropping it stops the task and waits for it.
pub struct CaptureHandle {
    command_tx: Sender<CaptureCommand>,
    worker_handle: Option<JoinHandle<()>>,
}

impl CaptureHandle {
    pub fn trigger(&self) {
        let _ = self.command_tx.send(CaptureCommand::Trigger);
    }

    pub fn stop(&self) {
        let _ = self.command_tx.send(CaptureCommand::Stop);
    }

    pub fn is_finished(&self) -> bool {
        self.worker_handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Waits for the task to end on its own.
    pub fn join(mut self) {
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.worker_handle.take() {
            let _ = self.command_tx.send(CaptureCommand::Stop);
            let _ = handle.join();
        }
    }
}

/// Starts a capture session on a background thread.
///
/// The task leases the camera for its whole lifetime. It ends when the alphabet is complete,
/// the camera fails, a `Stop` command arrives or `stop` is tripped.
pub fn spawn_capture(
    config: &AppConfig,
    camera: SharedCamera,
    status: StatusSender,
    stop: StopToken,
) -> Result<CaptureHandle> {
    let (command_tx, command_rx) = bounded::<CaptureCommand>(16);
    let sequencer = CaptureSequencer::new(config);
    let interval = config.capture.interval().max(Duration::from_millis(1));

    let worker_handle = thread::Builder::new()
        .name("capture".into())
        .spawn(move || capture_loop(sequencer, camera, interval, command_rx, status, stop))?;

    Ok(CaptureHandle {
        command_tx,
        worker_handle: Some(worker_handle),
    })
}

fn capture_loop(
    mut sequencer: CaptureSequencer,
    camera: SharedCamera,
    interval: Duration,
    command_rx: Receiver<CaptureCommand>,
    status: StatusSender,
    stop: StopToken,
) {
    let mut lease = match camera.acquire("data collection") {
        Ok(lease) => lease,
        Err(e) => {
            status.error(e.to_string());
            return;
        }
    };

    sequencer.start(&status);
    let mut next_grab = Instant::now() + interval;

    loop {
        if stop.is_stopped() {
            break;
        }

        select! {
            recv(command_rx) -> cmd => match cmd {
                Ok(CaptureCommand::Trigger) => {
                    sequencer.trigger(&status);
                }
                Ok(CaptureCommand::Stop) | Err(_) => break,
            },
            recv(at(next_grab)) -> _ => {
                sequencer.tick(&mut *lease, &status);
                // Counted from the end of the attempt, failed grabs included.
                next_grab = Instant::now() + interval;
            }
        }

        if sequencer.state() == CaptureState::Idle {
            return;
        }
    }

    log::info!("Data collection stopped in state {:?}", sequencer.state());
}
