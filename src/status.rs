//! Status events reported by the background tasks, and the token used to stop them.
//!
//! Tasks never touch the UI directly. They push [`StatusEvent`]s into a channel, and the host
//! decides how to show them.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

/// A human-readable progress or failure report.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    /// General progress information.
    Info(String),
    /// One more image captured for `letter`.
    Captured {
        letter: char,
        count: usize,
        total: usize,
    },
    /// A recoverable per-item problem; the operation continues.
    Warning(String),
    /// The operation was aborted.
    Error(String),
    /// The operation finished.
    Complete(String),
    /// Training finished with the given held-out accuracy (percent). Sent once the model is
    /// saved, as the last event of a training run.
    Trained {
        accuracy: f64,
        train_samples: usize,
        test_samples: usize,
    },
}

impl StatusEvent {
    pub fn is_error(&self) -> bool {
        matches!(self, StatusEvent::Error(_))
    }

    /// Whether this event ends the operation that produced it.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StatusEvent::Error(_) | StatusEvent::Complete(_) | StatusEvent::Trained { .. }
        )
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusEvent::Info(msg)
            | StatusEvent::Warning(msg)
            | StatusEvent::Error(msg)
            | StatusEvent::Complete(msg) => f.write_str(msg),
            StatusEvent::Captured {
                letter,
                count,
                total,
            } => write!(f, "{} {}/{}", letter, count, total),
            StatusEvent::Trained { accuracy, .. } => {
                write!(f, "Training complete! Accuracy: {:.2}%", accuracy)
            }
        }
    }
}

/// Sending half of a status channel.
///
/// Every event is also written to the log, so headless runs keep a trace. Sending never fails:
/// if the receiver is gone the event is only logged.
#[derive(Clone)]
pub struct StatusSender {
    tx: Sender<StatusEvent>,
}

impl StatusSender {
    pub fn send(&self, event: StatusEvent) {
        log_event(&event);
        let _ = self.tx.send(event);
    }

    pub fn info(&self, msg: impl Into<String>) {
        self.send(StatusEvent::Info(msg.into()));
    }

    pub fn warn(&self, msg: impl Into<String>) {
        self.send(StatusEvent::Warning(msg.into()));
    }

    pub fn error(&self, msg: impl Into<String>) {
        self.send(StatusEvent::Error(msg.into()));
    }

    pub fn complete(&self, msg: impl Into<String>) {
        self.send(StatusEvent::Complete(msg.into()));
    }
}

/// Writes `event` to the log at the level matching its kind.
pub fn log_event(event: &StatusEvent) {
    match event {
        StatusEvent::Warning(_) => log::warn!("{}", event),
        StatusEvent::Error(_) => log::error!("{}", event),
        StatusEvent::Captured { .. } => log::debug!("{}", event),
        _ => log::info!("{}", event),
    }
}

/// Creates an unbounded status channel.
pub fn channel() -> (StatusSender, Receiver<StatusEvent>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (StatusSender { tx }, rx)
}

/// Cooperative cancellation flag shared between a controller and its background tasks.
#[derive(Clone, Default, Debug)]
pub struct StopToken {
    stopped: Arc<AtomicBool>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}
