//! ASL Recognizer - static hand-sign letter recognition
//!
//! Captures a labeled image corpus from a camera, turns every hand into a 42-value landmark
//! feature vector, trains a random forest on the result and classifies the live camera feed,
//! drawing the predicted letter next to the hand.
//!
//! The UI is not part of this crate. A host drives it through [`app::Controller`] and
//! receives status events and annotated frames over channels.

pub mod alphabet;
pub mod app;
pub mod artifact;
pub mod camera;
pub mod capture;
pub mod config;
pub mod dataset;
pub mod error;
pub mod features;
pub mod forest;
pub mod inference;
pub mod landmarks;
pub mod ml;
pub mod status;
pub mod trainer;

pub use app::Controller;
pub use config::AppConfig;
pub use error::{Error, Result};
