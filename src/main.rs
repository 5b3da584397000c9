//! ASL Recognizer - Main Entry Point
//!
//! A line-oriented stand-in for the desktop UI: type a command and press Enter.

use std::io::BufRead;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use anyhow::Context;
use asl_recognizer::camera::{FrameSource, ImageDirSource, SharedCamera};
use asl_recognizer::config::CONFIG_FILE;
use asl_recognizer::inference::InferenceEvent;
use asl_recognizer::ml::OnnxDetectorFactory;
use asl_recognizer::status::StatusEvent;
use asl_recognizer::{AppConfig, Controller};
use crossbeam_channel::Receiver;

const HELP: &str = "Commands: collect, <Enter>/space/trigger, dataset, train, infer, stop, quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Collect,
    Trigger,
    Dataset,
    Train,
    Infer,
    Stop,
    Quit,
    Help,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "collect" => Ok(Command::Collect),
            "" | "space" | "trigger" => Ok(Command::Trigger),
            "dataset" => Ok(Command::Dataset),
            "train" => Ok(Command::Train),
            "infer" | "detect" => Ok(Command::Infer),
            "stop" => Ok(Command::Stop),
            "quit" | "exit" | "q" => Ok(Command::Quit),
            "help" | "?" => Ok(Command::Help),
            other => Err(format!("Unknown command: {}", other)),
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("ASL Recognizer v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load(Path::new(CONFIG_FILE)).context("Failed to load configuration")?;
    let detectors = Arc::new(OnnxDetectorFactory::new(config.detector.clone()));
    let camera = open_camera(&config).map(SharedCamera::new);
    if camera.is_none() {
        log::warn!("No camera available; data collection and detection are disabled");
    }

    let mut controller = Controller::new(config, camera, detectors);
    println!("{}", HELP);

    for line in std::io::stdin().lock().lines() {
        let line = line.context("Failed to read command")?;
        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        match command {
            Command::Collect => print_status(controller.start_collection()),
            Command::Trigger => controller.trigger_capture(),
            Command::Dataset => print_status(controller.build_dataset()),
            Command::Train => print_status(controller.train()),
            Command::Infer => show_inference(controller.start_inference()),
            Command::Stop => controller.stop(),
            Command::Help => println!("{}", HELP),
            Command::Quit => break,
        }
    }

    // Dropping the controller stops every task and releases the camera.
    drop(controller);
    log::info!("Goodbye");
    Ok(())
}

/// Opens the webcam if the crate was built with it, else the configured replay directory.
fn open_camera(config: &AppConfig) -> Option<Box<dyn FrameSource>> {
    if let Some(source) = open_webcam(config) {
        return Some(source);
    }

    let dir = config.replay_dir.as_ref()?;
    match ImageDirSource::new(dir, true) {
        Ok(source) => Some(Box::new(source)),
        Err(e) => {
            log::error!("Failed to open replay directory {:?}: {}", dir, e);
            None
        }
    }
}

#[cfg(feature = "webcam")]
fn open_webcam(config: &AppConfig) -> Option<Box<dyn FrameSource>> {
    for camera in asl_recognizer::camera::list_cameras() {
        log::info!("Found camera {}: {}", camera.index, camera.name);
    }
    match asl_recognizer::camera::WebcamSource::open(config.camera_index) {
        Ok(source) => Some(Box::new(source)),
        Err(e) => {
            log::error!("{}", e);
            None
        }
    }
}

#[cfg(not(feature = "webcam"))]
fn open_webcam(_config: &AppConfig) -> Option<Box<dyn FrameSource>> {
    log::info!("Built without the `webcam` feature");
    None
}

fn print_status(rx: Receiver<StatusEvent>) {
    thread::spawn(move || {
        for event in rx {
            println!("{}", event);
        }
    });
}

/// Prints detection status and the frame rate, once per second.
fn show_inference(rx: Receiver<InferenceEvent>) {
    thread::spawn(move || {
        let mut frames_since_update = 0u32;
        let mut last_fps_update = Instant::now();

        for event in rx {
            match event {
                InferenceEvent::Status(status) => println!("{}", status),
                InferenceEvent::Frame(_) => {
                    frames_since_update += 1;
                    let elapsed = last_fps_update.elapsed().as_secs_f64();
                    if elapsed >= 1.0 {
                        println!("FPS: {:.1}", frames_since_update as f64 / elapsed);
                        frames_since_update = 0;
                        last_fps_update = Instant::now();
                    }
                }
            }
        }
    });
}
