//! Camera seam for the field camera trap.
//!
//! A camera records continuous video into segment files and hands out single
//! frames for detection. Hardware drivers live behind the [`Camera`] trait;
//! this module ships a noop backend for dry runs and a replay backend that
//! feeds frames from an existing video.

pub mod noop;
pub mod replay;

pub use noop::NoopCamera;
pub use replay::ReplayCamera;

use chrono::NaiveDateTime;
use image::RgbImage;
use std::path::{Path, PathBuf};

/// Recording and frame-capture operations the session loop relies on.
pub trait Camera {
    /// Begin recording into a new segment, reopening the device if it was shut down.
    fn start_recording(&mut self) -> Result<(), CameraError>;

    /// Close the current segment and continue into a new one.
    fn split_recording(&mut self) -> Result<(), CameraError>;

    /// Stop recording. A no-op when not recording.
    fn stop_recording(&mut self) -> Result<(), CameraError>;

    /// Grab a single frame. Blocks until one is available.
    fn capture_frame(&mut self) -> Result<RgbImage, CameraError>;

    /// Stop recording and release the device. Safe to call repeatedly.
    fn shutdown(&mut self);

    /// Whether a recording is in progress.
    fn is_recording(&self) -> bool;
}

/// Capture parameters shared by the camera backends.
#[derive(Debug, Clone)]
pub struct CameraConfig {
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    pub video_dir: PathBuf,
}

/// Path of a new raw segment, named after the local time it starts.
pub fn segment_path(video_dir: &Path, now: NaiveDateTime) -> PathBuf {
    let stamp = now.format("%Y-%m-%dT%H_%M_%S");
    video_dir.join(format!("{stamp}.h264"))
}

/// Errors that can occur while talking to the camera.
#[derive(Debug)]
pub enum CameraError {
    Io(std::io::Error),
    /// The device refused an operation
    Device(String),
    /// A finite frame source ran out
    EndOfStream,
}

impl std::fmt::Display for CameraError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraError::Io(e) => write!(f, "camera IO error: {e}"),
            CameraError::Device(e) => write!(f, "camera device error: {e}"),
            CameraError::EndOfStream => write!(f, "camera frame source exhausted"),
        }
    }
}

impl std::error::Error for CameraError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CameraError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CameraError {
    fn from(e: std::io::Error) -> Self {
        CameraError::Io(e)
    }
}
