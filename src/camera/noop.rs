//! Noop camera.
//!
//! This exists so the agent can run end to end on machines without camera
//! hardware. It records nothing and returns black frames.

use super::{segment_path, Camera, CameraConfig, CameraError};
use chrono::Local;
use image::RgbImage;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub struct NoopCamera {
    config: CameraConfig,
    open: bool,
    recording: bool,
    segment: Option<PathBuf>,
}

impl NoopCamera {
    pub fn new(config: CameraConfig) -> Self {
        debug!(width = config.width, height = config.height, "noop camera initialized");
        Self {
            config,
            open: true,
            recording: false,
            segment: None,
        }
    }

    /// Segment the camera would be writing to, if recording.
    pub fn current_segment(&self) -> Option<&Path> {
        self.segment.as_deref()
    }

    fn next_segment(&mut self) {
        let path = segment_path(&self.config.video_dir, Local::now().naive_local());
        debug!(segment = %path.display(), "segment opened (noop)");
        self.segment = Some(path);
    }

    /// Whether the device is currently open.
    pub fn is_open(&self) -> bool {
        self.open
    }
}

impl Camera for NoopCamera {
    fn start_recording(&mut self) -> Result<(), CameraError> {
        if !self.open {
            debug!("reinitializing camera from scratch");
            self.open = true;
        }
        self.recording = true;
        self.next_segment();
        info!("recording started (noop)");
        Ok(())
    }

    fn split_recording(&mut self) -> Result<(), CameraError> {
        if !self.recording {
            return Err(CameraError::Device("split requested while not recording".into()));
        }
        self.next_segment();
        info!("recording split (noop)");
        Ok(())
    }

    fn stop_recording(&mut self) -> Result<(), CameraError> {
        if self.recording {
            self.recording = false;
            self.segment = None;
            info!("recording stopped (noop)");
        }
        Ok(())
    }

    fn capture_frame(&mut self) -> Result<RgbImage, CameraError> {
        if !self.open {
            return Err(CameraError::Device("camera is closed".into()));
        }
        Ok(RgbImage::new(self.config.width, self.config.height))
    }

    fn shutdown(&mut self) {
        if let Err(e) = self.stop_recording() {
            debug!("stop before shutdown: {e}");
        }
        self.open = false;
    }

    fn is_recording(&self) -> bool {
        self.recording
    }
}
