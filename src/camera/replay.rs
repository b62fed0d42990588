//! Replay camera: frames decoded from an existing video through `ffmpeg`.
//!
//! Useful for tuning detectors and thresholds against footage from the field.
//! One frame is emitted per framegrab interval of source time, scaled to the
//! configured resolution. Recording operations are no-ops.

use super::{Camera, CameraConfig, CameraError};
use crate::subprocess;
use image::RgbImage;
use std::io::{ErrorKind, Read};
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Stdio};
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct ReplayCamera {
    config: CameraConfig,
    source: PathBuf,
    frame_interval: Duration,
    program: PathBuf,
    decoder: Option<(Child, ChildStdout)>,
    frames_read: u64,
    recording: bool,
}

impl ReplayCamera {
    pub fn new(config: CameraConfig, source: PathBuf, frame_interval: Duration) -> Self {
        debug!(source = %source.display(), "replay camera initialized");
        Self {
            config,
            source,
            frame_interval,
            program: PathBuf::from("ffmpeg"),
            decoder: None,
            frames_read: 0,
            recording: false,
        }
    }

    /// Use a specific decoder binary.
    pub fn with_decoder(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    fn spawn_decoder(&mut self) -> Result<(), CameraError> {
        let fps = 1.0 / self.frame_interval.as_secs_f64().max(1e-3);
        let filter = format!(
            "fps={fps:.6},scale={}:{}",
            self.config.width, self.config.height
        );
        let mut child = subprocess::command(&self.program)
            .args(["-v", "error", "-i"])
            .arg(&self.source)
            .args(["-vf", filter.as_str(), "-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CameraError::Device("decoder has no stdout".into()))?;
        self.decoder = Some((child, stdout));
        info!(source = %self.source.display(), "replay decoder started");
        Ok(())
    }
}

impl Camera for ReplayCamera {
    fn start_recording(&mut self) -> Result<(), CameraError> {
        self.recording = true;
        Ok(())
    }

    fn split_recording(&mut self) -> Result<(), CameraError> {
        Ok(())
    }

    fn stop_recording(&mut self) -> Result<(), CameraError> {
        self.recording = false;
        Ok(())
    }

    fn capture_frame(&mut self) -> Result<RgbImage, CameraError> {
        if self.decoder.is_none() {
            self.spawn_decoder()?;
        }
        let (width, height) = (self.config.width, self.config.height);
        let mut buf = vec![0u8; width as usize * height as usize * 3];

        let (_, stdout) = self
            .decoder
            .as_mut()
            .ok_or_else(|| CameraError::Device("decoder not running".into()))?;
        if let Err(e) = read_frame(stdout, &mut buf) {
            if matches!(e, CameraError::EndOfStream) {
                info!(frames = self.frames_read, "replay source exhausted");
                self.shutdown();
            }
            return Err(e);
        }
        self.frames_read += 1;

        RgbImage::from_raw(width, height, buf)
            .ok_or_else(|| CameraError::Device("decoded frame has the wrong size".into()))
    }

    fn shutdown(&mut self) {
        if let Err(e) = self.stop_recording() {
            debug!("stop before shutdown: {e}");
        }
        if let Some((mut child, _)) = self.decoder.take() {
            if let Err(e) = child.kill() {
                // Already exited
                debug!("decoder kill: {e}");
            }
            if let Err(e) = child.wait() {
                warn!("could not reap replay decoder: {e}");
            }
        }
    }

    fn is_recording(&self) -> bool {
        self.recording
    }
}

/// Fill `buf` with one raw frame. A source that ends, even mid-frame, is
/// [`CameraError::EndOfStream`].
fn read_frame<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), CameraError> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(CameraError::EndOfStream),
        Err(e) => Err(CameraError::Io(e)),
    }
}

impl Drop for ReplayCamera {
    fn drop(&mut self) {
        self.shutdown();
    }
}
