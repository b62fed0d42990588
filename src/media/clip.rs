//! Event clips: the buffered thumbnails of a behavior window as one video.

use super::overlay::burn_count;
use crate::subprocess;
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::debug;

/// One clip frame: a thumbnail and the occupancy counted in it.
#[derive(Debug, Clone, Copy)]
pub struct ClipFrame<'a> {
    pub occupancy: u32,
    pub image: &'a RgbImage,
}

/// Writes a playable video from ordered frames, occupancy burned in.
pub trait ClipWriter {
    fn write_clip(&self, path: &Path, frames: &[ClipFrame<'_>], fps: u32) -> Result<(), ClipError>;
}

/// Clip writer that pipes raw RGB frames into `ffmpeg`.
pub struct FfmpegClipWriter {
    program: PathBuf,
}

impl FfmpegClipWriter {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
        }
    }

    /// Use a specific encoder binary.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FfmpegClipWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ClipWriter for FfmpegClipWriter {
    fn write_clip(&self, path: &Path, frames: &[ClipFrame<'_>], fps: u32) -> Result<(), ClipError> {
        let rendered = render_frames(frames)?;
        let (width, height) = rendered[0].dimensions();

        let mut child = subprocess::command(&self.program)
            .args(["-y", "-v", "error", "-f", "rawvideo", "-pix_fmt", "rgb24"])
            .arg("-s")
            .arg(format!("{width}x{height}"))
            .arg("-r")
            .arg(fps.max(1).to_string())
            .args(["-i", "-", "-c:v", "mpeg4", "-pix_fmt", "yuv420p"])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(ClipError::Io)?;

        if let Some(mut stdin) = child.stdin.take() {
            for frame in &rendered {
                stdin.write_all(frame.as_raw()).map_err(ClipError::Io)?;
            }
        }
        let output = child.wait_with_output().map_err(ClipError::Io)?;
        if !output.status.success() {
            return Err(ClipError::Encoder(format!(
                "{}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        debug!(path = %path.display(), frames = rendered.len(), fps, "event clip written");
        Ok(())
    }
}

/// Burn occupancy into copies of the frames, resizing stragglers to the
/// first frame's size so the encoder sees a constant geometry.
pub fn render_frames(frames: &[ClipFrame<'_>]) -> Result<Vec<RgbImage>, ClipError> {
    let first = frames.first().ok_or(ClipError::Empty)?;
    let (width, height) = first.image.dimensions();

    Ok(frames
        .iter()
        .map(|frame| {
            let mut image = if frame.image.dimensions() == (width, height) {
                frame.image.clone()
            } else {
                imageops::resize(frame.image, width, height, FilterType::Triangle)
            };
            burn_count(&mut image, frame.occupancy);
            image
        })
        .collect())
}

/// Errors while producing a clip.
#[derive(Debug)]
pub enum ClipError {
    /// No frames to write
    Empty,
    Io(std::io::Error),
    /// The encoder rejected the input
    Encoder(String),
}

impl std::fmt::Display for ClipError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClipError::Empty => write!(f, "clip has no frames"),
            ClipError::Io(e) => write!(f, "clip IO error: {e}"),
            ClipError::Encoder(e) => write!(f, "clip encoder error: {e}"),
        }
    }
}

impl std::error::Error for ClipError {}
