//! Conversion of raw recordings and mirroring to remote storage.
//!
//! Raw `.h264` segments are rewrapped into `.mp4` with `ffmpeg`. A conversion
//! only counts if the output exists and is larger than its source; otherwise
//! the output is discarded and the source kept for the next pass. The project
//! is then mirrored with `rclone`: videos are moved, everything else copied.

use crate::subprocess;
use std::path::{Path, PathBuf};
use std::process::Output;
use tracing::{debug, info, warn};

/// Convert-and-upload collaborator driven during inactive hours.
pub trait Archiver {
    fn convert_and_upload(&mut self) -> Result<SyncReport, SyncError>;
}

/// What one pass accomplished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub converted: usize,
    pub failed: usize,
    pub uploaded: bool,
}

/// Archiver for one project directory.
pub struct RecordingArchiver {
    project_dir: PathBuf,
    video_dir: PathBuf,
    cloud_project_dir: Option<String>,
    framerate: u32,
    ffmpeg: PathBuf,
    rclone: PathBuf,
}

impl RecordingArchiver {
    /// `cloud_data_dir` is an rclone path such as `remote:/traps`; `None`
    /// disables uploads.
    pub fn new(
        project_dir: PathBuf,
        video_dir: PathBuf,
        cloud_data_dir: Option<&str>,
        framerate: u32,
    ) -> Self {
        let cloud_project_dir = cloud_data_dir.map(|cloud| {
            let name = project_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            format!("{}/{}", cloud.trim_end_matches('/'), name)
        });
        match &cloud_project_dir {
            Some(dir) => debug!("uploads will be sent to {dir}"),
            None => debug!("no cloud_data_dir configured, uploads will not be attempted"),
        }
        Self {
            project_dir,
            video_dir,
            cloud_project_dir,
            framerate,
            ffmpeg: PathBuf::from("ffmpeg"),
            rclone: PathBuf::from("rclone"),
        }
    }

    /// Override the tool binaries.
    pub fn with_tools(mut self, ffmpeg: impl Into<PathBuf>, rclone: impl Into<PathBuf>) -> Self {
        self.ffmpeg = ffmpeg.into();
        self.rclone = rclone.into();
        self
    }

    pub fn cloud_project_dir(&self) -> Option<&str> {
        self.cloud_project_dir.as_deref()
    }

    /// Rewrap every raw segment. Returns (converted, failed).
    pub fn convert_recordings(&self) -> Result<(usize, usize), SyncError> {
        debug!("converting h264s to mp4s");
        let mut converted = 0;
        let mut failed = 0;

        for source in raw_segments(&self.video_dir)? {
            let target = source.with_extension("mp4");
            let fps = self.framerate.to_string();
            let result = subprocess::command(&self.ffmpeg)
                .args(["-y", "-analyzeduration", "100M", "-probesize", "100M", "-r"])
                .arg(&fps)
                .arg("-i")
                .arg(&source)
                .args(["-threads", "1", "-c:v", "copy", "-r"])
                .arg(&fps)
                .arg(&target)
                .output();

            if conversion_verified(&source, &target) {
                std::fs::remove_file(&source)?;
                converted += 1;
                continue;
            }

            let reason = match result {
                Ok(out) => String::from_utf8_lossy(&out.stderr).trim().to_string(),
                Err(e) => e.to_string(),
            };
            warn!(source = %source.display(), "failed to convert: {reason}");
            if target.exists() {
                std::fs::remove_file(&target)?;
            }
            failed += 1;
        }

        debug!(converted, failed, "conversion complete");
        Ok((converted, failed))
    }

    /// Move videos, then copy the rest of the project, to the cloud.
    pub fn upload(&self) -> Result<(), SyncError> {
        let Some(cloud) = &self.cloud_project_dir else {
            return Ok(());
        };
        let cloud_videos = format!("{cloud}/Videos");

        info!(
            "moving {} to {cloud_videos} (local copies will be deleted)",
            self.video_dir.display()
        );
        let out = subprocess::command(&self.rclone)
            .arg("move")
            .arg(&self.video_dir)
            .arg(&cloud_videos)
            .output()?;
        check_rclone("move", &out)?;

        debug!("copying remaining project files to cloud (local copies will be preserved)");
        let out = subprocess::command(&self.rclone)
            .arg("copy")
            .arg(&self.project_dir)
            .arg(cloud)
            .output()?;
        check_rclone("copy", &out)?;

        debug!("upload complete");
        Ok(())
    }
}

impl Archiver for RecordingArchiver {
    fn convert_and_upload(&mut self) -> Result<SyncReport, SyncError> {
        let (converted, failed) = self.convert_recordings()?;
        let uploaded = if self.cloud_project_dir.is_some() {
            self.upload()?;
            true
        } else {
            false
        };
        Ok(SyncReport {
            converted,
            failed,
            uploaded,
        })
    }
}

/// Raw segments waiting for conversion, oldest name first.
pub fn raw_segments(video_dir: &Path) -> Result<Vec<PathBuf>, SyncError> {
    if !video_dir.exists() {
        return Ok(Vec::new());
    }
    let mut segments: Vec<PathBuf> = std::fs::read_dir(video_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map(|e| e == "h264").unwrap_or(false))
        .collect();
    segments.sort();
    Ok(segments)
}

/// A conversion is good if the output exists and outgrew its source.
pub fn conversion_verified(source: &Path, target: &Path) -> bool {
    match (std::fs::metadata(source), std::fs::metadata(target)) {
        (Ok(src), Ok(dst)) => dst.len() > src.len(),
        _ => false,
    }
}

fn check_rclone(step: &str, out: &Output) -> Result<(), SyncError> {
    let stderr = String::from_utf8_lossy(&out.stderr);
    if !out.status.success() || !stderr.trim().is_empty() {
        return Err(SyncError::Upload(format!(
            "rclone {step} may have failed: {}",
            stderr.trim()
        )));
    }
    Ok(())
}

/// Errors during convert-and-upload.
#[derive(Debug)]
pub enum SyncError {
    Io(std::io::Error),
    Upload(String),
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::Io(e) => write!(f, "sync IO error: {e}"),
            SyncError::Upload(e) => write!(f, "upload error: {e}"),
        }
    }
}

impl std::error::Error for SyncError {}

impl From<std::io::Error> for SyncError {
    fn from(e: std::io::Error) -> Self {
        SyncError::Io(e)
    }
}
