//! Detector backed by an external inference helper.
//!
//! The helper is spawned once per frame with `--model PATH --threshold T`,
//! receives the frame as PNG on stdin and prints a JSON array of
//! `{"bbox": [x_min, y_min, x_max, y_max], "score": s}` on stdout.

use super::{sort_by_confidence, BoundingBox, Detection, Detector, DetectorError};
use crate::subprocess;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, RgbImage};
use serde::Deserialize;
use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use tracing::debug;

/// Wire format of one hit printed by the helper.
#[derive(Debug, Deserialize)]
struct RawDetection {
    bbox: [f32; 4],
    score: f32,
}

pub struct CommandDetector {
    program: String,
    args: Vec<String>,
    model: PathBuf,
    confidence_threshold: f32,
}

impl CommandDetector {
    /// `command` is the helper program followed by any fixed arguments.
    pub fn new(command: &[String], model: PathBuf, confidence_threshold: f32) -> Self {
        let (program, args) = match command.split_first() {
            Some((program, args)) => (program.clone(), args.to_vec()),
            None => (String::new(), Vec::new()),
        };
        debug!(model = %model.display(), confidence_threshold, "command detector configured");
        Self {
            program,
            args,
            model,
            confidence_threshold,
        }
    }

    fn encode(image: &RgbImage) -> Result<Vec<u8>, DetectorError> {
        let mut png = Vec::new();
        PngEncoder::new(&mut png)
            .write_image(image.as_raw(), image.width(), image.height(), ColorType::Rgb8)
            .map_err(|e| DetectorError::Encode(e.to_string()))?;
        Ok(png)
    }
}

impl Detector for CommandDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
        let png = Self::encode(image)?;

        let mut child = subprocess::command(&self.program)
            .args(&self.args)
            .arg("--model")
            .arg(&self.model)
            .arg("--threshold")
            .arg(self.confidence_threshold.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&png)?;
        }
        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(DetectorError::Protocol(format!(
                "helper exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        parse_detections(
            &output.stdout,
            self.confidence_threshold,
            image.width(),
            image.height(),
        )
    }
}

/// Decode helper output, drop low-confidence hits and clamp boxes to the frame.
pub(crate) fn parse_detections(
    stdout: &[u8],
    threshold: f32,
    width: u32,
    height: u32,
) -> Result<Vec<Detection>, DetectorError> {
    let raw: Vec<RawDetection> =
        serde_json::from_slice(stdout).map_err(|e| DetectorError::Protocol(e.to_string()))?;

    let px = |v: f32| if v.is_finite() && v > 0.0 { v.round() as u32 } else { 0 };
    let mut detections: Vec<Detection> = raw
        .into_iter()
        .filter(|r| r.score >= threshold)
        .map(|r| Detection {
            bbox: BoundingBox::new(px(r.bbox[0]), px(r.bbox[1]), px(r.bbox[2]), px(r.bbox[3]))
                .clamp_to(width, height),
            score: r.score,
        })
        .collect();

    sort_by_confidence(&mut detections);
    Ok(detections)
}
