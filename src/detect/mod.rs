//! Object detection seam.
//!
//! Two detectors run per session: a coarse one that locates the region of
//! interest, and a fine one that counts occupants inside it. Inference itself
//! happens outside this crate.

pub mod command;

pub use command::CommandDetector;

use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Axis-aligned box in pixel coordinates. `x_max`/`y_max` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: u32,
    pub y_min: u32,
    pub x_max: u32,
    pub y_max: u32,
}

impl BoundingBox {
    pub fn new(x_min: u32, y_min: u32, x_max: u32, y_max: u32) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    pub fn width(&self) -> u32 {
        self.x_max.saturating_sub(self.x_min)
    }

    pub fn height(&self) -> u32 {
        self.y_max.saturating_sub(self.y_min)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Clamp the box to a `width` x `height` frame.
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let x_min = self.x_min.min(width);
        let y_min = self.y_min.min(height);
        Self {
            x_min,
            y_min,
            x_max: self.x_max.clamp(x_min, width),
            y_max: self.y_max.clamp(y_min, height),
        }
    }
}

/// One detector hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub score: f32,
}

/// A detector returns hits sorted by confidence, highest first.
///
/// An empty vector is a valid "nothing found" answer.
pub trait Detector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>, DetectorError>;
}

/// Sort detections by score, highest first.
///
/// The sort is stable, so equal scores keep the detector's own order.
pub fn sort_by_confidence(detections: &mut [Detection]) {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));
}

/// Errors raised by a detector backend.
#[derive(Debug)]
pub enum DetectorError {
    /// The backend could not be started or talked to
    Io(std::io::Error),
    /// The frame could not be encoded for the backend
    Encode(String),
    /// The backend answered with something unreadable
    Protocol(String),
}

impl std::fmt::Display for DetectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectorError::Io(e) => write!(f, "detector IO error: {e}"),
            DetectorError::Encode(e) => write!(f, "detector encode error: {e}"),
            DetectorError::Protocol(e) => write!(f, "detector protocol error: {e}"),
        }
    }
}

impl std::error::Error for DetectorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DetectorError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DetectorError {
    fn from(e: std::io::Error) -> Self {
        DetectorError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(score: f32, tag: u32) -> Detection {
        Detection {
            bbox: BoundingBox::new(tag, 0, tag + 1, 1),
            score,
        }
    }

    #[test]
    fn test_sort_is_descending_and_stable() {
        let mut dets = vec![det(0.3, 0), det(0.9, 1), det(0.9, 2), det(0.5, 3)];
        sort_by_confidence(&mut dets);
        let order: Vec<u32> = dets.iter().map(|d| d.bbox.x_min).collect();
        assert_eq!(order, vec![1, 2, 3, 0]);
    }

    #[test]
    fn test_clamp_to_frame() {
        let bbox = BoundingBox::new(10, 20, 500, 400).clamp_to(320, 240);
        assert_eq!(bbox, BoundingBox::new(10, 20, 320, 240));

        let outside = BoundingBox::new(400, 300, 500, 400).clamp_to(320, 240);
        assert!(outside.is_empty());
    }
}
