//! Region of interest tracking.

use crate::detect::{BoundingBox, Detection};
use chrono::NaiveDateTime;
use image::imageops::{self, FilterType};
use image::RgbImage;

/// Thumbnails are this many times smaller than the crop on each side.
const THUMBNAIL_DIVISOR: u32 = 4;

/// Sub-rectangle of the frame in which occupants are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionOfInterest {
    pub bounding_box: BoundingBox,
    pub established_at: NaiveDateTime,
}

impl RegionOfInterest {
    /// Build a ROI from the best detection, clamped to the frame.
    ///
    /// Returns `None` if nothing usable remains after clamping.
    pub fn from_detection(
        detection: &Detection,
        frame_width: u32,
        frame_height: u32,
        now: NaiveDateTime,
    ) -> Option<Self> {
        let bounding_box = detection.bbox.clamp_to(frame_width, frame_height);
        if bounding_box.is_empty() {
            return None;
        }
        Some(Self {
            bounding_box,
            established_at: now,
        })
    }

    /// Copy the ROI out of `frame`.
    pub fn crop(&self, frame: &RgbImage) -> RgbImage {
        let b = self.bounding_box.clamp_to(frame.width(), frame.height());
        imageops::crop_imm(frame, b.x_min, b.y_min, b.width(), b.height()).to_image()
    }
}

/// Downsample an annotated crop for the event clip.
pub fn thumbnail(crop: &RgbImage) -> RgbImage {
    let width = (crop.width() / THUMBNAIL_DIVISOR).max(1);
    let height = (crop.height() / THUMBNAIL_DIVISOR).max(1);
    imageops::resize(crop, width, height, FilterType::Triangle)
}
