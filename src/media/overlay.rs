//! Drawing on frames: detection boxes and burned-in occupancy counts.

use crate::detect::Detection;
use image::{Rgb, RgbImage};

pub const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_THICKNESS: u32 = 2;

/// 3x5 bitmaps for the digits 0-9, one row per byte, low three bits used.
const DIGITS: [[u8; 5]; 10] = [
    [0b111, 0b101, 0b101, 0b101, 0b111],
    [0b010, 0b110, 0b010, 0b010, 0b111],
    [0b111, 0b001, 0b111, 0b100, 0b111],
    [0b111, 0b001, 0b111, 0b001, 0b111],
    [0b101, 0b101, 0b111, 0b001, 0b001],
    [0b111, 0b100, 0b111, 0b001, 0b111],
    [0b111, 0b100, 0b111, 0b101, 0b111],
    [0b111, 0b001, 0b010, 0b010, 0b010],
    [0b111, 0b101, 0b111, 0b101, 0b111],
    [0b111, 0b101, 0b111, 0b001, 0b111],
];

/// Outline every detection on `image` for audit.
pub fn draw_detections(image: &mut RgbImage, detections: &[Detection]) {
    for det in detections {
        let b = det.bbox.clamp_to(image.width(), image.height());
        if b.is_empty() {
            continue;
        }
        for t in 0..BOX_THICKNESS {
            let (x0, y0) = (b.x_min + t, b.y_min + t);
            let (x1, y1) = (b.x_max.saturating_sub(1 + t), b.y_max.saturating_sub(1 + t));
            if x0 > x1 || y0 > y1 {
                break;
            }
            for x in x0..=x1 {
                image.put_pixel(x, y0, BOX_COLOR);
                image.put_pixel(x, y1, BOX_COLOR);
            }
            for y in y0..=y1 {
                image.put_pixel(x0, y, BOX_COLOR);
                image.put_pixel(x1, y, BOX_COLOR);
            }
        }
    }
}

/// Burn `count` into the top-left corner, black on a white plate.
///
/// Digits scale with the frame height and are clipped at the frame edges.
pub fn burn_count(image: &mut RgbImage, count: u32) {
    let scale = (image.height() / 24).max(1);
    let text = count.to_string();
    let glyph_w = 3 * scale;
    let glyph_h = 5 * scale;
    let pad = scale;
    let plate_w = pad + text.len() as u32 * (glyph_w + pad);
    let plate_h = glyph_h + 2 * pad;

    fill(image, 0, 0, plate_w, plate_h, Rgb([255, 255, 255]));

    for (i, ch) in text.chars().enumerate() {
        let Some(digit) = ch.to_digit(10) else { continue };
        let origin_x = pad + i as u32 * (glyph_w + pad);
        for (row, bits) in DIGITS[digit as usize].iter().enumerate() {
            for col in 0..3u32 {
                if bits & (0b100 >> col) != 0 {
                    fill(
                        image,
                        origin_x + col * scale,
                        pad + row as u32 * scale,
                        scale,
                        scale,
                        Rgb([0, 0, 0]),
                    );
                }
            }
        }
    }
}

fn fill(image: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, color: Rgb<u8>) {
    let x_end = (x + w).min(image.width());
    let y_end = (y + h).min(image.height());
    for yy in y..y_end {
        for xx in x..x_end {
            image.put_pixel(xx, yy, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    #[test]
    fn test_draw_detection_outline() {
        let mut img = RgbImage::new(20, 20);
        let det = Detection {
            bbox: BoundingBox::new(2, 2, 12, 12),
            score: 0.5,
        };
        draw_detections(&mut img, &[det]);
        assert_eq!(img.get_pixel(2, 2), &BOX_COLOR);
        assert_eq!(img.get_pixel(11, 11), &BOX_COLOR);
        assert_eq!(img.get_pixel(7, 7), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_burn_count_marks_corner() {
        let mut img = RgbImage::new(48, 48);
        burn_count(&mut img, 7);
        // White plate at the corner, untouched pixels far away
        assert_eq!(img.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(img.get_pixel(47, 47), &Rgb([0, 0, 0]));
        // Top row of a 7 is solid
        assert_eq!(img.get_pixel(2, 2), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_burn_count_on_tiny_frame() {
        let mut img = RgbImage::new(3, 3);
        burn_count(&mut img, 123);
    }
}
