//! JPEG snapshots embedded in reports as base64.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ImageResult, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use inference_common::face::FaceBox;

pub const TIMELINE_THUMBNAIL_SIZE: u32 = 200;
pub const SUSPICIOUS_THUMBNAIL_SIZE: u32 = 300;
const JPEG_QUALITY: u8 = 85;
const FACE_OUTLINE: Rgb<u8> = Rgb([239, 68, 68]);

/// Shrinks `image` to fit in a `max_size` square. Never upscales.
pub fn fit_within(image: &RgbImage, max_size: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    let ratio = (max_size as f64 / width as f64).min(max_size as f64 / height as f64);
    if ratio >= 1.0 {
        return image.clone();
    }
    let new_width = ((width as f64 * ratio) as u32).max(1);
    let new_height = ((height as f64 * ratio) as u32).max(1);
    imageops::resize(image, new_width, new_height, FilterType::Lanczos3)
}

/// Base64 JPEG of `image` scaled to fit `max_size`.
pub fn encode_thumbnail(image: &RgbImage, max_size: u32) -> ImageResult<String> {
    let scaled = fit_within(image, max_size);
    let mut jpeg = Vec::new();
    scaled.write_with_encoder(JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY))?;
    Ok(STANDARD.encode(jpeg))
}

/// Full frame with the detected face outlined, for the suspicious-frame list.
pub fn face_snapshot(frame: &RgbImage, bbox: &FaceBox) -> ImageResult<String> {
    let mut marked = frame.clone();
    let x = bbox.x1.max(0.0) as i32;
    let y = bbox.y1.max(0.0) as i32;
    let width = bbox.width().round() as u32;
    let height = bbox.height().round() as u32;
    if width > 0 && height > 0 {
        // Two pixel outline so it survives downscaling.
        draw_hollow_rect_mut(&mut marked, Rect::at(x, y).of_size(width, height), FACE_OUTLINE);
        if width > 2 && height > 2 {
            draw_hollow_rect_mut(
                &mut marked,
                Rect::at(x + 1, y + 1).of_size(width - 2, height - 2),
                FACE_OUTLINE,
            );
        }
    }
    encode_thumbnail(&marked, SUSPICIOUS_THUMBNAIL_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(b64: &str) -> RgbImage {
        let bytes = STANDARD.decode(b64).unwrap();
        image::load_from_memory(&bytes).unwrap().to_rgb8()
    }

    #[test]
    fn large_frames_are_downscaled_keeping_aspect() {
        let frame = RgbImage::from_pixel(800, 400, Rgb([10, 200, 30]));
        let thumb = decode(&encode_thumbnail(&frame, TIMELINE_THUMBNAIL_SIZE).unwrap());
        assert_eq!(thumb.dimensions(), (200, 100));
    }

    #[test]
    fn small_frames_are_never_upscaled() {
        let frame = RgbImage::from_pixel(120, 90, Rgb([0, 0, 0]));
        assert_eq!(fit_within(&frame, 300).dimensions(), (120, 90));
    }

    #[test]
    fn snapshot_outlines_the_face() {
        let frame = RgbImage::from_pixel(100, 100, Rgb([0, 0, 0]));
        let bbox = FaceBox {
            x1: 20.0,
            y1: 20.0,
            x2: 80.0,
            y2: 80.0,
            score: 0.99,
        };
        let snapshot = decode(&face_snapshot(&frame, &bbox).unwrap());
        assert_eq!(snapshot.dimensions(), (100, 100));
        // JPEG is lossy; the outline is still clearly red.
        let edge = snapshot.get_pixel(50, 20);
        assert!(edge[0] > 100 && edge[0] > edge[1] + 50);
        let centre = snapshot.get_pixel(50, 50);
        assert!(centre[0] < 40);
    }
}
