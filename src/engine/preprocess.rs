//! Image preprocessing for the face models and region crops

use std::io::Cursor;

use anyhow::{Context, Result};
use image::{imageops::FilterType, DynamicImage, GenericImageView, ImageBuffer, Rgb};
use ndarray::Array4;

use crate::analysis::types::RegionRect;

/// Input size for the SCRFD detector (the detection copy is at most 512 on its long edge)
pub const DETECTOR_INPUT_SIZE: (u32, u32) = (512, 512);

/// Input size for the 68-point landmark regressor
pub const LANDMARK_INPUT_SIZE: (u32, u32) = (112, 112);

/// Input size for the gender/age model
pub const ATTRIBUTE_INPUT_SIZE: (u32, u32) = (96, 96);

/// Input size for the FER+ emotion model
pub const EMOTION_INPUT_SIZE: (u32, u32) = (64, 64);

/// Decode image from bytes with EXIF orientation handling
pub fn decode_image(data: &[u8]) -> Result<DynamicImage> {
    let image = image::load_from_memory(data).context("Failed to decode image")?;
    Ok(apply_exif_orientation(data, image))
}

/// Phone cameras store rotation as an EXIF tag instead of rotating pixels
fn apply_exif_orientation(data: &[u8], image: DynamicImage) -> DynamicImage {
    let orientation = match exif::Reader::new().read_from_container(&mut Cursor::new(data)) {
        Ok(exif_data) => exif_data
            .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
            .and_then(|field| field.value.get_uint(0))
            .unwrap_or(1),
        Err(_) => 1,
    };

    // See https://exiftool.org/TagNames/EXIF.html (Orientation)
    match orientation {
        2 => image.fliph(),
        3 => image.rotate180(),
        4 => image.flipv(),
        5 => image.rotate90().fliph(),
        6 => image.rotate90(),
        7 => image.rotate270().fliph(),
        8 => image.rotate270(),
        _ => image,
    }
}

/// A downscaled copy of the source used for detection, with the factors
/// that map detection coordinates back to the original image.
pub struct DetectionImage {
    pub image: DynamicImage,
    pub scale_x: f64,
    pub scale_y: f64,
}

/// Downscale so the longer edge is at most `max_edge`. Never upscales.
pub fn downscale_for_detection(image: &DynamicImage, max_edge: u32) -> DetectionImage {
    let (orig_w, orig_h) = image.dimensions();
    let scale = f64::min(1.0, max_edge as f64 / orig_w.max(orig_h) as f64);
    let det_w = ((orig_w as f64 * scale).round() as u32).max(1);
    let det_h = ((orig_h as f64 * scale).round() as u32).max(1);

    let resized = if (det_w, det_h) == (orig_w, orig_h) {
        image.clone()
    } else {
        image.resize_exact(det_w, det_h, FilterType::Triangle)
    };

    DetectionImage {
        image: resized,
        scale_x: orig_w as f64 / det_w as f64,
        scale_y: orig_h as f64 / det_h as f64,
    }
}

/// Preprocess image for the detection model: letterbox to the input size, NCHW in [-1, 1]
pub fn preprocess_for_detection(image: &DynamicImage) -> Array4<f32> {
    let (target_w, target_h) = DETECTOR_INPUT_SIZE;
    let padded = resize_with_padding(image, target_w, target_h);
    image_to_nchw(&padded, true)
}

/// Preprocess a face crop for the landmark model: NCHW in [0, 1]
pub fn preprocess_for_landmarks(face: &DynamicImage) -> Array4<f32> {
    let (target_w, target_h) = LANDMARK_INPUT_SIZE;
    let resized = face.resize_exact(target_w, target_h, FilterType::Triangle);
    image_to_nchw(&resized, false)
}

/// Resize image with padding to maintain aspect ratio
fn resize_with_padding(image: &DynamicImage, target_w: u32, target_h: u32) -> DynamicImage {
    let info = ResizeInfo::new(image.dimensions(), (target_w, target_h));
    let new_w = ((image.width() as f32 * info.scale) as u32).clamp(1, target_w);
    let new_h = ((image.height() as f32 * info.scale) as u32).clamp(1, target_h);

    let resized = image.resize_exact(new_w, new_h, FilterType::Triangle).to_rgb8();
    let mut padded = ImageBuffer::from_pixel(target_w, target_h, Rgb([0u8, 0, 0]));
    image::imageops::replace(&mut padded, &resized, info.offset_x as i64, info.offset_y as i64);

    DynamicImage::ImageRgb8(padded)
}

/// Convert image to NCHW tensor, BGR channel order as the InsightFace models expect.
/// normalize: if true, map to [-1, 1], otherwise [0, 1]
fn image_to_nchw(image: &DynamicImage, normalize: bool) -> Array4<f32> {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let (r, g, b) = (pixel[0] as f32, pixel[1] as f32, pixel[2] as f32);
        let (x, y) = (x as usize, y as usize);
        if normalize {
            tensor[[0, 0, y, x]] = (b - 127.5) / 128.0;
            tensor[[0, 1, y, x]] = (g - 127.5) / 128.0;
            tensor[[0, 2, y, x]] = (r - 127.5) / 128.0;
        } else {
            tensor[[0, 0, y, x]] = b / 255.0;
            tensor[[0, 1, y, x]] = g / 255.0;
            tensor[[0, 2, y, x]] = r / 255.0;
        }
    }

    tensor
}

/// Square face crop around a detection box, grown by `margin` of the longer side.
/// Returns the crop and its top-left corner in `image` coordinates.
pub fn crop_face_square(
    image: &DynamicImage,
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    margin: f32,
) -> (DynamicImage, (u32, u32)) {
    let (img_w, img_h) = image.dimensions();

    let side = (x2 - x1).max(y2 - y1) * (1.0 + 2.0 * margin);
    let cx = (x1 + x2) / 2.0;
    let cy = (y1 + y2) / 2.0;

    let left = (cx - side / 2.0).max(0.0) as u32;
    let top = (cy - side / 2.0).max(0.0) as u32;
    let right = ((cx + side / 2.0).min(img_w as f32) as u32).max(left + 1).min(img_w);
    let bottom = ((cy + side / 2.0).min(img_h as f32) as u32).max(top + 1).min(img_h);

    let crop = image.crop_imm(left, top, right.saturating_sub(left).max(1), bottom.saturating_sub(top).max(1));
    (crop, (left, top))
}

/// Crop a clamped region rectangle out of the original-resolution image
pub fn crop_region(image: &DynamicImage, rect: &RegionRect) -> DynamicImage {
    image.crop_imm(rect.left, rect.top, rect.width, rect.height)
}

/// Letterbox geometry for mapping detector coordinates back to the source
pub struct ResizeInfo {
    pub scale: f32,
    pub offset_x: u32,
    pub offset_y: u32,
    pub original_width: u32,
    pub original_height: u32,
}

impl ResizeInfo {
    pub fn new(original: (u32, u32), target: (u32, u32)) -> Self {
        let (orig_w, orig_h) = original;
        let (target_w, target_h) = target;

        let scale = f32::min(
            target_w as f32 / orig_w as f32,
            target_h as f32 / orig_h as f32,
        );

        let new_w = ((orig_w as f32 * scale) as u32).min(target_w);
        let new_h = ((orig_h as f32 * scale) as u32).min(target_h);

        Self {
            scale,
            offset_x: (target_w - new_w) / 2,
            offset_y: (target_h - new_h) / 2,
            original_width: orig_w,
            original_height: orig_h,
        }
    }

    /// Convert detection coordinates back to source image space
    pub fn to_original(&self, x: f32, y: f32) -> (f32, f32) {
        let x = (x - self.offset_x as f32) / self.scale;
        let y = (y - self.offset_y as f32) / self.scale;
        (x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Luma};

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = ImageBuffer::from_pixel(w, h, Luma([128u8]));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(img).write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_decode_png() {
        let image = decode_image(&png_bytes(40, 30)).unwrap();
        assert_eq!(image.dimensions(), (40, 30));
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(decode_image(&[0u8; 64]).is_err());
    }

    #[test]
    fn test_downscale_keeps_small_images() {
        let image = DynamicImage::new_rgb8(300, 200);
        let det = downscale_for_detection(&image, 512);
        assert_eq!(det.image.dimensions(), (300, 200));
        assert!((det.scale_x - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_downscale_large_images() {
        let image = DynamicImage::new_rgb8(2048, 1024);
        let det = downscale_for_detection(&image, 512);
        assert_eq!(det.image.dimensions(), (512, 256));
        assert!((det.scale_x - 4.0).abs() < 1e-9);
        assert!((det.scale_y - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_resize_info_round_trip() {
        let info = ResizeInfo::new((512, 256), DETECTOR_INPUT_SIZE);
        assert_eq!(info.offset_x, 0);
        assert_eq!(info.offset_y, 128);
        let (x, y) = info.to_original(100.0, 228.0);
        assert!((x - 100.0).abs() < 1e-4);
        assert!((y - 100.0).abs() < 1e-4);
    }

    #[test]
    fn test_detection_tensor_shape() {
        let image = DynamicImage::new_rgb8(300, 200);
        let tensor = preprocess_for_detection(&image);
        assert_eq!(tensor.shape(), &[1, 3, 512, 512]);
    }

    #[test]
    fn test_crop_face_square_stays_inside() {
        let image = DynamicImage::new_rgb8(100, 100);
        let (crop, (left, top)) = crop_face_square(&image, 70.0, 70.0, 99.0, 99.0, 0.2);
        assert!(left + crop.width() <= 100);
        assert!(top + crop.height() <= 100);
    }
}
