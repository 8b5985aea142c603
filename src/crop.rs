//! Portrait cropping.
//!
//! Given a card image and a normalized [`BoundingBox`], produce a JPEG of the
//! boxed region grown by a symmetric margin. The margin is
//! `margin_ratio * max(box_width_px, box_height_px)` on every side, and the
//! grown region is intersected with the image bounds, so a box near an edge
//! yields a smaller crop instead of wrapping or failing.

use image::codecs::jpeg::JpegEncoder;
use image::GenericImageView;

use crate::config::CropConfig;
use crate::error::CropError;
use crate::models::BoundingBox;

/// Pixel rectangle inside the source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Compute the padded, clamped crop rectangle for `bbox` on an image of
/// `img_width` × `img_height` pixels.
///
/// Returns `None` when the clamped region has no area.
pub fn crop_region(
    img_width: u32,
    img_height: u32,
    bbox: &BoundingBox,
    margin_ratio: f64,
) -> Option<CropRect> {
    let w = f64::from(img_width);
    let h = f64::from(img_height);

    let box_x = w * bbox.x;
    let box_y = h * bbox.y;
    let box_w = w * bbox.width;
    let box_h = h * bbox.height;
    let margin = box_w.max(box_h) * margin_ratio;

    let left = (box_x - margin).max(0.0).round();
    let top = (box_y - margin).max(0.0).round();
    let right = (box_x + box_w + margin).min(w).round();
    let bottom = (box_y + box_h + margin).min(h).round();

    if !(right > left && bottom > top) {
        return None;
    }

    Some(CropRect {
        x: left as u32,
        y: top as u32,
        width: (right - left) as u32,
        height: (bottom - top) as u32,
    })
}

/// Crops card images around a detected portrait.
#[derive(Debug, Clone)]
pub struct Cropper {
    margin_ratio: f64,
    jpeg_quality: u8,
}

impl Default for Cropper {
    fn default() -> Self {
        Self::new(&CropConfig::default())
    }
}

impl Cropper {
    pub fn new(config: &CropConfig) -> Self {
        Self {
            margin_ratio: config.margin_ratio,
            jpeg_quality: config.jpeg_quality,
        }
    }

    /// Decode `image_bytes`, crop around `bbox`, and re-encode as JPEG.
    pub fn crop_to_box(&self, image_bytes: &[u8], bbox: &BoundingBox) -> Result<Vec<u8>, CropError> {
        let _span = tracing::debug_span!("crop.portrait").entered();

        let img = image::load_from_memory(image_bytes)
            .map_err(|e| CropError::Render(format!("Failed to load image for cropping: {}", e)))?;
        let (width, height) = img.dimensions();

        let rect = crop_region(width, height, bbox, self.margin_ratio).ok_or_else(|| {
            CropError::Render(format!(
                "bounding box {:?} has no area on a {}x{} image",
                bbox, width, height
            ))
        })?;

        let cropped = img.crop_imm(rect.x, rect.y, rect.width, rect.height).to_rgb8();

        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, self.jpeg_quality)
            .encode_image(&cropped)
            .map_err(|e| CropError::Render(format!("Failed to encode cropped image: {}", e)))?;

        tracing::debug!(
            source_width = width,
            source_height = height,
            x = rect.x,
            y = rect.y,
            width = rect.width,
            height = rect.height,
            "cropped portrait"
        );
        Ok(out)
    }
}
