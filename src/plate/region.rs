use image::{imageops, RgbImage};

use crate::detect::BoundingBox;

/// Pixel rectangle inside an image: `[x, x + width) × [y, y + height)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    /// Expand a center-based box by `padding` pixels on every side and clamp it
    /// to a `image_width × image_height` image.
    ///
    /// Returns `None` when the clamped rectangle has zero area.
    pub fn from_box(
        bbox: &BoundingBox,
        padding: u32,
        image_width: u32,
        image_height: u32,
    ) -> Option<Self> {
        let (x1, x2) = clamp_span(bbox.center_x, bbox.width, padding, image_width);
        let (y1, y2) = clamp_span(bbox.center_y, bbox.height, padding, image_height);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(Self {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        })
    }

    /// Copy the rectangle out of `image`. The rectangle must come from `from_box`
    /// with the same image dimensions.
    pub fn crop(&self, image: &RgbImage) -> RgbImage {
        imageops::crop_imm(image, self.x, self.y, self.width, self.height).to_image()
    }
}

/// `[start, end)` of `center ± extent/2`, padded, truncated to whole pixels, clamped to `[0, limit]`.
fn clamp_span(center: f32, extent: f32, padding: u32, limit: u32) -> (u32, u32) {
    let half = extent / 2.0;
    let padding = padding as i64;
    let limit = limit as i64;
    let start = ((center - half) as i64 - padding).clamp(0, limit);
    let end = ((center + half) as i64 + padding).clamp(0, limit);
    (start as u32, end as u32)
}
