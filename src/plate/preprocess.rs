use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbImage};
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::filter::gaussian_blur_f32;

/// Parameters of the recognition normalization chain.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormalizeSettings {
    /// Integer upscale factor. Plate characters are only a few pixels tall at source size.
    pub upscale: u32,
    /// Gaussian sigma; 0.8 matches a 3×3 kernel.
    pub blur_sigma: f32,
    /// CLAHE clip limit, relative to a uniform histogram.
    pub clahe_clip_limit: f32,
    /// CLAHE tiles per axis.
    pub clahe_tiles: u32,
}

impl Default for NormalizeSettings {
    fn default() -> Self {
        Self {
            upscale: 4,
            blur_sigma: 0.8,
            clahe_clip_limit: 3.0,
            clahe_tiles: 8,
        }
    }
}

/// Grayscale → upscale → blur → CLAHE → Otsu binarization.
///
/// The order is fixed; the output holds only 0 and 255.
pub fn normalize_for_recognition(crop: &RgbImage, settings: &NormalizeSettings) -> GrayImage {
    let gray = imageops::grayscale(crop);

    let scale = settings.upscale.max(1);
    let (width, height) = gray.dimensions();
    let upscaled = imageops::resize(
        &gray,
        width.saturating_mul(scale),
        height.saturating_mul(scale),
        FilterType::CatmullRom,
    );

    let blurred = if settings.blur_sigma > 0.0 {
        gaussian_blur_f32(&upscaled, settings.blur_sigma)
    } else {
        upscaled
    };

    let equalized = equalize_adaptive(&blurred, settings.clahe_clip_limit, settings.clahe_tiles);
    let level = otsu_level(&equalized);
    threshold(&equalized, level, ThresholdType::Binary)
}

/// Contrast-limited adaptive histogram equalization.
///
/// The image is split into `tiles × tiles` regions; each region gets a clipped
/// histogram-equalization lookup table and every pixel is mapped through a
/// bilinear blend of the four nearest tables.
pub fn equalize_adaptive(image: &GrayImage, clip_limit: f32, tiles: u32) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }
    let tiles_x = tiles.clamp(1, width) as usize;
    let tiles_y = tiles.clamp(1, height) as usize;

    let x_bounds = tile_bounds(width, tiles_x);
    let y_bounds = tile_bounds(height, tiles_y);

    let mut luts = vec![[0u8; 256]; tiles_x * tiles_y];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let (x0, x1) = x_bounds[tx];
            let (y0, y1) = y_bounds[ty];
            luts[ty * tiles_x + tx] = tile_lut(image, x0, x1, y0, y1, clip_limit);
        }
    }

    let x_centers: Vec<f32> = x_bounds.iter().map(|(a, b)| (a + b) as f32 / 2.0).collect();
    let y_centers: Vec<f32> = y_bounds.iter().map(|(a, b)| (a + b) as f32 / 2.0).collect();

    let mut out = GrayImage::new(width, height);
    for y in 0..height {
        let (ty0, ty1, wy) = neighbours(y as f32 + 0.5, &y_centers);
        for x in 0..width {
            let (tx0, tx1, wx) = neighbours(x as f32 + 0.5, &x_centers);
            let value = image.get_pixel(x, y)[0] as usize;

            let top = lerp(
                luts[ty0 * tiles_x + tx0][value],
                luts[ty0 * tiles_x + tx1][value],
                wx,
            );
            let bottom = lerp(
                luts[ty1 * tiles_x + tx0][value],
                luts[ty1 * tiles_x + tx1][value],
                wx,
            );
            let blended = top + (bottom - top) * wy;
            out.put_pixel(x, y, Luma([blended.round().clamp(0.0, 255.0) as u8]));
        }
    }
    out
}

fn tile_bounds(length: u32, tiles: usize) -> Vec<(u32, u32)> {
    (0..tiles)
        .map(|i| {
            let start = (i as u64 * length as u64 / tiles as u64) as u32;
            let end = ((i as u64 + 1) * length as u64 / tiles as u64) as u32;
            (start, end)
        })
        .collect()
}

fn tile_lut(image: &GrayImage, x0: u32, x1: u32, y0: u32, y1: u32, clip_limit: f32) -> [u8; 256] {
    let mut histogram = [0u32; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            histogram[image.get_pixel(x, y)[0] as usize] += 1;
        }
    }
    let area = (x1 - x0) as u64 * (y1 - y0) as u64;
    let mut lut = [0u8; 256];
    if area == 0 {
        for (i, entry) in lut.iter_mut().enumerate() {
            *entry = i as u8;
        }
        return lut;
    }

    if clip_limit > 0.0 {
        let limit = ((clip_limit * area as f32 / 256.0) as u32).max(1);
        let mut excess = 0u32;
        for bin in histogram.iter_mut() {
            if *bin > limit {
                excess += *bin - limit;
                *bin = limit;
            }
        }
        let share = excess / 256;
        for bin in histogram.iter_mut() {
            *bin += share;
        }
        let residual = (excess % 256) as usize;
        if residual > 0 {
            let step = (256 / residual).max(1);
            for bin in histogram.iter_mut().step_by(step).take(residual) {
                *bin += 1;
            }
        }
    }

    let total: u64 = histogram.iter().map(|&bin| bin as u64).sum();
    let mut cumulative = 0u64;
    for (i, bin) in histogram.iter().enumerate() {
        cumulative += *bin as u64;
        lut[i] = ((cumulative * 255) / total.max(1)).min(255) as u8;
    }
    lut
}

/// Neighbouring tile indices around `pos` and the weight of the second one.
fn neighbours(pos: f32, centers: &[f32]) -> (usize, usize, f32) {
    let last = centers.len() - 1;
    if pos <= centers[0] {
        return (0, 0, 0.0);
    }
    if pos >= centers[last] {
        return (last, last, 0.0);
    }
    let hi = centers.iter().position(|&c| c > pos).unwrap_or(last);
    let lo = hi - 1;
    let span = centers[hi] - centers[lo];
    let weight = if span > 0.0 {
        (pos - centers[lo]) / span
    } else {
        0.0
    };
    (lo, hi, weight)
}

fn lerp(a: u8, b: u8, weight: f32) -> f32 {
    a as f32 + (b as f32 - a as f32) * weight
}
