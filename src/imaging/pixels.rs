//! Pixel operations on RGBA working buffers.
//!
//! Enhancements interpolate each color channel between a "degenerate" value
//! and the original:
//!
//! ```text
//! out = degenerate + factor * (in - degenerate)      clipped to 0..=255
//!
//! brightness   degenerate = 0
//! contrast     degenerate = mean luma of the whole image (rounded)
//! saturation   degenerate = luma of the pixel itself
//! ```
//!
//! Alpha is never touched by enhancements. A factor of exactly 1.0 skips the
//! pass entirely so the identity case stays byte-identical.

use super::calculations::scaled_dimensions;
use super::params::{Adjustments, BLACK_THRESHOLD, BackgroundRemoval, WHITE_THRESHOLD};
use image::RgbaImage;
use image::imageops::{self, FilterType};

/// ITU-R 601 luma in 16-bit fixed point, matching common 8-bit `L` conversion.
#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * 19595 + g as u32 * 38470 + b as u32 * 7471 + 0x8000) >> 16) as u8
}

#[inline]
fn blend(degenerate: f64, value: u8, factor: f64) -> u8 {
    let v = degenerate + factor * (value as f64 - degenerate);
    v.clamp(0.0, 255.0) as u8
}

/// Rounded mean luma over every pixel.
fn mean_luma(img: &RgbaImage) -> f64 {
    let count = img.width() as u64 * img.height() as u64;
    if count == 0 {
        return 0.0;
    }
    let sum: u64 = img
        .pixels()
        .map(|p| luma(p[0], p[1], p[2]) as u64)
        .sum();
    (sum as f64 / count as f64 + 0.5).floor()
}

pub fn adjust_brightness(img: &mut RgbaImage, factor: f64) {
    for p in img.pixels_mut() {
        for c in 0..3 {
            p[c] = blend(0.0, p[c], factor);
        }
    }
}

pub fn adjust_contrast(img: &mut RgbaImage, factor: f64) {
    let mean = mean_luma(img);
    for p in img.pixels_mut() {
        for c in 0..3 {
            p[c] = blend(mean, p[c], factor);
        }
    }
}

pub fn adjust_saturation(img: &mut RgbaImage, factor: f64) {
    for p in img.pixels_mut() {
        let gray = luma(p[0], p[1], p[2]) as f64;
        for c in 0..3 {
            p[c] = blend(gray, p[c], factor);
        }
    }
}

/// Brightness, then contrast, then saturation; each skipped at exactly 1.0.
pub fn apply_adjustments(img: &mut RgbaImage, adj: &Adjustments) {
    if adj.is_identity() {
        return;
    }
    if adj.brightness != 1.0 {
        adjust_brightness(img, adj.brightness);
    }
    if adj.contrast != 1.0 {
        adjust_contrast(img, adj.contrast);
    }
    if adj.saturation != 1.0 {
        adjust_saturation(img, adj.saturation);
    }
}

/// Make near-black and/or near-white pixels fully transparent.
///
/// A pixel matches when all three color channels are past the threshold.
pub fn remove_background(img: &mut RgbaImage, removal: BackgroundRemoval) {
    if removal.is_none() {
        return;
    }
    for p in img.pixels_mut() {
        let [r, g, b, _] = p.0;
        let black = removal.black && r < BLACK_THRESHOLD && g < BLACK_THRESHOLD && b < BLACK_THRESHOLD;
        let white = removal.white && r > WHITE_THRESHOLD && g > WHITE_THRESHOLD && b > WHITE_THRESHOLD;
        if black || white {
            p[3] = 0;
        }
    }
}

/// Lanczos3 resize by `scale`; `None` when `scale` is exactly 1.0.
pub fn resize(img: &RgbaImage, scale: f64) -> Option<RgbaImage> {
    if scale == 1.0 {
        return None;
    }
    let (w, h) = scaled_dimensions(img.dimensions(), scale);
    Some(imageops::resize(img, w, h, FilterType::Lanczos3))
}
