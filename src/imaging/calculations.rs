//! Pure calculation functions for output sizes and names.
//!
//! All functions here are pure and testable without any I/O or images.

use std::path::Path;

/// Dimensions after scaling by `scale`, floored, never below 1.
///
/// # Examples
/// ```
/// # use tiftiff::imaging::scaled_dimensions;
/// assert_eq!(scaled_dimensions((200, 150), 0.5), (100, 75));
/// assert_eq!(scaled_dimensions((3, 3), 0.5), (1, 1));
/// ```
pub fn scaled_dimensions(dims: (u32, u32), scale: f64) -> (u32, u32) {
    let (w, h) = dims;
    let scale_one = |v: u32| ((v as f64 * scale).floor() as u32).max(1);
    (scale_one(w), scale_one(h))
}

/// Render a scale factor the way it appears in output names.
///
/// Whole numbers keep one decimal (`2.0`), others use the shortest exact
/// representation (`0.5`, `1.25`).
pub fn format_scale(scale: f64) -> String {
    if scale.fract() == 0.0 && scale.abs() < 1e15 {
        format!("{scale:.1}")
    } else {
        format!("{scale}")
    }
}

/// Lower-case extension with a leading dot: `"PNG"` → `".png"`.
///
/// Empty input falls back to `".png"`.
pub fn normalize_extension(format: &str) -> String {
    let trimmed = format.trim().trim_start_matches('.');
    if trimmed.is_empty() {
        return ".png".to_string();
    }
    format!(".{}", trimmed.to_lowercase())
}

/// Output file name for `source`: `{scale}x-{stem}{ext}`, or `{stem}{ext}`
/// when `scale` is exactly 1.0.
pub fn output_file_name(source: &Path, extension: &str, scale: f64) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = normalize_extension(extension);
    if scale == 1.0 {
        format!("{stem}{ext}")
    } else {
        format!("{}x-{stem}{ext}", format_scale(scale))
    }
}
