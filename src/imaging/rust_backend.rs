//! Pure Rust codec backend built on the `image` crate.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP, BMP) | `ImageReader` with content sniffing |
//! | Normalize | `DynamicImage::to_rgba8` |
//! | Encode | `RgbaImage::save_with_format`, format from extension |
//! | JPEG | alpha dropped via `to_rgb8` before encoding |

use super::backend::{ImageBackend, ImagingError};
use image::{DynamicImage, ImageFormat, ImageReader, RgbaImage};
use std::path::Path;

/// Backend using the `image` crate decoders and encoders.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Output format for a path, by extension.
fn output_format(path: &Path) -> Result<ImageFormat, ImagingError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    match ext.as_str() {
        "png" => Ok(ImageFormat::Png),
        "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
        "bmp" => Ok(ImageFormat::Bmp),
        "tif" | "tiff" => Ok(ImageFormat::Tiff),
        "webp" => Ok(ImageFormat::WebP),
        other => Err(ImagingError::UnsupportedFormat(other.to_string())),
    }
}

impl ImageBackend for RustBackend {
    fn load(&self, path: &Path) -> Result<RgbaImage, ImagingError> {
        let img = ImageReader::open(path)?.with_guessed_format()?.decode()?;
        Ok(img.to_rgba8())
    }

    fn save(&self, image: &RgbaImage, path: &Path) -> Result<(), ImagingError> {
        let format = output_format(path)?;
        if format == ImageFormat::Jpeg {
            let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            rgb.save_with_format(path, format)?;
        } else {
            image.save_with_format(path, format)?;
        }
        Ok(())
    }
}
