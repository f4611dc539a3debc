//! Parameter types for the pixel pipeline.
//!
//! These structs describe *what* to do, not *how*. The
//! [`operations`](super::operations) module builds them from
//! [`ProcessingOptions`](crate::config::ProcessingOptions) and hands them to
//! the pure functions in [`pixels`](super::pixels).
//!
//! - [`Adjustments`]: brightness/contrast/saturation multipliers, 1.0 = unchanged.
//! - [`BackgroundRemoval`]: which near-black/near-white pixels become transparent.
//! - [`TransformParams`]: everything needed to turn one source file into one output.

use crate::config::ProcessingOptions;
use std::path::PathBuf;

/// Channel values strictly below this count as black.
pub const BLACK_THRESHOLD: u8 = 10;
/// Channel values strictly above this count as white.
pub const WHITE_THRESHOLD: u8 = 245;

/// Enhancement multipliers, applied in field order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adjustments {
    pub brightness: f64,
    pub contrast: f64,
    pub saturation: f64,
}

impl Adjustments {
    pub fn is_identity(&self) -> bool {
        self.brightness == 1.0 && self.contrast == 1.0 && self.saturation == 1.0
    }
}

impl Default for Adjustments {
    fn default() -> Self {
        Self {
            brightness: 1.0,
            contrast: 1.0,
            saturation: 1.0,
        }
    }
}

/// Background masks to apply. Both may be set; the masks are unioned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackgroundRemoval {
    pub black: bool,
    pub white: bool,
}

impl BackgroundRemoval {
    pub fn is_none(&self) -> bool {
        !self.black && !self.white
    }
}

/// Everything needed to convert one file.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformParams {
    pub source: PathBuf,
    pub output: PathBuf,
    pub adjustments: Adjustments,
    pub background: BackgroundRemoval,
    pub scale_ratio: f64,
}

impl From<&ProcessingOptions> for Adjustments {
    fn from(options: &ProcessingOptions) -> Self {
        Self {
            brightness: options.brightness,
            contrast: options.contrast,
            saturation: options.saturation,
        }
    }
}

impl From<&ProcessingOptions> for BackgroundRemoval {
    fn from(options: &ProcessingOptions) -> Self {
        Self {
            black: options.remove_black,
            white: options.remove_white,
        }
    }
}
