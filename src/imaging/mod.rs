//! Image conversion: pure Rust, built on the `image` crate.
//!
//! | Step | Crate / function |
//! |---|---|
//! | **Decode** | `ImageReader` → `to_rgba8` |
//! | **Enhance** | brightness / contrast / saturation blends ([`pixels`]) |
//! | **Background** | near-black / near-white alpha mask |
//! | **Resize** | `imageops::resize` with `Lanczos3` |
//! | **Encode** | format from the output extension; JPEG drops alpha |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for output sizes and names (unit testable)
//! - **Parameters**: Data structures describing one conversion
//! - **Pixels**: Pure buffer operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: [`ImageTransformEngine`], combining all of the above

pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub mod pixels;
pub mod rust_backend;

pub use backend::{ImageBackend, ImagingError};
pub use calculations::{format_scale, normalize_extension, output_file_name, scaled_dimensions};
pub use operations::{ImageTransformEngine, display_name, plan_transform, transform_image};
pub use params::{Adjustments, BackgroundRemoval, TransformParams};
pub use rust_backend::RustBackend;
