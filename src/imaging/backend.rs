//! Image codec backend trait and shared error type.
//!
//! The [`ImageBackend`] trait covers the two codec operations the pixel
//! pipeline needs: decode a file into an RGBA working buffer, and encode a
//! buffer to a path whose extension selects the format.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend). Tests use the
//! [`MockBackend`](tests::MockBackend) below, which serves images from memory.

use image::RgbaImage;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImagingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image codec error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),
}

/// Trait for image codec backends.
///
/// Every decoded image is normalized to 8-bit RGBA regardless of the source
/// channel layout, so background removal and alpha handling work the same for
/// grayscale, RGB, and RGBA inputs.
pub trait ImageBackend: Sync {
    /// Decode an image file into an RGBA buffer.
    fn load(&self, path: &Path) -> Result<RgbaImage, ImagingError>;

    /// Encode `image` to `path`; the extension picks the format.
    fn save(&self, image: &RgbaImage, path: &Path) -> Result<(), ImagingError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Mock backend that serves images from memory and records operations.
    /// Uses Mutex (not RefCell) so it is Sync and works with rayon's par_iter.
    #[derive(Default)]
    pub struct MockBackend {
        pub sources: Mutex<HashMap<PathBuf, RgbaImage>>,
        pub saved: Mutex<HashMap<PathBuf, RgbaImage>>,
        pub operations: Mutex<Vec<RecordedOp>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Load(String),
        Save {
            output: String,
            width: u32,
            height: u32,
        },
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        /// Register an in-memory image under `path`.
        pub fn with_image(self, path: impl Into<PathBuf>, image: RgbaImage) -> Self {
            self.sources.lock().unwrap().insert(path.into(), image);
            self
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }

        pub fn saved_image(&self, path: &Path) -> Option<RgbaImage> {
            self.saved.lock().unwrap().get(path).cloned()
        }
    }

    impl ImageBackend for MockBackend {
        fn load(&self, path: &Path) -> Result<RgbaImage, ImagingError> {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::Load(path.to_string_lossy().to_string()));

            let from_sources = self.sources.lock().unwrap().get(path).cloned();
            from_sources
                .or_else(|| self.saved.lock().unwrap().get(path).cloned())
                .ok_or_else(|| {
                    ImagingError::Io(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("no mock image at {}", path.display()),
                    ))
                })
        }

        fn save(&self, image: &RgbaImage, path: &Path) -> Result<(), ImagingError> {
            self.operations.lock().unwrap().push(RecordedOp::Save {
                output: path.to_string_lossy().to_string(),
                width: image.width(),
                height: image.height(),
            });
            self.saved
                .lock()
                .unwrap()
                .insert(path.to_path_buf(), image.clone());
            Ok(())
        }
    }
}
