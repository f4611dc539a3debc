//! High-level image operations.
//!
//! [`ImageTransformEngine`] combines the naming calculations, the pixel
//! functions, and a codec backend into the per-file conversion:
//!
//! ```text
//! load (RGBA) → brightness → contrast → saturation → background mask → resize → save
//! ```

use super::backend::{ImageBackend, ImagingError};
use super::calculations::output_file_name;
use super::params::{Adjustments, BackgroundRemoval, TransformParams};
use super::pixels::{apply_adjustments, remove_background, resize};
use super::rust_backend::RustBackend;
use crate::config::ProcessingOptions;
use crate::logger::AsyncLogger;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, ImagingError>;

/// Build the parameters for converting `source` into `output_dir`.
pub fn plan_transform(source: &Path, output_dir: &Path, options: &ProcessingOptions) -> TransformParams {
    let name = output_file_name(source, &options.output_format, options.scale_ratio);
    TransformParams {
        source: source.to_path_buf(),
        output: output_dir.join(name),
        adjustments: Adjustments::from(options),
        background: BackgroundRemoval::from(options),
        scale_ratio: options.scale_ratio,
    }
}

/// Run one conversion with the given backend. Returns the output dimensions.
pub fn transform_image(backend: &impl ImageBackend, params: &TransformParams) -> Result<(u32, u32)> {
    let mut img = backend.load(&params.source)?;
    apply_adjustments(&mut img, &params.adjustments);
    remove_background(&mut img, params.background);
    let img = resize(&img, params.scale_ratio).unwrap_or(img);
    backend.save(&img, &params.output)?;
    Ok(img.dimensions())
}

/// Per-file pixel conversion.
pub struct ImageTransformEngine<B: ImageBackend = RustBackend> {
    backend: B,
    logger: Arc<AsyncLogger>,
}

impl ImageTransformEngine<RustBackend> {
    pub fn new(logger: Arc<AsyncLogger>) -> Self {
        Self::with_backend(RustBackend::new(), logger)
    }
}

impl<B: ImageBackend> ImageTransformEngine<B> {
    pub fn with_backend(backend: B, logger: Arc<AsyncLogger>) -> Self {
        Self { backend, logger }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Convert `path` into `output_dir`, returning the written path.
    pub fn try_process(&self, path: &Path, output_dir: &Path, options: &ProcessingOptions) -> Result<PathBuf> {
        let params = plan_transform(path, output_dir, options);
        let (w, h) = transform_image(&self.backend, &params)?;
        tracing::debug!("wrote {} ({w}x{h})", params.output.display());
        Ok(params.output)
    }

    /// Like [`try_process`](Self::try_process), but failures are logged with the
    /// file name and reported as `None`.
    pub fn process(&self, path: &Path, output_dir: &Path, options: &ProcessingOptions) -> Option<PathBuf> {
        match self.try_process(path, output_dir, options) {
            Ok(output) => Some(output),
            Err(e) => {
                self.logger
                    .error(format!("Processing error {} - {e}", display_name(path)));
                None
            }
        }
    }
}

/// Base name of a path for log messages.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
