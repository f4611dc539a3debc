//! Input discovery.
//!
//! Batch commands accept files, directories, or a mix. A directory contributes
//! the raster files directly inside it; subdirectories are not entered.
//!
//! ```text
//! scans/
//! ├── dawn.TIF        ✓  (extension match is case-insensitive)
//! ├── dusk.png        ✓
//! ├── notes.txt       ✗
//! └── 2024/           ✗  (not recursed)
//!     └── old.tif
//! ```
//!
//! Directory results are sorted by path so runs are reproducible.

use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Input not found: {0}")]
    NotFound(PathBuf),
}

/// Extensions picked up from input directories.
pub const RASTER_EXTENSIONS: &[&str] = &["tif", "tiff", "png", "jpg", "jpeg", "bmp"];

pub fn is_raster(path: &Path) -> bool {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    RASTER_EXTENSIONS.contains(&ext.as_str())
}

/// TIFF files are the only ones that can carry georeferencing.
pub fn is_tiff_path(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"))
        .unwrap_or(false)
}

/// Raster files directly inside `dir`, sorted by path.
pub fn scan_directory(dir: &Path) -> Result<Vec<PathBuf>, ScanError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        if entry.file_type().is_file() && is_raster(entry.path()) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Expand a list of inputs: directories are scanned, files are kept as given
/// (whatever their extension) in argument order.
///
/// Missing files are kept too; they become per-file failures in the batch
/// rather than aborting it. A missing directory is not distinguishable from a
/// missing file and is kept the same way.
pub fn collect_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, ScanError> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            files.extend(scan_directory(input)?);
        } else {
            files.push(input.clone());
        }
    }
    Ok(files)
}
