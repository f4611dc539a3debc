//! # TifTiff
//!
//! Batch raster conversion with optional GeoTIFF reprojection. A list of
//! scans, photos or GeoTIFFs goes in; adjusted, resized, re-encoded files come
//! out, and GeoTIFF inputs can keep their georeferencing in a new CRS.
//!
//! # Architecture
//!
//! ```text
//! files ──▶ BatchOrchestrator ──▶ ImageTransformEngine ──▶ out/*.png
//!                  │                       │
//!                  │                       ▼ (TIFF + geo enabled)
//!                  │               GeoTransformEngine ──▶ out/*.tif (or .png/.jpg + sidecars)
//!                  ▼
//!             AsyncLogger ──▶ log file / console / listeners
//! ```
//!
//! Settings live in a [`config::ConfigStore`] backed by a JSON file and cached
//! through a [`cache::CacheManager`]. Neither is global: the binary builds one
//! of each at startup and passes them where they are needed, so tests can
//! construct isolated instances in a temporary directory.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`process`] | Batch runs: worker pool, per-file outcomes, progress events |
//! | [`imaging`] | Pixel pipeline: adjustments, background removal, resize, encode |
//! | [`geo`] | CRS table, GeoTIFF read/write, default transform, nearest-neighbour warp |
//! | [`metadata`] | Per-file metadata records and CSV/JSON export |
//! | [`config`] | Persistent settings store and validated run options |
//! | [`cache`] | Content-addressed JSON cache with background cleanup |
//! | [`logger`] | Queued log stream and `tracing` setup |
//! | [`scan`] | Input directory discovery |
//! | [`types`] | Per-file outcomes shared by the batch stages |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Pure-Rust Raster Stack
//!
//! Decoding and encoding use the `image` crate, GeoTIFF tags are read and
//! written with `tiff`, GDAL's metadata XML goes through `quick_xml`, and
//! coordinate transforms use `proj4rs`. There is no GDAL or PROJ system
//! dependency, which keeps the binary self-contained at the cost of a smaller
//! driver and CRS table: GeoTIFF, PNG and JPEG are writable (the latter two
//! with world-file and `.aux.xml` sidecars) and only the CRSs in [`geo::crs`]
//! are understood.
//!
//! ## Failures Are Per File
//!
//! Nothing inside a batch aborts the batch. Each input ends as a
//! [`types::FileOutcome`]; a skipped file leaves exactly one error entry in the
//! log naming it. Functions come in pairs: `try_*` returns the typed error,
//! the plain variant logs it and returns `Option`/`bool`.
//!
//! ## Nearest-Neighbour Resampling
//!
//! Reprojection never blends pixel values, so categorical rasters (land cover,
//! masks) keep their classes and every output sample exists in the source.

pub mod cache;
pub mod config;
pub mod geo;
pub mod imaging;
pub mod logger;
pub mod metadata;
pub mod output;
pub mod process;
pub mod scan;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
