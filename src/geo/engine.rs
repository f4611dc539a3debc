//! [`GeoTransformEngine`]: CRS detection, destination grids, reprojection and
//! georeferenced saves.
//!
//! All reprojection goes through one routine with six steps:
//!
//! ```text
//! 1. open        read the source raster (all bands, native dtype)
//! 2. resolve CRS explicit override, else the file's own CRS
//! 3. transform   default destination grid in the target CRS
//! 4. allocate    zeroed destination buffer, same dtype
//! 5. resample    nearest neighbour, band by band
//! 6. write       GeoTIFF tags, or PNG/JPEG plus world file and .aux.xml
//! ```
//!
//! With [`Verbosity::Steps`] each step is logged as it completes.

use super::GeoError;
use super::affine::Affine;
use super::crs::{CoordTransformer, format_epsg, parse_epsg};
use super::driver::Driver;
use super::raster::{Raster, Samples, is_tiff, read_info, read_raster, write_raster};
use super::warp::{Grid, Verbosity, default_transform, nearest_index_map};
use super::worldfile;
use crate::imaging::{display_name, scaled_dimensions};
use crate::logger::AsyncLogger;
use crate::types::FileOutcome;
use image::RgbaImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub type Result<T> = std::result::Result<T, GeoError>;

/// A raster grid in a named CRS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Georef {
    pub crs: String,
    pub transform: Affine,
    pub width: u32,
    pub height: u32,
}

impl Georef {
    pub fn grid(&self) -> Grid {
        Grid::new(self.transform, self.width, self.height)
    }
}

/// Destination grid for georeferencing one file, plus the source grid it was
/// computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoMetadata {
    /// Target CRS.
    pub crs: String,
    pub transform: Affine,
    pub width: u32,
    pub height: u32,
    pub count: usize,
    pub dtype: String,
    pub source: Georef,
}

impl GeoMetadata {
    pub fn grid(&self) -> Grid {
        Grid::new(self.transform, self.width, self.height)
    }
}

/// Rescale metadata for an image whose pixel dimensions were multiplied by
/// `scale`.
///
/// Width and height are floored (minimum 1) and the pixel-size terms `a` and
/// `e` are divided by `scale`. Rotation terms and the origin are kept, which is
/// only exact for north-up rasters. The source grid is rescaled the same way.
pub fn update_geo_metadata_scale(metadata: GeoMetadata, scale: f64) -> GeoMetadata {
    if scale == 1.0 {
        return metadata;
    }
    let (width, height) = scaled_dimensions((metadata.width, metadata.height), scale);
    let (src_width, src_height) =
        scaled_dimensions((metadata.source.width, metadata.source.height), scale);
    GeoMetadata {
        transform: metadata.transform.scaled(scale),
        width,
        height,
        source: Georef {
            transform: metadata.source.transform.scaled(scale),
            width: src_width,
            height: src_height,
            ..metadata.source
        },
        ..metadata
    }
}

/// Per-call settings for [`GeoTransformEngine::reproject_raster`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReprojectOptions {
    /// Overrides the CRS embedded in the source file.
    pub source_crs: Option<String>,
    /// Overrides the engine's verbosity for this call.
    pub verbosity: Option<Verbosity>,
}

pub struct GeoTransformEngine {
    logger: Arc<AsyncLogger>,
    verbosity: Verbosity,
}

impl GeoTransformEngine {
    pub fn new(logger: Arc<AsyncLogger>) -> Self {
        Self {
            logger,
            verbosity: Verbosity::Quiet,
        }
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    fn step(&self, verbosity: Verbosity, n: u8, message: impl AsRef<str>) {
        if verbosity == Verbosity::Steps {
            self.logger.info(format!("[step {n}/6] {}", message.as_ref()));
        }
    }

    // ------------------------------------------------------------------------
    // CRS detection
    // ------------------------------------------------------------------------

    /// The CRS embedded in `path`, or recorded in the `.aux.xml` sidecar of
    /// a PNG or JPEG. Other files have none.
    pub fn try_detect_crs(&self, path: &Path) -> Result<Option<String>> {
        if !is_tiff(path)? && !worldfile::has_sidecar(path) {
            return Ok(None);
        }
        Ok(read_info(path)?.crs)
    }

    /// Like [`try_detect_crs`](Self::try_detect_crs); read errors are logged
    /// and reported as `None`.
    pub fn detect_crs(&self, path: &Path) -> Option<String> {
        match self.try_detect_crs(path) {
            Ok(crs) => crs,
            Err(e) => {
                self.logger
                    .error(format!("CRS detection error {} - {e}", display_name(path)));
                None
            }
        }
    }

    // ------------------------------------------------------------------------
    // Destination metadata
    // ------------------------------------------------------------------------

    pub fn try_extract_geo_metadata(
        &self,
        path: &Path,
        dst_crs: &str,
        source_crs: Option<&str>,
    ) -> Result<GeoMetadata> {
        let info = read_info(path)?;
        let src_crs = resolve_source_crs(source_crs, info.crs.as_deref(), path)?;
        let transformer = CoordTransformer::from_identifiers(&src_crs, dst_crs)?;
        let source = Grid::new(info.transform, info.width, info.height);
        let grid = default_transform(&transformer, &source)?;

        Ok(GeoMetadata {
            crs: format_epsg(parse_epsg(dst_crs)?),
            transform: grid.transform,
            width: grid.width,
            height: grid.height,
            count: info.bands,
            dtype: info.dtype,
            source: Georef {
                crs: src_crs,
                transform: info.transform,
                width: info.width,
                height: info.height,
            },
        })
    }

    /// Destination grid for reprojecting `path` into `dst_crs`, or `None`
    /// (logged) when the source CRS is unknown or the file cannot be read.
    pub fn extract_geo_metadata(
        &self,
        path: &Path,
        dst_crs: &str,
        source_crs: Option<&str>,
    ) -> Option<GeoMetadata> {
        match self.try_extract_geo_metadata(path, dst_crs, source_crs) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                self.log_geo_error(path, "Geo metadata error", &e);
                None
            }
        }
    }

    pub fn update_geo_metadata_scale(&self, metadata: GeoMetadata, scale: f64) -> GeoMetadata {
        update_geo_metadata_scale(metadata, scale)
    }

    // ------------------------------------------------------------------------
    // Reprojection
    // ------------------------------------------------------------------------

    /// Nearest-neighbour resample of `raster` (in `src_crs`) into `dst_crs`.
    /// `target` fixes the destination grid; otherwise the default grid is used.
    fn resample(
        &self,
        raster: &Raster,
        src_crs: &str,
        dst_crs: &str,
        target: Option<Grid>,
        verbosity: Verbosity,
    ) -> Result<Raster> {
        let forward = CoordTransformer::from_identifiers(src_crs, dst_crs)?;
        let source = Grid::new(raster.transform, raster.width, raster.height);
        let destination = match target {
            Some(grid) => grid,
            None => default_transform(&forward, &source)?,
        };
        self.step(
            verbosity,
            3,
            format!(
                "Computed transform: {}x{} at {:.6} per pixel",
                destination.width,
                destination.height,
                destination.transform.a.abs()
            ),
        );

        let bands = raster.bands;
        let mut samples = raster
            .samples
            .zeroed_like(destination.pixel_count() * bands);
        self.step(
            verbosity,
            4,
            format!("Allocated {} {} samples", samples.len(), samples.dtype()),
        );

        let map = nearest_index_map(&forward.inverse()?, &source, &destination)?;
        for band in 0..bands {
            raster.samples.remap_band_into(&mut samples, &map, bands, band)?;
            self.step(verbosity, 5, format!("Resampled band {}/{bands}", band + 1));
        }

        Ok(Raster {
            width: destination.width,
            height: destination.height,
            bands,
            samples,
            crs: Some(format_epsg(parse_epsg(dst_crs)?)),
            transform: destination.transform,
            metadata: raster.metadata.clone(),
            band_metadata: raster.band_metadata.clone(),
        })
    }

    pub fn try_reproject_raster(
        &self,
        src_path: &Path,
        dst_path: &Path,
        dst_crs: &str,
        options: Option<&ReprojectOptions>,
    ) -> Result<PathBuf> {
        self.reproject(src_path, dst_path, dst_crs, options)
            .map(|(path, _)| path)
    }

    /// Returns the written path and the source CRS that was used.
    fn reproject(
        &self,
        src_path: &Path,
        dst_path: &Path,
        dst_crs: &str,
        options: Option<&ReprojectOptions>,
    ) -> Result<(PathBuf, String)> {
        let verbosity = options
            .and_then(|o| o.verbosity)
            .unwrap_or(self.verbosity);
        let name = display_name(src_path);

        let raster = read_raster(src_path)?;
        self.step(
            verbosity,
            1,
            format!(
                "Opened {name}: {}x{}, {} band(s), {}",
                raster.width,
                raster.height,
                raster.bands,
                raster.dtype()
            ),
        );

        let override_crs = options.and_then(|o| o.source_crs.as_deref());
        let src_crs = resolve_source_crs(override_crs, raster.crs.as_deref(), src_path)?;
        self.step(verbosity, 2, format!("Source CRS {src_crs}, target {dst_crs}"));

        let driver = Driver::from_path(dst_path);
        if !driver.can_write() {
            return Err(GeoError::UnsupportedDriver(driver));
        }

        let reprojected = self.resample(&raster, &src_crs, dst_crs, None, verbosity)?;

        if let Some(parent) = dst_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        write_raster(dst_path, &reprojected)?;
        self.step(
            verbosity,
            6,
            format!("Wrote {} ({driver})", display_name(dst_path)),
        );
        Ok((dst_path.to_path_buf(), src_crs))
    }

    /// Reproject `src_path` into `dst_crs`, writing `dst_path`.
    ///
    /// A missing source CRS is a warning and creates no output. Read, write and
    /// CRS errors are logged with the file name; anything else is logged
    /// generically. All failures return `None`.
    pub fn reproject_raster(
        &self,
        src_path: &Path,
        dst_path: &Path,
        dst_crs: &str,
        options: Option<&ReprojectOptions>,
    ) -> Option<PathBuf> {
        match self.reproject(src_path, dst_path, dst_crs, options) {
            Ok((path, src_crs)) => {
                self.logger.success(format!(
                    "Reprojected {src_crs} → {dst_crs} for {}",
                    display_name(src_path)
                ));
                Some(path)
            }
            Err(e) => {
                self.log_geo_error(src_path, "Reprojection error", &e);
                None
            }
        }
    }

    /// Reproject every file into `output_dir/<basename>` in parallel.
    pub fn batch_reproject(&self, files: &[PathBuf], output_dir: &Path, dst_crs: &str) -> Vec<FileOutcome> {
        files
            .par_iter()
            .map(|source| {
                let Some(name) = source.file_name() else {
                    return FileOutcome::Skipped {
                        source: source.clone(),
                        reason: "path has no file name".to_string(),
                    };
                };
                let dst = output_dir.join(name);
                match self.try_reproject_raster(source, &dst, dst_crs, None) {
                    Ok(output) => FileOutcome::Produced {
                        source: source.clone(),
                        output,
                    },
                    Err(e) => {
                        self.log_geo_error(source, "Reprojection error", &e);
                        FileOutcome::Skipped {
                            source: source.clone(),
                            reason: e.to_string(),
                        }
                    }
                }
            })
            .collect()
    }

    // ------------------------------------------------------------------------
    // Georeferenced save
    // ------------------------------------------------------------------------

    /// Resample a pixel image laid out on `metadata.source` onto the target
    /// grid described by `metadata`.
    pub fn try_georeference(&self, image: &RgbaImage, metadata: &GeoMetadata) -> Result<RgbaImage> {
        check_dimensions(image, metadata.source.width, metadata.source.height)?;
        let raster = Raster {
            width: image.width(),
            height: image.height(),
            bands: 4,
            samples: Samples::U8(image.as_raw().clone()),
            crs: Some(metadata.source.crs.clone()),
            transform: metadata.source.transform,
            metadata: BTreeMap::new(),
            band_metadata: BTreeMap::new(),
        };
        let warped = self.resample(
            &raster,
            &metadata.source.crs,
            &metadata.crs,
            Some(metadata.grid()),
            Verbosity::Quiet,
        )?;
        let Samples::U8(data) = warped.samples else {
            return Err(GeoError::InvalidRaster("expected 8-bit samples".to_string()));
        };
        RgbaImage::from_raw(warped.width, warped.height, data)
            .ok_or_else(|| GeoError::InvalidRaster("resampled buffer has the wrong size".to_string()))
    }

    /// Write `image` as a 4-band raster carrying `metadata`'s CRS and
    /// transform (3 bands for JPEG). The image must already be on the
    /// metadata grid.
    pub fn try_save_with_geospatial(
        &self,
        image: &RgbaImage,
        output_path: &Path,
        metadata: &GeoMetadata,
    ) -> Result<()> {
        let driver = Driver::from_path(output_path);
        if !driver.can_write() {
            return Err(GeoError::UnsupportedDriver(driver));
        }
        check_dimensions(image, metadata.width, metadata.height)?;

        let raster = Raster {
            width: image.width(),
            height: image.height(),
            bands: 4,
            samples: Samples::U8(image.as_raw().clone()),
            crs: Some(metadata.crs.clone()),
            transform: metadata.transform,
            metadata: BTreeMap::new(),
            band_metadata: BTreeMap::new(),
        };
        if let Some(parent) = output_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        write_raster(output_path, &raster).map(|_| ())
    }

    /// Like [`try_save_with_geospatial`](Self::try_save_with_geospatial);
    /// failures are logged and reported as `false`. A failed write may leave
    /// a partial file behind.
    pub fn save_with_geospatial(&self, image: &RgbaImage, output_path: &Path, metadata: &GeoMetadata) -> bool {
        match self.try_save_with_geospatial(image, output_path, metadata) {
            Ok(()) => {
                self.logger.success(format!(
                    "Saved with CRS {}: {}",
                    metadata.crs,
                    display_name(output_path)
                ));
                true
            }
            Err(e) => {
                self.logger.error(format!(
                    "Geo save error {} - {e}",
                    display_name(output_path)
                ));
                false
            }
        }
    }

    /// One log entry for a failed geo operation, classified by error kind.
    pub(crate) fn log_geo_error(&self, path: &Path, context: &str, error: &GeoError) {
        let name = display_name(path);
        match error {
            GeoError::MissingCrs(_) => {
                self.logger
                    .warning(format!("No CRS found for {name}, skipping reprojection"));
            }
            e if e.is_io_or_crs() => {
                self.logger.error(format!("{context} {name} - {e}"));
            }
            e => {
                self.logger.error(format!("Unknown error {name} - {e}"));
            }
        }
    }
}

fn resolve_source_crs(explicit: Option<&str>, embedded: Option<&str>, path: &Path) -> Result<String> {
    explicit
        .or(embedded)
        .map(str::to_string)
        .ok_or_else(|| GeoError::MissingCrs(display_name(path)))
}

fn check_dimensions(image: &RgbaImage, width: u32, height: u32) -> Result<()> {
    if image.dimensions() != (width, height) {
        return Err(GeoError::DimensionMismatch {
            width,
            height,
            actual_width: image.width(),
            actual_height: image.height(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::LogLevel;
    use crate::test_helpers::{logger_with_sink, write_utm_geotiff};
    use tempfile::TempDir;

    fn metadata(width: u32, height: u32) -> GeoMetadata {
        GeoMetadata {
            crs: "EPSG:4326".into(),
            transform: Affine::north_up(105.0, 11.0, 0.001, 0.001),
            width,
            height,
            count: 3,
            dtype: "uint8".into(),
            source: Georef {
                crs: "EPSG:32648".into(),
                transform: Affine::north_up(500_000.0, 1_200_000.0, 30.0, 30.0),
                width,
                height,
            },
        }
    }

    // =========================================================================
    // Metadata scaling
    // =========================================================================

    #[test]
    fn scale_one_is_identity() {
        let m = metadata(40, 30);
        assert_eq!(update_geo_metadata_scale(m.clone(), 1.0), m);
    }

    #[test]
    fn scale_floors_dimensions_and_divides_pixel_size() {
        let m = metadata(41, 31);
        let s = update_geo_metadata_scale(m.clone(), 0.5);
        assert_eq!((s.width, s.height), (20, 15));
        assert_eq!(s.transform.a, m.transform.a / 0.5);
        assert_eq!(s.transform.e, m.transform.e / 0.5);
        assert_eq!(s.transform.c, m.transform.c);
        assert_eq!(s.transform.f, m.transform.f);
        assert_eq!((s.source.width, s.source.height), (20, 15));
        assert_eq!(s.source.transform.a, 60.0);
    }

    // =========================================================================
    // Detection and extraction
    // =========================================================================

    #[test]
    fn detect_crs_reads_geokeys() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("utm.tif");
        write_utm_geotiff(&path, 8, 6);
        let (logger, _) = logger_with_sink();
        let engine = GeoTransformEngine::new(logger);
        assert_eq!(engine.detect_crs(&path).as_deref(), Some("EPSG:32648"));
    }

    #[test]
    fn detect_crs_of_png_is_none_without_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("plain.png");
        image::RgbImage::new(3, 3).save(&path).unwrap();
        let (logger, sink) = logger_with_sink();
        let engine = GeoTransformEngine::new(Arc::clone(&logger));
        assert_eq!(engine.detect_crs(&path), None);
        logger.flush();
        assert!(sink.lock().unwrap().is_empty());
    }

    #[test]
    fn detect_crs_of_missing_file_logs_error() {
        let (logger, sink) = logger_with_sink();
        let engine = GeoTransformEngine::new(Arc::clone(&logger));
        assert_eq!(engine.detect_crs(Path::new("/nonexistent/gone.tif")), None);
        logger.flush();
        let entries = sink.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].0.contains("gone.tif"));
    }

    #[test]
    fn extract_uses_embedded_crs() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("utm.tif");
        write_utm_geotiff(&path, 40, 30);
        let (logger, _) = logger_with_sink();
        let engine = GeoTransformEngine::new(logger);

        let m = engine.extract_geo_metadata(&path, "EPSG:4326", None).unwrap();
        assert_eq!(m.crs, "EPSG:4326");
        assert_eq!(m.source.crs, "EPSG:32648");
        assert_eq!((m.source.width, m.source.height), (40, 30));
        assert_eq!(m.count, 3);
        assert_eq!(m.dtype, "uint8");
        assert!(m.width >= 1 && m.height >= 1);
    }

    #[test]
    fn extract_without_crs_warns() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("plain.tif");
        image::RgbImage::new(4, 4).save(&path).unwrap();
        let (logger, sink) = logger_with_sink();
        let engine = GeoTransformEngine::new(Arc::clone(&logger));

        assert!(engine.extract_geo_metadata(&path, "EPSG:4326", None).is_none());
        logger.flush();
        let entries = sink.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1, LogLevel::Warning);
        assert!(entries[0].0.contains("plain.tif"));
    }

    #[test]
    fn extract_with_override_crs() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("plain.tif");
        image::RgbImage::new(4, 4).save(&path).unwrap();
        let (logger, _) = logger_with_sink();
        let engine = GeoTransformEngine::new(logger);
        let m = engine
            .try_extract_geo_metadata(&path, "EPSG:4326", Some("EPSG:4326"))
            .unwrap();
        assert_eq!((m.width, m.height), (4, 4));
    }

    // =========================================================================
    // Reprojection
    // =========================================================================

    #[test]
    fn reprojected_output_detects_target_crs() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("utm.tif");
        let dst = tmp.path().join("out/wgs84.tif");
        write_utm_geotiff(&src, 40, 30);
        let (logger, _) = logger_with_sink();
        let engine = GeoTransformEngine::new(logger);

        let m = engine.extract_geo_metadata(&src, "EPSG:4326", None).unwrap();
        let out = engine.reproject_raster(&src, &dst, "EPSG:4326", None).unwrap();
        assert_eq!(out, dst);
        assert_eq!(engine.detect_crs(&dst).as_deref(), Some("EPSG:4326"));

        let info = read_info(&dst).unwrap();
        assert_eq!((info.width, info.height), (m.width, m.height));
        assert_eq!(info.bands, 3);
        assert_eq!(info.dtype, "uint8");
    }

    #[test]
    fn reprojection_keeps_pixel_values() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("utm.tif");
        let dst = tmp.path().join("same.tif");
        write_utm_geotiff(&src, 8, 6);
        let (logger, _) = logger_with_sink();
        let engine = GeoTransformEngine::new(logger);

        engine.try_reproject_raster(&src, &dst, "EPSG:32648", None).unwrap();
        assert_eq!(read_raster(&dst).unwrap().samples, read_raster(&src).unwrap().samples);
    }

    #[test]
    fn missing_crs_creates_no_output() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("plain.tif");
        let dst = tmp.path().join("out.tif");
        image::RgbImage::new(4, 4).save(&src).unwrap();
        let (logger, sink) = logger_with_sink();
        let engine = GeoTransformEngine::new(Arc::clone(&logger));

        assert!(engine.reproject_raster(&src, &dst, "EPSG:4326", None).is_none());
        assert!(!dst.exists());
        logger.flush();
        assert_eq!(sink.lock().unwrap()[0].1, LogLevel::Warning);
    }

    #[test]
    fn unsupported_crs_is_logged_with_name() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("utm.tif");
        write_utm_geotiff(&src, 4, 4);
        let (logger, sink) = logger_with_sink();
        let engine = GeoTransformEngine::new(Arc::clone(&logger));

        let out = engine.reproject_raster(&src, &tmp.path().join("o.tif"), "EPSG:9210", None);
        assert!(out.is_none());
        logger.flush();
        let entries = sink.lock().unwrap();
        assert_eq!(entries[0].1, LogLevel::Error);
        assert!(entries[0].0.starts_with("Reprojection error utm.tif"));
    }

    #[test]
    fn non_writable_driver_is_an_unknown_error() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("utm.tif");
        write_utm_geotiff(&src, 4, 4);
        let (logger, sink) = logger_with_sink();
        let engine = GeoTransformEngine::new(Arc::clone(&logger));

        let out = engine.reproject_raster(&src, &tmp.path().join("o.jp2"), "EPSG:4326", None);
        assert!(out.is_none());
        logger.flush();
        assert!(sink.lock().unwrap()[0].0.starts_with("Unknown error utm.tif"));
    }

    #[test]
    fn reprojection_to_png_reads_back_through_sidecars() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("utm.tif");
        let dst = tmp.path().join("out.png");
        write_utm_geotiff(&src, 12, 9);
        let (logger, sink) = logger_with_sink();
        let engine = GeoTransformEngine::new(Arc::clone(&logger));

        let m = engine.try_extract_geo_metadata(&src, "EPSG:4326", None).unwrap();
        engine.try_reproject_raster(&src, &dst, "EPSG:4326", None).unwrap();
        assert!(tmp.path().join("out.pgw").is_file());
        assert!(tmp.path().join("out.png.aux.xml").is_file());
        assert_eq!(engine.detect_crs(&dst).as_deref(), Some("EPSG:4326"));

        let info = read_info(&dst).unwrap();
        assert_eq!((info.width, info.height, info.bands), (m.width, m.height, 3));
        for (got, want) in info.transform.coefficients().iter().zip(m.transform.coefficients()) {
            assert!((got - want).abs() < 1e-9, "{:?} vs {:?}", info.transform, m.transform);
        }
        assert_eq!(info.metadata.get("AREA_OR_POINT").map(String::as_str), Some("Area"));
        logger.flush();
        assert!(sink.lock().unwrap().is_empty());
    }

    #[test]
    fn step_verbosity_logs_six_steps() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("utm.tif");
        write_utm_geotiff(&src, 4, 4);
        let (logger, sink) = logger_with_sink();
        let engine = GeoTransformEngine::new(Arc::clone(&logger)).with_verbosity(Verbosity::Steps);

        engine
            .try_reproject_raster(&src, &tmp.path().join("o.tif"), "EPSG:4326", None)
            .unwrap();
        logger.flush();
        let entries = sink.lock().unwrap();
        for n in 1..=6 {
            let tag = format!("[step {n}/6]");
            assert!(entries.iter().any(|(m, _)| m.starts_with(&tag)), "missing {tag}");
        }
        // One resample entry per band.
        assert_eq!(entries.iter().filter(|(m, _)| m.starts_with("[step 5/6]")).count(), 3);
    }

    #[test]
    fn batch_reproject_reports_each_file() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.tif");
        write_utm_geotiff(&a, 4, 4);
        let missing = tmp.path().join("missing.tif");
        let (logger, _) = logger_with_sink();
        let engine = GeoTransformEngine::new(logger);

        let out_dir = tmp.path().join("out");
        let outcomes = engine.batch_reproject(&[a.clone(), missing.clone()], &out_dir, "EPSG:3857");
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].output(), Some(out_dir.join("a.tif").as_path()));
        assert!(!outcomes[1].is_produced());
        assert_eq!(outcomes[1].source(), missing.as_path());
    }

    // =========================================================================
    // Georeferenced save
    // =========================================================================

    #[test]
    fn save_with_geospatial_writes_four_bands() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("geo.tif");
        let (logger, _) = logger_with_sink();
        let engine = GeoTransformEngine::new(logger);
        let image = RgbaImage::from_pixel(5, 4, image::Rgba([10, 20, 30, 255]));

        assert!(engine.save_with_geospatial(&image, &out, &metadata(5, 4)));
        let info = read_info(&out).unwrap();
        assert_eq!(info.bands, 4);
        assert_eq!(info.crs.as_deref(), Some("EPSG:4326"));
        assert_eq!(info.transform, metadata(5, 4).transform);
    }

    #[test]
    fn save_with_geospatial_as_jpeg() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("geo.jpg");
        let (logger, _) = logger_with_sink();
        let engine = GeoTransformEngine::new(logger);
        let image = RgbaImage::from_pixel(5, 4, image::Rgba([10, 20, 30, 255]));

        engine.try_save_with_geospatial(&image, &out, &metadata(5, 4)).unwrap();
        assert!(tmp.path().join("geo.jgw").is_file());
        let info = read_info(&out).unwrap();
        assert_eq!(info.bands, 3);
        assert_eq!(engine.detect_crs(&out).as_deref(), Some("EPSG:4326"));
    }

    #[test]
    fn save_with_geospatial_rejects_wrong_size() {
        let tmp = TempDir::new().unwrap();
        let (logger, sink) = logger_with_sink();
        let engine = GeoTransformEngine::new(Arc::clone(&logger));
        let image = RgbaImage::new(3, 3);

        assert!(!engine.save_with_geospatial(&image, &tmp.path().join("g.tif"), &metadata(5, 4)));
        logger.flush();
        assert_eq!(sink.lock().unwrap()[0].1, LogLevel::Error);
    }

    #[test]
    fn georeference_matches_target_grid() {
        let (logger, _) = logger_with_sink();
        let engine = GeoTransformEngine::new(logger);
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("utm.tif");
        write_utm_geotiff(&src, 40, 30);
        let m = engine.try_extract_geo_metadata(&src, "EPSG:4326", None).unwrap();

        let image = RgbaImage::from_pixel(40, 30, image::Rgba([200, 100, 50, 255]));
        let warped = engine.try_georeference(&image, &m).unwrap();
        assert_eq!(warped.dimensions(), (m.width, m.height));
        // The centre of the target grid lies inside the source extent.
        let centre = warped.get_pixel(m.width / 2, m.height / 2);
        assert_eq!(centre.0, [200, 100, 50, 255]);
    }
}
