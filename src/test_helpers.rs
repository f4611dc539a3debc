//! Shared test utilities for the tiftiff test suite.
//!
//! Fixtures are synthesized in code rather than checked in:
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = tempfile::TempDir::new().unwrap();
//! let tif = tmp.path().join("utm.tif");
//! write_utm_geotiff(&tif, 40, 30);
//!
//! let (logger, sink) = logger_with_sink();
//! // ... run something that logs ...
//! logger.flush();
//! assert_single_error_naming(&sink, "utm.tif");
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use image::{Rgb, RgbImage};

use crate::geo::Affine;
use crate::geo::raster::{Raster, Samples, write_geotiff};
use crate::logger::{AsyncLogger, LogLevel, LoggerConfig};

/// Messages received by a logger listener.
pub type LogSink = Arc<Mutex<Vec<(String, LogLevel)>>>;

// =========================================================================
// Logging
// =========================================================================

/// A logger whose notify entries are collected into the returned sink.
///
/// Call `logger.flush()` before inspecting the sink.
pub fn logger_with_sink() -> (Arc<AsyncLogger>, LogSink) {
    let logger = AsyncLogger::new(LoggerConfig::default()).unwrap();
    let sink: LogSink = Arc::new(Mutex::new(Vec::new()));
    let sink_clone = Arc::clone(&sink);
    logger.add_listener(move |msg: &str, level| {
        sink_clone.lock().unwrap().push((msg.to_string(), level));
    });
    (Arc::new(logger), sink)
}

/// Messages logged at `level`.
pub fn messages_at(sink: &LogSink, level: LogLevel) -> Vec<String> {
    sink.lock()
        .unwrap()
        .iter()
        .filter(|(_, l)| *l == level)
        .map(|(m, _)| m.clone())
        .collect()
}

/// Exactly one error entry was logged and it names `file_name`.
pub fn assert_single_error_naming(sink: &LogSink, file_name: &str) {
    let errors = messages_at(sink, LogLevel::Error);
    assert_eq!(errors.len(), 1, "expected one error, got {errors:?}");
    assert!(
        errors[0].contains(file_name),
        "error {:?} does not mention {file_name}",
        errors[0]
    );
}

// =========================================================================
// Fixtures
// =========================================================================

/// A gradient RGB image with a black left column and a white right column.
pub fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        if x == 0 {
            Rgb([0, 0, 0])
        } else if x + 1 == width {
            Rgb([255, 255, 255])
        } else {
            Rgb([(x * 40 % 200) as u8 + 20, (y * 30 % 200) as u8 + 20, 128])
        }
    })
}

pub fn write_png(path: &Path, width: u32, height: u32) {
    gradient(width, height).save(path).unwrap();
}

/// Origin of [`write_utm_geotiff`] rasters in EPSG:32648 (near 105°E, 10.8°N).
pub const UTM_ORIGIN: (f64, f64) = (500_000.0, 1_200_000.0);
/// Pixel size of [`write_utm_geotiff`] rasters, in metres.
pub const UTM_RES: f64 = 30.0;

/// A 3-band uint8 GeoTIFF in EPSG:32648 with 30 m pixels.
pub fn write_utm_geotiff(path: &Path, width: u32, height: u32) {
    let data = gradient(width, height).into_raw();
    let mut metadata = BTreeMap::new();
    metadata.insert("AREA_OR_POINT".to_string(), "Area".to_string());
    let raster = Raster {
        width,
        height,
        bands: 3,
        samples: Samples::U8(data),
        crs: Some("EPSG:32648".to_string()),
        transform: Affine::north_up(UTM_ORIGIN.0, UTM_ORIGIN.1, UTM_RES, UTM_RES),
        metadata,
        band_metadata: BTreeMap::new(),
    };
    write_geotiff(path, &raster).unwrap();
}
