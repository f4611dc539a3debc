//! End-to-end scenarios through the public library API.
//!
//! Every fixture is written into a fresh temporary directory, so the tests
//! need no checked-in data and can run in parallel.

use image::{Rgb, RgbImage, Rgba, RgbaImage};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tiftiff::cache::{CacheManager, CacheSettings};
use tiftiff::config::{ConfigStore, GeoOptions, ProcessingOptions};
use tiftiff::geo::raster::write_geotiff;
use tiftiff::geo::{Affine, GeoTransformEngine, Raster, Samples, read_info, update_geo_metadata_scale};
use tiftiff::imaging::pixels::{apply_adjustments, remove_background};
use tiftiff::imaging::{Adjustments, BackgroundRemoval};
use tiftiff::logger::{AsyncLogger, LogLevel, LoggerConfig};
use tiftiff::metadata::{MetadataExtractor, parse_csv_row};
use tiftiff::process::BatchOrchestrator;

type Sink = Arc<Mutex<Vec<(String, LogLevel)>>>;

fn logger() -> (Arc<AsyncLogger>, Sink) {
    let logger = AsyncLogger::new(LoggerConfig::default()).unwrap();
    let sink: Sink = Arc::new(Mutex::new(Vec::new()));
    let sink_clone = Arc::clone(&sink);
    logger.add_listener(move |msg: &str, level| {
        sink_clone.lock().unwrap().push((msg.to_string(), level));
    });
    (Arc::new(logger), sink)
}

fn errors(sink: &Sink) -> Vec<String> {
    sink.lock()
        .unwrap()
        .iter()
        .filter(|(_, l)| *l == LogLevel::Error)
        .map(|(m, _)| m.clone())
        .collect()
}

fn photo(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        if x == 0 {
            Rgb([0, 0, 0])
        } else {
            Rgb([(x * 25) as u8, (y * 25) as u8, 200])
        }
    })
}

/// 3-band GeoTIFF in UTM 48N with 30 m pixels.
fn write_utm(path: &Path, width: u32, height: u32) {
    let raster = Raster {
        width,
        height,
        bands: 3,
        samples: Samples::U8(photo(width, height).into_raw()),
        crs: Some("EPSG:32648".to_string()),
        transform: Affine::north_up(500_000.0, 1_200_000.0, 30.0, 30.0),
        metadata: BTreeMap::new(),
        band_metadata: BTreeMap::new(),
    };
    write_geotiff(path, &raster).unwrap();
}

// =========================================================================
// Batch
// =========================================================================

#[test]
fn batch_with_one_missing_file() {
    let tmp = TempDir::new().unwrap();
    let a = tmp.path().join("a.png");
    let c = tmp.path().join("c.png");
    photo(8, 6).save(&a).unwrap();
    photo(8, 6).save(&c).unwrap();
    let missing = tmp.path().join("missing_scan.png");

    let (logger, sink) = logger();
    let orchestrator = BatchOrchestrator::new(Arc::clone(&logger));
    let options = ProcessingOptions {
        output_format: ".jpg".into(),
        remove_black: true,
        ..Default::default()
    };

    let out_dir = tmp.path().join("out");
    let produced = orchestrator.run(&[a, missing, c], &out_dir, &options);
    logger.flush();

    assert_eq!(produced, vec![out_dir.join("a.jpg"), out_dir.join("c.jpg")]);
    let errors = errors(&sink);
    assert_eq!(errors.len(), 1, "{errors:?}");
    assert!(errors[0].contains("missing_scan.png"));
}

#[test]
fn preserved_geotiff_is_in_target_crs() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("survey.tif");
    write_utm(&source, 16, 12);
    let out_dir = tmp.path().join("out");

    let (logger, _) = logger();
    let orchestrator = BatchOrchestrator::new(Arc::clone(&logger));
    let options = ProcessingOptions {
        geo: GeoOptions {
            enable_reproject: true,
            preserve_geospatial: true,
            target_crs: "EPSG:4326".into(),
            ..Default::default()
        },
        ..Default::default()
    };

    let produced = orchestrator.run(&[source], &out_dir, &options);
    let geo_output = out_dir.join("survey.tif");
    assert_eq!(produced, vec![geo_output.clone()]);
    assert!(!out_dir.join("survey.png").exists());

    let engine = GeoTransformEngine::new(logger);
    assert_eq!(engine.detect_crs(&geo_output).as_deref(), Some("EPSG:4326"));
    assert_eq!(read_info(&geo_output).unwrap().bands, 4);
}

// =========================================================================
// Reprojection
// =========================================================================

#[test]
fn reprojection_matches_extracted_metadata() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("utm.tif");
    write_utm(&source, 20, 15);
    let (logger, sink) = logger();
    let engine = GeoTransformEngine::new(Arc::clone(&logger));

    let metadata = engine.extract_geo_metadata(&source, "EPSG:4326", None).unwrap();
    let dst = tmp.path().join("wgs84/utm.tif");
    let written = engine.reproject_raster(&source, &dst, "EPSG:4326", None).unwrap();
    logger.flush();

    assert_eq!(written, dst);
    assert_eq!(engine.detect_crs(&dst).as_deref(), Some(metadata.crs.as_str()));
    let info = read_info(&dst).unwrap();
    assert_eq!((info.width, info.height), (metadata.width, metadata.height));
    assert_eq!(info.bands, 3);
    assert_eq!(info.dtype, "uint8");
    assert!(errors(&sink).is_empty());
}

#[test]
fn png_reprojection_is_detectable_and_exported() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("utm.tif");
    write_utm(&source, 8, 8);
    let (logger, _) = logger();
    let engine = GeoTransformEngine::new(Arc::clone(&logger));

    let dst = tmp.path().join("web/tile.png");
    engine.try_reproject_raster(&source, &dst, "EPSG:3857", None).unwrap();
    assert_eq!(engine.detect_crs(&dst).as_deref(), Some("EPSG:3857"));

    let record = MetadataExtractor::new(logger).extract(&dst).unwrap();
    assert_eq!(record.geo.unwrap().crs, "EPSG:3857");
}

#[test]
fn batch_reproject_reports_missing_crs_as_skip() {
    let tmp = TempDir::new().unwrap();
    let geo = tmp.path().join("geo.tif");
    let plain = tmp.path().join("plain.tif");
    write_utm(&geo, 6, 6);
    photo(6, 6).save(&plain).unwrap();
    let out_dir = tmp.path().join("out");
    std::fs::create_dir_all(&out_dir).unwrap();

    let (logger, sink) = logger();
    let engine = GeoTransformEngine::new(Arc::clone(&logger));
    let outcomes = engine.batch_reproject(&[geo, plain], &out_dir, "EPSG:3857");
    logger.flush();

    assert!(outcomes[0].is_produced());
    assert!(!outcomes[1].is_produced());
    assert!(!out_dir.join("plain.tif").exists());
    let warnings: Vec<String> = sink
        .lock()
        .unwrap()
        .iter()
        .filter(|(_, l)| *l == LogLevel::Warning)
        .map(|(m, _)| m.clone())
        .collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("plain.tif"));
    assert!(errors(&sink).is_empty());
}

// =========================================================================
// Metadata export
// =========================================================================

#[test]
fn csv_leaves_exif_cells_empty_for_files_without_exif() {
    let tmp = TempDir::new().unwrap();
    let tif = tmp.path().join("a_scan.tif");
    let png = tmp.path().join("b_photo.png");
    write_utm(&tif, 4, 4);
    photo(4, 4).save(&png).unwrap();
    let csv = tmp.path().join("export/meta.csv");

    let (logger, _) = logger();
    let extractor = MetadataExtractor::new(logger);
    extractor.try_export_csv(&[tif, png], &csv).unwrap();

    let text = std::fs::read_to_string(&csv).unwrap();
    let rows: Vec<Vec<String>> = text.lines().map(parse_csv_row).collect();
    assert_eq!(rows.len(), 3);
    let header = &rows[0];
    assert_eq!(header[0], "filename");
    let exif_columns: Vec<usize> = header
        .iter()
        .enumerate()
        .filter(|(_, h)| h.starts_with("exif."))
        .map(|(i, _)| i)
        .collect();
    assert!(!exif_columns.is_empty());

    // Rows follow path order: the TIFF first, then the PNG.
    assert_eq!(rows[2][0], "b_photo.png");
    for row in &rows[1..] {
        assert_eq!(row.len(), header.len());
    }
    for &i in &exif_columns {
        assert_eq!(rows[2][i], "");
    }
    assert!(exif_columns.iter().any(|&i| !rows[1][i].is_empty()));
}

// =========================================================================
// Cache and config
// =========================================================================

#[test]
fn cache_round_trip_and_clear() {
    let tmp = TempDir::new().unwrap();
    let cache = CacheManager::open(CacheSettings::new(tmp.path().join("cache"))).unwrap();
    let value = serde_json::json!({"bands": ["R", "G", "B"], "width": 640});

    assert!(cache.set_cache("scan-042", &value, Some("metadata")));
    assert!(cache.set_cache("scan-043", &1.5, None));
    assert_eq!(cache.get_cache("scan-042", Some("metadata")), Some(value));
    assert!(cache.has_cache("scan-043", None));

    cache.clear_cache(None);
    assert!(!cache.has_cache("scan-042", Some("metadata")));
    assert!(!cache.has_cache("scan-043", None));
    assert_eq!(cache.get_cache_info().total_entries, 0);
}

#[test]
fn settings_survive_reopen() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("settings.json");
    let cache = CacheManager::open(CacheSettings::new(tmp.path().join("cache"))).unwrap();

    let store = ConfigStore::open(&path, cache.clone());
    assert!(store.set("scale_ratio", serde_json::json!(0.25), true));
    drop(store);

    let other_cache = CacheManager::open(CacheSettings::new(tmp.path().join("cache2"))).unwrap();
    let reopened = ConfigStore::open(&path, other_cache);
    let options = ProcessingOptions::from_config(&reopened).unwrap();
    assert_eq!(options.scale_ratio, 0.25);
    assert_eq!(options.output_format, ".png");
}

// =========================================================================
// Identity laws
// =========================================================================

#[test]
fn neutral_adjustments_keep_pixels() {
    let original = RgbaImage::from_fn(9, 7, |x, y| Rgba([(x * 28) as u8, (y * 36) as u8, 77, 255]));
    let mut img = original.clone();
    apply_adjustments(&mut img, &Adjustments::default());
    assert_eq!(img, original);
}

#[test]
fn white_removal_is_idempotent() {
    let mut once = RgbaImage::from_fn(6, 6, |x, _| {
        if x % 2 == 0 {
            Rgba([250, 251, 252, 255])
        } else {
            Rgba([40, 80, 120, 255])
        }
    });
    let removal = BackgroundRemoval {
        black: false,
        white: true,
    };
    remove_background(&mut once, removal);
    let mut twice = once.clone();
    remove_background(&mut twice, removal);
    assert_eq!(once, twice);
}

#[test]
fn unit_scale_leaves_geo_metadata_unchanged() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("utm.tif");
    write_utm(&source, 10, 10);
    let (logger, _) = logger();
    let engine = GeoTransformEngine::new(logger);
    let metadata = engine.extract_geo_metadata(&source, "EPSG:4326", None).unwrap();

    assert_eq!(update_geo_metadata_scale(metadata.clone(), 1.0), metadata);

    let halved = update_geo_metadata_scale(metadata.clone(), 0.5);
    assert_eq!(halved.width, metadata.width / 2);
    assert_eq!(halved.transform.a, metadata.transform.a / 0.5);
    assert_eq!(halved.transform.e, metadata.transform.e / 0.5);
    assert_eq!(halved.transform.c, metadata.transform.c);
}
