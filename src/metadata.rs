//! Per-file metadata extraction and CSV/JSON export.
//!
//! Every record carries the filesystem basics. The other groups are added
//! when the file supports them:
//!
//! | Group | Fields | When |
//! |---|---|---|
//! | File | `filename`, `path`, `size`, `size_human`, `format`, `last_modified` | always |
//! | Image | `width`, `height`, `mode`, `channels`, `bands`, `dpi` | the `image` crate can read the header |
//! | EXIF | `exif` (tag name → display value) | the container has EXIF with known tag names |
//! | Geo | `crs`, `bounds`, `transform`, `res`, `gdal_metadata`, `gdal_band_metadata` | a TIFF with an embedded CRS, or a PNG/JPEG whose sidecars name one |
//!
//! ## CSV
//!
//! The header is `filename` followed by the sorted union of every field seen
//! across all records, so the file is only written after the whole batch has
//! been extracted. The nested maps are flattened: `exif` into `exif.<tag>`,
//! `gdal_metadata` into `gdal.<item>` and `gdal_band_metadata` into
//! `gdal.band<N>.<item>` (N one-based). A record without a field gets an empty
//! cell. Other structured values (lists, bounds) are written as JSON.
//!
//! ## JSON
//!
//! One object keyed by basename, plus a `__summary__` entry with file count,
//! format histogram and total size.

use crate::geo::worldfile::has_sidecar;
use crate::geo::{Bounds, read_info};
use crate::imaging::display_name;
use crate::logger::AsyncLogger;
use crate::output::format_size;
use crate::scan::is_tiff_path;
use chrono::{DateTime, Local};
use image::{ColorType, ImageDecoder, ImageReader};
use rayon::prelude::*;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

const SUMMARY_KEY: &str = "__summary__";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("No metadata to export")]
    NoRecords,
}

fn serialize_dpi<S: Serializer>(dpi: &Option<[f64; 2]>, s: S) -> Result<S::Ok, S::Error> {
    match dpi {
        Some(pair) => pair.serialize(s),
        None => s.serialize_str("N/A"),
    }
}

/// Header information from the image decoder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    /// Pixel mode name: `L`, `LA`, `RGB`, `RGBA`, `I;16`, ...
    pub mode: String,
    pub channels: usize,
    pub bands: Vec<String>,
    /// Horizontal and vertical resolution, or `"N/A"` when unknown.
    #[serde(serialize_with = "serialize_dpi")]
    pub dpi: Option<[f64; 2]>,
}

/// Georeferencing of a GeoTIFF.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoInfo {
    pub crs: String,
    pub bounds: Bounds,
    /// Affine coefficients `a, b, c, d, e, f`.
    pub transform: [f64; 6],
    pub res: (f64, f64),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataRecord {
    pub filename: String,
    pub path: String,
    pub size: u64,
    pub size_human: String,
    pub format: String,
    pub last_modified: String,
    #[serde(flatten)]
    pub image: Option<ImageInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exif: Option<BTreeMap<String, String>>,
    #[serde(flatten)]
    pub geo: Option<GeoInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gdal_metadata: Option<BTreeMap<String, String>>,
    /// Band-level GDAL items under `band1`, `band2`, ...
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gdal_band_metadata: Option<BTreeMap<String, BTreeMap<String, String>>>,
}

impl MetadataRecord {
    /// The record as a flat-ish JSON object (nested maps kept nested).
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// Aggregate entry written under `__summary__` in JSON exports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_files: usize,
    pub generated_at: String,
    pub formats: BTreeMap<String, usize>,
    pub total_size: u64,
    pub total_size_human: String,
}

pub fn summarize<'a>(records: impl IntoIterator<Item = &'a MetadataRecord>) -> Summary {
    let mut total_files = 0;
    let mut total_size = 0;
    let mut formats = BTreeMap::new();
    for record in records {
        total_files += 1;
        total_size += record.size;
        *formats.entry(record.format.clone()).or_insert(0) += 1;
    }
    Summary {
        total_files,
        generated_at: Local::now().format(TIMESTAMP_FORMAT).to_string(),
        formats,
        total_size,
        total_size_human: format_size(total_size),
    }
}

/// PIL-style mode name and band names for a decoder color type.
fn mode_and_bands(color: ColorType) -> (&'static str, &'static [&'static str]) {
    const L: &[&str] = &["L"];
    const LA: &[&str] = &["L", "A"];
    const RGB: &[&str] = &["R", "G", "B"];
    const RGBA: &[&str] = &["R", "G", "B", "A"];
    match color {
        ColorType::L8 => ("L", L),
        ColorType::La8 => ("LA", LA),
        ColorType::Rgb8 => ("RGB", RGB),
        ColorType::Rgba8 => ("RGBA", RGBA),
        ColorType::L16 => ("I;16", L),
        ColorType::La16 => ("LA;16", LA),
        ColorType::Rgb16 => ("RGB;16", RGB),
        ColorType::Rgba16 => ("RGBA;16", RGBA),
        ColorType::Rgb32F => ("RGB;F", RGB),
        ColorType::Rgba32F => ("RGBA;F", RGBA),
        _ => ("unknown", &[]),
    }
}

fn read_image_info(path: &Path) -> Result<(u32, u32, ColorType), image::ImageError> {
    let decoder = ImageReader::open(path)?.with_guessed_format()?.into_decoder()?;
    let (width, height) = decoder.dimensions();
    Ok((width, height, decoder.color_type()))
}

fn rational_field(exif: &exif::Exif, tag: exif::Tag) -> Option<f64> {
    match &exif.get_field(tag, exif::In::PRIMARY)?.value {
        exif::Value::Rational(values) => values.first().map(|r| r.to_f64()),
        _ => None,
    }
}

/// Named EXIF tags of the primary image, and the resolution if present.
fn read_exif(path: &Path) -> Option<(BTreeMap<String, String>, Option<[f64; 2]>)> {
    let file = File::open(path).ok()?;
    let exif = exif::Reader::new()
        .read_from_container(&mut BufReader::new(file))
        .ok()?;

    let mut tags = BTreeMap::new();
    for field in exif.fields() {
        if field.ifd_num != exif::In::PRIMARY || field.tag.description().is_none() {
            continue;
        }
        tags.entry(field.tag.to_string())
            .or_insert_with(|| field.display_value().with_unit(&exif).to_string());
    }
    if tags.is_empty() {
        return None;
    }
    let dpi = rational_field(&exif, exif::Tag::XResolution)
        .zip(rational_field(&exif, exif::Tag::YResolution))
        .map(|(x, y)| [x, y]);
    Some((tags, dpi))
}

pub struct MetadataExtractor {
    logger: Arc<AsyncLogger>,
}

impl MetadataExtractor {
    pub fn new(logger: Arc<AsyncLogger>) -> Self {
        Self { logger }
    }

    /// Metadata for one file, or `None` when it does not exist.
    ///
    /// Unreadable image headers or georeferencing are logged and the
    /// corresponding fields left out.
    pub fn extract(&self, path: &Path) -> Option<MetadataRecord> {
        let stat = fs::metadata(path).ok()?;
        if !stat.is_file() {
            return None;
        }
        let filename = display_name(path);
        let format = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| "unknown".to_string());
        let last_modified = stat
            .modified()
            .map(|t| DateTime::<Local>::from(t).format(TIMESTAMP_FORMAT).to_string())
            .unwrap_or_default();

        let mut record = MetadataRecord {
            filename: filename.clone(),
            path: path.display().to_string(),
            size: stat.len(),
            size_human: format_size(stat.len()),
            format,
            last_modified,
            image: None,
            exif: None,
            geo: None,
            gdal_metadata: None,
            gdal_band_metadata: None,
        };

        match read_image_info(path) {
            Ok((width, height, color)) => {
                let (mode, bands) = mode_and_bands(color);
                let exif = read_exif(path);
                record.image = Some(ImageInfo {
                    width,
                    height,
                    mode: mode.to_string(),
                    channels: color.channel_count() as usize,
                    bands: bands.iter().map(|b| b.to_string()).collect(),
                    dpi: exif.as_ref().and_then(|(_, dpi)| *dpi),
                });
                record.exif = exif.map(|(tags, _)| tags);
            }
            Err(e) => {
                self.logger
                    .warning(format!("Could not read image metadata {filename} - {e}"));
            }
        }

        if is_tiff_path(path) || has_sidecar(path) {
            match read_info(path) {
                Ok(info) => {
                    if let Some(crs) = info.crs {
                        record.geo = Some(GeoInfo {
                            crs,
                            bounds: info.transform.bounds(info.width, info.height),
                            transform: info.transform.coefficients(),
                            res: info.transform.resolution(),
                        });
                        if !info.metadata.is_empty() {
                            record.gdal_metadata = Some(info.metadata);
                        }
                        if !info.band_metadata.is_empty() {
                            let bands = info
                                .band_metadata
                                .into_iter()
                                .map(|(band, items)| (format!("band{}", band + 1), items))
                                .collect();
                            record.gdal_band_metadata = Some(bands);
                        }
                    }
                }
                Err(e) => {
                    self.logger
                        .warning(format!("Could not read geospatial metadata {filename} - {e}"));
                }
            }
        }

        Some(record)
    }

    /// Extract every existing path in parallel. Missing paths are skipped.
    pub fn extract_batch(&self, paths: &[PathBuf]) -> BTreeMap<PathBuf, MetadataRecord> {
        paths
            .par_iter()
            .filter_map(|p| self.extract(p).map(|r| (p.clone(), r)))
            .collect()
    }

    pub fn try_export_csv(&self, paths: &[PathBuf], output: &Path) -> Result<PathBuf, MetadataError> {
        let records = self.extract_batch(paths);
        save_csv(&records, output)?;
        self.logger
            .success(format!("Exported metadata CSV: {}", output.display()));
        Ok(output.to_path_buf())
    }

    /// Write a CSV export of `paths`; failures are logged and give `None`.
    pub fn export_csv(&self, paths: &[PathBuf], output: &Path) -> Option<PathBuf> {
        self.try_export_csv(paths, output)
            .map_err(|e| self.logger.error(format!("Metadata CSV export failed - {e}")))
            .ok()
    }

    pub fn try_export_json(&self, paths: &[PathBuf], output: &Path) -> Result<PathBuf, MetadataError> {
        let records = self.extract_batch(paths);
        save_json(&records, output)?;
        self.logger
            .success(format!("Exported metadata JSON: {}", output.display()));
        Ok(output.to_path_buf())
    }

    /// Write a JSON export of `paths`; failures are logged and give `None`.
    pub fn export_json(&self, paths: &[PathBuf], output: &Path) -> Option<PathBuf> {
        self.try_export_json(paths, output)
            .map_err(|e| self.logger.error(format!("Metadata JSON export failed - {e}")))
            .ok()
    }
}

fn create_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Write already extracted records as CSV.
pub fn save_csv(records: &BTreeMap<PathBuf, MetadataRecord>, output: &Path) -> Result<(), MetadataError> {
    if records.is_empty() {
        return Err(MetadataError::NoRecords);
    }
    create_parent(output)?;
    let maps: Vec<Map<String, Value>> = records.values().map(MetadataRecord::to_map).collect();
    let mut writer = BufWriter::new(File::create(output)?);
    write_csv(&maps, &mut writer)?;
    writer.flush()?;
    Ok(())
}

/// Write already extracted records as a JSON object keyed by basename, with
/// a `__summary__` entry.
pub fn save_json(records: &BTreeMap<PathBuf, MetadataRecord>, output: &Path) -> Result<(), MetadataError> {
    if records.is_empty() {
        return Err(MetadataError::NoRecords);
    }
    create_parent(output)?;

    let mut document = Map::new();
    for (path, record) in records {
        document.insert(display_name(path), Value::Object(record.to_map()));
    }
    let summary = summarize(records.values());
    document.insert(SUMMARY_KEY.to_string(), serde_json::to_value(&summary)?);

    fs::write(output, serde_json::to_string_pretty(&Value::Object(document))?)?;
    Ok(())
}

// ============================================================================
// CSV
// ============================================================================

/// Nested maps flattened into prefixed columns.
const FLATTENED: &[(&str, &str)] = &[
    ("exif", "exif."),
    ("gdal_metadata", "gdal."),
    ("gdal_band_metadata", "gdal."),
];

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Column name → cell text for one record.
fn flatten(record: &Map<String, Value>) -> BTreeMap<String, String> {
    let mut cells = BTreeMap::new();
    for (key, value) in record {
        let prefix = FLATTENED
            .iter()
            .find(|(k, _)| *k == key.as_str())
            .map(|(_, prefix)| *prefix);
        match (prefix, value) {
            (Some(prefix), Value::Object(inner)) => {
                for (name, value) in inner {
                    match value {
                        Value::Object(items) => {
                            for (item, value) in items {
                                cells.insert(format!("{prefix}{name}.{item}"), cell(value));
                            }
                        }
                        value => {
                            cells.insert(format!("{prefix}{name}"), cell(value));
                        }
                    }
                }
            }
            _ => {
                cells.insert(key.clone(), cell(value));
            }
        }
    }
    cells
}

fn columns_of(rows: &[BTreeMap<String, String>]) -> Vec<String> {
    let mut fields: BTreeSet<String> = rows.iter().flat_map(|row| row.keys().cloned()).collect();
    fields.remove("filename");
    std::iter::once("filename".to_string()).chain(fields).collect()
}

/// `filename` followed by the sorted union of all other columns.
pub fn csv_columns(records: &[Map<String, Value>]) -> Vec<String> {
    let rows: Vec<_> = records.iter().map(flatten).collect();
    columns_of(&rows)
}

fn quote(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Write records as CSV (RFC 4180 quoting, CRLF line endings).
pub fn write_csv(records: &[Map<String, Value>], out: &mut impl Write) -> std::io::Result<()> {
    let rows: Vec<_> = records.iter().map(flatten).collect();
    let columns = columns_of(&rows);
    let header: Vec<String> = columns.iter().map(|c| quote(c)).collect();
    write!(out, "{}\r\n", header.join(","))?;
    for row in &rows {
        let line: Vec<String> = columns
            .iter()
            .map(|c| quote(row.get(c).map(String::as_str).unwrap_or_default()))
            .collect();
        write!(out, "{}\r\n", line.join(","))?;
    }
    Ok(())
}

/// Split one line written by [`write_csv`] back into its fields. Quoted
/// fields may hold commas and doubled quotes, but not line breaks.
pub fn parse_csv_row(line: &str) -> Vec<String> {
    let mut fields = vec![String::new()];
    let mut quoted = false;
    let mut chars = line.trim_end_matches(['\r', '\n']).chars().peekable();
    while let Some(c) = chars.next() {
        let field = fields.len() - 1;
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                chars.next();
                fields[field].push('"');
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(String::new()),
            c => fields[field].push(c),
        }
    }
    fields
}
