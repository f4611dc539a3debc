//! PNG and JPEG rasters georeferenced through sidecar files.
//!
//! Neither format has room for a CRS, so the georeferencing sits next to the
//! image the way GDAL writes it:
//!
//! | File | Holds |
//! |---|---|
//! | `scene.png` | pixels (`image` encoder) |
//! | `scene.pgw` / `scene.jgw` | world file: `a d b e x y`, one per line, origin at the centre of the top-left pixel |
//! | `scene.png.aux.xml` | `<SRS>` and GDAL metadata items |
//!
//! A `.wld` world file is accepted when the extension-specific one is missing.

use super::GeoError;
use super::affine::Affine;
use super::crs::{format_epsg, parse_epsg};
use super::driver::Driver;
use super::raster::{Raster, RasterInfo, Samples};
use super::xml::{self, GdalMetadata};
use image::{DynamicImage, ImageBuffer, ImageDecoder, ImageFormat, ImageReader};
use std::path::{Path, PathBuf};

/// `scene.png` → `scene.pgw`: first and last letter of the extension plus `w`.
pub fn world_file_path(path: &Path) -> PathBuf {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_lowercase();
    let mut chars = ext.chars();
    match (chars.next(), chars.next_back()) {
        (Some(first), Some(last)) => path.with_extension(format!("{first}{last}w")),
        _ => path.with_extension("wld"),
    }
}

/// `scene.png` → `scene.png.aux.xml`.
pub fn aux_xml_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".aux.xml");
    PathBuf::from(name)
}

/// True when a world file or aux.xml sits next to `path`.
pub fn has_sidecar(path: &Path) -> bool {
    world_file_path(path).is_file() || path.with_extension("wld").is_file() || aux_xml_path(path).is_file()
}

fn parse_world_file(text: &str) -> Result<Affine, GeoError> {
    let values = text
        .split_whitespace()
        .map(str::parse::<f64>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| GeoError::InvalidRaster(format!("world file: {e}")))?;
    let [a, d, b, e, x, y] = values[..] else {
        return Err(GeoError::InvalidRaster(format!(
            "world file has {} values, expected 6",
            values.len()
        )));
    };
    Ok(Affine::new(a, b, x - a / 2.0 - b / 2.0, d, e, y - d / 2.0 - e / 2.0))
}

fn world_file_text(t: &Affine) -> String {
    let (x, y) = t.apply(0.5, 0.5);
    format!("{}\n{}\n{}\n{}\n{}\n{}\n", t.a, t.d, t.b, t.e, x, y)
}

fn read_transform(path: &Path) -> Result<Affine, GeoError> {
    for candidate in [world_file_path(path), path.with_extension("wld")] {
        if candidate.is_file() {
            return parse_world_file(&std::fs::read_to_string(candidate)?);
        }
    }
    Ok(Affine::identity())
}

fn read_sidecar(path: &Path) -> Result<GdalMetadata, GeoError> {
    let aux = aux_xml_path(path);
    if !aux.is_file() {
        return Ok(GdalMetadata::default());
    }
    xml::parse(&std::fs::read_to_string(aux)?)
}

/// `EPSG:<code>` from an SRS string: either the identifier itself or the
/// outermost `AUTHORITY["EPSG","<code>"]` of a WKT definition.
fn srs_to_epsg(srs: &str) -> Option<String> {
    if let Ok(code) = parse_epsg(srs) {
        return Some(format_epsg(code));
    }
    let start = srs.rfind("AUTHORITY[\"EPSG\",\"")? + "AUTHORITY[\"EPSG\",\"".len();
    let len = srs[start..].find('"')?;
    let code = srs[start..start + len].parse::<u32>().ok()?;
    Some(format_epsg(code))
}

fn dtype_for(color: image::ColorType) -> &'static str {
    match color.bytes_per_pixel() / color.channel_count().max(1) {
        1 => "uint8",
        2 => "uint16",
        4 => "float32",
        _ => "unknown",
    }
}

/// Header, world file and sidecar of a PNG or JPEG, without decoding pixels.
pub fn read_info(path: &Path) -> Result<RasterInfo, GeoError> {
    let decoder = ImageReader::open(path)?.with_guessed_format()?.into_decoder()?;
    let (width, height) = decoder.dimensions();
    let color = decoder.color_type();
    let sidecar = read_sidecar(path)?;
    Ok(RasterInfo {
        width,
        height,
        bands: color.channel_count() as usize,
        dtype: dtype_for(color).to_string(),
        crs: sidecar.srs.as_deref().and_then(srs_to_epsg),
        transform: read_transform(path)?,
        metadata: sidecar.dataset,
        band_metadata: sidecar.bands,
    })
}

pub fn read_raster(path: &Path) -> Result<Raster, GeoError> {
    let (bands, samples) = match ImageReader::open(path)?.with_guessed_format()?.decode()? {
        DynamicImage::ImageLuma8(b) => (1, Samples::U8(b.into_raw())),
        DynamicImage::ImageLumaA8(b) => (2, Samples::U8(b.into_raw())),
        DynamicImage::ImageRgb8(b) => (3, Samples::U8(b.into_raw())),
        DynamicImage::ImageRgba8(b) => (4, Samples::U8(b.into_raw())),
        DynamicImage::ImageLuma16(b) => (1, Samples::U16(b.into_raw())),
        DynamicImage::ImageLumaA16(b) => (2, Samples::U16(b.into_raw())),
        DynamicImage::ImageRgb16(b) => (3, Samples::U16(b.into_raw())),
        DynamicImage::ImageRgba16(b) => (4, Samples::U16(b.into_raw())),
        DynamicImage::ImageRgb32F(b) => (3, Samples::F32(b.into_raw())),
        DynamicImage::ImageRgba32F(b) => (4, Samples::F32(b.into_raw())),
        other => (4, Samples::U8(other.to_rgba8().into_raw())),
    };
    let info = read_info(path)?;
    let raster = Raster {
        width: info.width,
        height: info.height,
        bands,
        samples,
        crs: info.crs,
        transform: info.transform,
        metadata: info.metadata,
        band_metadata: info.band_metadata,
    };
    raster.check_len()?;
    Ok(raster)
}

fn to_image(raster: &Raster, driver: Driver) -> Result<DynamicImage, GeoError> {
    let (w, h) = (raster.width, raster.height);
    let png = driver == Driver::Png;
    let image = match (&raster.samples, raster.bands) {
        (Samples::U8(v), 1) => ImageBuffer::from_raw(w, h, v.clone()).map(DynamicImage::ImageLuma8),
        (Samples::U8(v), 2) => ImageBuffer::from_raw(w, h, v.clone()).map(DynamicImage::ImageLumaA8),
        (Samples::U8(v), 3) => ImageBuffer::from_raw(w, h, v.clone()).map(DynamicImage::ImageRgb8),
        (Samples::U8(v), 4) => ImageBuffer::from_raw(w, h, v.clone()).map(DynamicImage::ImageRgba8),
        (Samples::U16(v), 1) if png => ImageBuffer::from_raw(w, h, v.clone()).map(DynamicImage::ImageLuma16),
        (Samples::U16(v), 2) if png => ImageBuffer::from_raw(w, h, v.clone()).map(DynamicImage::ImageLumaA16),
        (Samples::U16(v), 3) if png => ImageBuffer::from_raw(w, h, v.clone()).map(DynamicImage::ImageRgb16),
        (Samples::U16(v), 4) if png => ImageBuffer::from_raw(w, h, v.clone()).map(DynamicImage::ImageRgba16),
        (samples, bands) => {
            return Err(GeoError::InvalidRaster(format!(
                "{driver} cannot store {bands} band(s) of {}",
                samples.dtype()
            )));
        }
    }
    .ok_or_else(|| GeoError::InvalidRaster("sample buffer does not match the image size".to_string()))?;
    // JPEG has no alpha channel.
    Ok(match (driver, raster.bands) {
        (Driver::Jpeg, 2) => DynamicImage::ImageLuma8(image.to_luma8()),
        (Driver::Jpeg, 4) => DynamicImage::ImageRgb8(image.to_rgb8()),
        _ => image,
    })
}

/// Encode `raster` as PNG or JPEG and write its world file and aux.xml.
pub fn write_raster(path: &Path, raster: &Raster, driver: Driver) -> Result<(), GeoError> {
    let format = match driver {
        Driver::Png => ImageFormat::Png,
        Driver::Jpeg => ImageFormat::Jpeg,
        other => return Err(GeoError::UnsupportedDriver(other)),
    };
    raster.check_len()?;
    let srs = raster
        .crs
        .as_deref()
        .map(|crs| parse_epsg(crs).map(format_epsg))
        .transpose()?;

    to_image(raster, driver)?.save_with_format(path, format)?;
    std::fs::write(world_file_path(path), world_file_text(&raster.transform))?;

    let aux = aux_xml_path(path);
    if srs.is_none() && raster.metadata.is_empty() && raster.band_metadata.is_empty() {
        if aux.is_file() {
            std::fs::remove_file(aux)?;
        }
        return Ok(());
    }
    let sidecar = xml::pam_xml(srs.as_deref(), &raster.metadata, &raster.band_metadata)?;
    std::fs::write(aux, sidecar)?;
    Ok(())
}
