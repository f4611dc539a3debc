//! In-memory rasters and GeoTIFF I/O.
//!
//! [`read_info`], [`read_raster`] and [`write_raster`] pick the format: TIFF
//! files by signature, PNG and JPEG through [`worldfile`](super::worldfile).
//!
//! Reading and writing go through the `tiff` crate directly because the
//! `image` crate does not expose the GeoTIFF tags:
//!
//! | Tag | Id | Use |
//! |---|---|---|
//! | ModelPixelScale | 33550 | pixel size (north-up rasters) |
//! | ModelTiepoint | 33922 | pixel (i, j) ↔ world (x, y) |
//! | ModelTransformation | 34264 | full 4×4 matrix (rotated rasters) |
//! | GeoKeyDirectory | 34735 | model type + EPSG code |
//! | GDAL_METADATA | 42112 | XML `<Item>` dictionary ([`xml`](super::xml)) |
//!
//! Pixel data is kept interleaved (chunky): sample `b` of pixel `i` lives at
//! `i * bands + b`. Only single-image, chunky TIFFs are supported.

use super::GeoError;
use super::affine::Affine;
use super::crs::{format_epsg, is_geographic, parse_epsg};
use super::driver::Driver;
use super::worldfile;
use super::xml::{self, BandItems, ItemMap};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_MODEL_TRANSFORMATION: u16 = 34264;
const TAG_GEO_KEY_DIRECTORY: u16 = 34735;
const TAG_GDAL_METADATA: u16 = 42112;

const KEY_MODEL_TYPE: u16 = 1024;
const KEY_RASTER_TYPE: u16 = 1025;
const KEY_GEOGRAPHIC_TYPE: u16 = 2048;
const KEY_PROJECTED_CS_TYPE: u16 = 3072;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;
const USER_DEFINED: u16 = 32767;

/// Interleaved sample buffer, one variant per supported data type.
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    U8(Vec<u8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

fn remap_band<T: Copy + Default>(src: &[T], dst: &mut [T], map: &[Option<usize>], bands: usize, band: usize) {
    for (i, source) in map.iter().enumerate() {
        dst[i * bands + band] = match source {
            Some(s) => src[s * bands + band],
            None => T::default(),
        };
    }
}

impl Samples {
    /// Data type name (`uint8`, `int16`, `float32`, ...).
    pub fn dtype(&self) -> &'static str {
        match self {
            Self::U8(_) => "uint8",
            Self::U16(_) => "uint16",
            Self::I16(_) => "int16",
            Self::U32(_) => "uint32",
            Self::I32(_) => "int32",
            Self::F32(_) => "float32",
            Self::F64(_) => "float64",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::U8(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::I16(v) => v.len(),
            Self::U32(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn bits_per_sample(&self) -> u16 {
        match self {
            Self::U8(_) => 8,
            Self::U16(_) | Self::I16(_) => 16,
            Self::U32(_) | Self::I32(_) | Self::F32(_) => 32,
            Self::F64(_) => 64,
        }
    }

    /// TIFF SampleFormat: 1 unsigned, 2 signed, 3 float.
    fn sample_format(&self) -> u16 {
        match self {
            Self::U8(_) | Self::U16(_) | Self::U32(_) => 1,
            Self::I16(_) | Self::I32(_) => 2,
            Self::F32(_) | Self::F64(_) => 3,
        }
    }

    /// Zero-filled buffer of the same data type.
    pub fn zeroed_like(&self, len: usize) -> Self {
        match self {
            Self::U8(_) => Self::U8(vec![0; len]),
            Self::U16(_) => Self::U16(vec![0; len]),
            Self::I16(_) => Self::I16(vec![0; len]),
            Self::U32(_) => Self::U32(vec![0; len]),
            Self::I32(_) => Self::I32(vec![0; len]),
            Self::F32(_) => Self::F32(vec![0.0; len]),
            Self::F64(_) => Self::F64(vec![0.0; len]),
        }
    }

    /// Fill `band` of `dst` from `self` through a pixel index map; unmapped
    /// pixels get zero.
    pub fn remap_band_into(
        &self,
        dst: &mut Samples,
        map: &[Option<usize>],
        bands: usize,
        band: usize,
    ) -> Result<(), GeoError> {
        match (self, dst) {
            (Self::U8(s), Self::U8(d)) => remap_band(s, d, map, bands, band),
            (Self::U16(s), Self::U16(d)) => remap_band(s, d, map, bands, band),
            (Self::I16(s), Self::I16(d)) => remap_band(s, d, map, bands, band),
            (Self::U32(s), Self::U32(d)) => remap_band(s, d, map, bands, band),
            (Self::I32(s), Self::I32(d)) => remap_band(s, d, map, bands, band),
            (Self::F32(s), Self::F32(d)) => remap_band(s, d, map, bands, band),
            (Self::F64(s), Self::F64(d)) => remap_band(s, d, map, bands, band),
            (s, d) => {
                return Err(GeoError::InvalidRaster(format!(
                    "sample type mismatch: {} into {}",
                    s.dtype(),
                    d.dtype()
                )));
            }
        }
        Ok(())
    }

    fn from_decoding(result: DecodingResult) -> Result<Self, GeoError> {
        Ok(match result {
            DecodingResult::U8(v) => Self::U8(v),
            DecodingResult::U16(v) => Self::U16(v),
            DecodingResult::I16(v) => Self::I16(v),
            DecodingResult::U32(v) => Self::U32(v),
            DecodingResult::I32(v) => Self::I32(v),
            DecodingResult::F32(v) => Self::F32(v),
            DecodingResult::F64(v) => Self::F64(v),
            _ => {
                return Err(GeoError::InvalidRaster(
                    "unsupported sample type".to_string(),
                ));
            }
        })
    }
}

/// Header-level description of a raster file.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterInfo {
    pub width: u32,
    pub height: u32,
    pub bands: usize,
    pub dtype: String,
    /// `EPSG:<code>` when the GeoKeys name one.
    pub crs: Option<String>,
    /// Identity when the file carries no georeferencing tags.
    pub transform: Affine,
    /// Dataset-level GDAL metadata items.
    pub metadata: ItemMap,
    /// Band-level GDAL metadata items, keyed by zero-based band index.
    pub band_metadata: BandItems,
}

/// A fully loaded raster.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub width: u32,
    pub height: u32,
    pub bands: usize,
    pub samples: Samples,
    pub crs: Option<String>,
    pub transform: Affine,
    pub metadata: ItemMap,
    pub band_metadata: BandItems,
}

impl Raster {
    pub fn dtype(&self) -> &'static str {
        self.samples.dtype()
    }

    pub(super) fn check_len(&self) -> Result<(), GeoError> {
        let expected = self.width as usize * self.height as usize * self.bands;
        if self.samples.len() != expected || self.bands == 0 {
            return Err(GeoError::InvalidRaster(format!(
                "{}x{}x{} raster has {} samples",
                self.width,
                self.height,
                self.bands,
                self.samples.len()
            )));
        }
        Ok(())
    }
}

/// True when the file starts with a TIFF or BigTIFF signature.
pub fn is_tiff(path: &Path) -> std::io::Result<bool> {
    let mut magic = [0u8; 4];
    let mut file = File::open(path)?;
    if file.read(&mut magic)? < 4 {
        return Ok(false);
    }
    Ok(matches!(
        magic,
        [b'I', b'I', 42, 0] | [b'M', b'M', 0, 42] | [b'I', b'I', 43, 0] | [b'M', b'M', 0, 43]
    ))
}

fn open_decoder(path: &Path) -> Result<Decoder<BufReader<File>>, GeoError> {
    let file = File::open(path)?;
    Ok(Decoder::new(BufReader::new(file))?)
}

/// Read dimensions, data type, and georeferencing without decoding pixels.
pub fn read_info(path: &Path) -> Result<RasterInfo, GeoError> {
    if !is_tiff(path)? {
        return worldfile::read_info(path);
    }
    let mut decoder = open_decoder(path)?;
    read_info_from(&mut decoder)
}

fn read_info_from(decoder: &mut Decoder<BufReader<File>>) -> Result<RasterInfo, GeoError> {
    let (width, height) = decoder.dimensions()?;
    let bands = match decoder.find_tag(Tag::SamplesPerPixel)? {
        Some(v) => v.into_u32()? as usize,
        None => 1,
    };
    let bits = match decoder.find_tag(Tag::BitsPerSample)? {
        Some(v) => v.into_u16_vec()?.first().copied().unwrap_or(8),
        None => 1,
    };
    let format = match decoder.find_tag(Tag::SampleFormat)? {
        Some(v) => v.into_u16_vec()?.first().copied().unwrap_or(1),
        None => 1,
    };

    let geokeys = match decoder.find_tag(Tag::Unknown(TAG_GEO_KEY_DIRECTORY))? {
        Some(v) => parse_geokeys(&v.into_u16_vec()?),
        None => BTreeMap::new(),
    };
    let transformation = match decoder.find_tag(Tag::Unknown(TAG_MODEL_TRANSFORMATION))? {
        Some(v) => Some(v.into_f64_vec()?),
        None => None,
    };
    let scale = match decoder.find_tag(Tag::Unknown(TAG_MODEL_PIXEL_SCALE))? {
        Some(v) => Some(v.into_f64_vec()?),
        None => None,
    };
    let tiepoint = match decoder.find_tag(Tag::Unknown(TAG_MODEL_TIEPOINT))? {
        Some(v) => Some(v.into_f64_vec()?),
        None => None,
    };
    let gdal = match decoder.find_tag(Tag::Unknown(TAG_GDAL_METADATA))? {
        Some(v) => xml::parse(&v.into_string()?)?,
        None => xml::GdalMetadata::default(),
    };

    Ok(RasterInfo {
        width,
        height,
        bands,
        dtype: dtype_name(bits, format).to_string(),
        crs: crs_from_geokeys(&geokeys),
        transform: geotransform(transformation.as_deref(), scale.as_deref(), tiepoint.as_deref()),
        metadata: gdal.dataset,
        band_metadata: gdal.bands,
    })
}

/// Read a raster with its pixel data.
pub fn read_raster(path: &Path) -> Result<Raster, GeoError> {
    if !is_tiff(path)? {
        return worldfile::read_raster(path);
    }
    let mut decoder = open_decoder(path)?;
    let info = read_info_from(&mut decoder)?;
    let samples = Samples::from_decoding(decoder.read_image()?)?;
    let raster = Raster {
        width: info.width,
        height: info.height,
        bands: info.bands,
        samples,
        crs: info.crs,
        transform: info.transform,
        metadata: info.metadata,
        band_metadata: info.band_metadata,
    };
    raster.check_len()?;
    Ok(raster)
}

/// Write `raster` through the driver its extension selects. Returns the
/// driver used.
pub fn write_raster(path: &Path, raster: &Raster) -> Result<Driver, GeoError> {
    let driver = Driver::from_path(path);
    match driver {
        Driver::GTiff => write_geotiff(path, raster)?,
        Driver::Png | Driver::Jpeg => worldfile::write_raster(path, raster, driver)?,
        other => return Err(GeoError::UnsupportedDriver(other)),
    }
    Ok(driver)
}

fn dtype_name(bits: u16, format: u16) -> &'static str {
    match (bits, format) {
        (8, 1) => "uint8",
        (8, 2) => "int8",
        (16, 1) => "uint16",
        (16, 2) => "int16",
        (32, 1) => "uint32",
        (32, 2) => "int32",
        (32, 3) => "float32",
        (64, 3) => "float64",
        (1, _) => "bool",
        _ => "unknown",
    }
}

/// Inline (location 0) GeoKeys from a GeoKeyDirectory.
fn parse_geokeys(dir: &[u16]) -> BTreeMap<u16, u16> {
    let mut keys = BTreeMap::new();
    if dir.len() < 4 {
        return keys;
    }
    let count = dir[3] as usize;
    for entry in dir[4..].chunks_exact(4).take(count) {
        let (id, location, value) = (entry[0], entry[1], entry[3]);
        if location == 0 {
            keys.insert(id, value);
        }
    }
    keys
}

fn crs_from_geokeys(keys: &BTreeMap<u16, u16>) -> Option<String> {
    let code_key = match keys.get(&KEY_MODEL_TYPE) {
        Some(&MODEL_TYPE_GEOGRAPHIC) => Some(KEY_GEOGRAPHIC_TYPE),
        Some(&MODEL_TYPE_PROJECTED) => Some(KEY_PROJECTED_CS_TYPE),
        _ => None,
    };
    let code = match code_key {
        Some(k) => keys.get(&k).copied(),
        None => keys
            .get(&KEY_PROJECTED_CS_TYPE)
            .or_else(|| keys.get(&KEY_GEOGRAPHIC_TYPE))
            .copied(),
    }?;
    if code == 0 || code == USER_DEFINED {
        return None;
    }
    Some(format_epsg(code as u32))
}

/// Affine transform from ModelTransformation, or PixelScale + Tiepoint.
fn geotransform(transformation: Option<&[f64]>, scale: Option<&[f64]>, tiepoint: Option<&[f64]>) -> Affine {
    if let Some(m) = transformation
        && m.len() >= 8
    {
        return Affine::new(m[0], m[1], m[3], m[4], m[5], m[7]);
    }
    if let (Some(s), Some(t)) = (scale, tiepoint)
        && s.len() >= 2
        && t.len() >= 6
    {
        let (i, j, x, y) = (t[0], t[1], t[3], t[4]);
        return Affine::new(s[0], 0.0, x - i * s[0], 0.0, -s[1], y + j * s[1]);
    }
    Affine::identity()
}

fn geokey_directory(epsg: u32) -> Result<Vec<u16>, GeoError> {
    let code = u16::try_from(epsg)
        .map_err(|_| GeoError::UnsupportedCrs(format_epsg(epsg)))?;
    let (model, code_key) = if is_geographic(epsg) {
        (MODEL_TYPE_GEOGRAPHIC, KEY_GEOGRAPHIC_TYPE)
    } else {
        (MODEL_TYPE_PROJECTED, KEY_PROJECTED_CS_TYPE)
    };
    Ok(vec![
        1, 1, 0, 3, // version, revision, minor revision, key count
        KEY_MODEL_TYPE, 0, 1, model,
        KEY_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA,
        code_key, 0, 1, code,
    ])
}

/// Write `raster` as a single-strip, uncompressed GeoTIFF.
///
/// Not atomic: a failure part way through leaves a truncated file behind.
pub fn write_geotiff(path: &Path, raster: &Raster) -> Result<(), GeoError> {
    raster.check_len()?;
    let epsg = raster.crs.as_deref().map(parse_epsg).transpose()?;

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    {
        let mut encoder = TiffEncoder::new(&mut writer)?;
        let mut dir = encoder.image_directory()?;

        let bands = raster.bands;
        let bits = raster.samples.bits_per_sample();
        let rgb = bands >= 3 && bits <= 16 && raster.samples.sample_format() == 1;

        dir.write_tag(Tag::ImageWidth, raster.width)?;
        dir.write_tag(Tag::ImageLength, raster.height)?;
        dir.write_tag(Tag::BitsPerSample, vec![bits; bands].as_slice())?;
        dir.write_tag(Tag::Compression, 1u16)?;
        dir.write_tag(Tag::PhotometricInterpretation, if rgb { 2u16 } else { 1u16 })?;
        dir.write_tag(Tag::SamplesPerPixel, bands as u16)?;
        dir.write_tag(
            Tag::SampleFormat,
            vec![raster.samples.sample_format(); bands].as_slice(),
        )?;
        dir.write_tag(Tag::PlanarConfiguration, 1u16)?;
        dir.write_tag(Tag::RowsPerStrip, raster.height)?;

        let color_bands = if rgb { 3 } else { 1 };
        if bands > color_bands {
            let mut extra = vec![0u16; bands - color_bands];
            if rgb && bands == 4 {
                extra[0] = 2; // unassociated alpha
            }
            dir.write_tag(Tag::ExtraSamples, extra.as_slice())?;
        }

        let t = raster.transform;
        if t.b == 0.0 && t.d == 0.0 {
            dir.write_tag(
                Tag::Unknown(TAG_MODEL_PIXEL_SCALE),
                [t.a, -t.e, 0.0].as_slice(),
            )?;
            dir.write_tag(
                Tag::Unknown(TAG_MODEL_TIEPOINT),
                [0.0, 0.0, 0.0, t.c, t.f, 0.0].as_slice(),
            )?;
        } else {
            let matrix = [
                t.a, t.b, 0.0, t.c, //
                t.d, t.e, 0.0, t.f, //
                0.0, 0.0, 0.0, 0.0, //
                0.0, 0.0, 0.0, 1.0,
            ];
            dir.write_tag(Tag::Unknown(TAG_MODEL_TRANSFORMATION), matrix.as_slice())?;
        }
        if let Some(epsg) = epsg {
            let keys = geokey_directory(epsg)?;
            dir.write_tag(Tag::Unknown(TAG_GEO_KEY_DIRECTORY), keys.as_slice())?;
        }
        if !raster.metadata.is_empty() || !raster.band_metadata.is_empty() {
            let items = xml::gdal_metadata_xml(&raster.metadata, &raster.band_metadata)?;
            dir.write_tag(Tag::Unknown(TAG_GDAL_METADATA), items.as_str())?;
        }

        let offset = match &raster.samples {
            Samples::U8(v) => dir.write_data(v.as_slice())?,
            Samples::U16(v) => dir.write_data(v.as_slice())?,
            Samples::I16(v) => dir.write_data(v.as_slice())?,
            Samples::U32(v) => dir.write_data(v.as_slice())?,
            Samples::I32(v) => dir.write_data(v.as_slice())?,
            Samples::F32(v) => dir.write_data(v.as_slice())?,
            Samples::F64(v) => dir.write_data(v.as_slice())?,
        };
        let offset = u32::try_from(offset)
            .map_err(|_| GeoError::InvalidRaster("raster exceeds 4 GiB".to_string()))?;
        let byte_count = u32::try_from(raster.samples.len() * (bits as usize / 8))
            .map_err(|_| GeoError::InvalidRaster("raster exceeds 4 GiB".to_string()))?;
        dir.write_tag(Tag::StripOffsets, offset)?;
        dir.write_tag(Tag::StripByteCounts, byte_count)?;
        dir.finish()?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn utm_raster(samples: Samples, bands: usize) -> Raster {
        Raster {
            width: 4,
            height: 3,
            bands,
            samples,
            crs: Some("EPSG:32648".into()),
            transform: Affine::north_up(600_000.0, 1_200_000.0, 30.0, 30.0),
            metadata: BTreeMap::new(),
            band_metadata: BTreeMap::new(),
        }
    }

    // =========================================================================
    // Tag parsing
    // =========================================================================

    #[test]
    fn geokeys_projected() {
        let dir = geokey_directory(32648).unwrap();
        let keys = parse_geokeys(&dir);
        assert_eq!(keys.get(&KEY_MODEL_TYPE), Some(&MODEL_TYPE_PROJECTED));
        assert_eq!(crs_from_geokeys(&keys).as_deref(), Some("EPSG:32648"));
    }

    #[test]
    fn geokeys_geographic() {
        let keys = parse_geokeys(&geokey_directory(4326).unwrap());
        assert_eq!(crs_from_geokeys(&keys).as_deref(), Some("EPSG:4326"));
    }

    #[test]
    fn user_defined_crs_is_none() {
        let mut keys = BTreeMap::new();
        keys.insert(KEY_MODEL_TYPE, MODEL_TYPE_PROJECTED);
        keys.insert(KEY_PROJECTED_CS_TYPE, USER_DEFINED);
        assert_eq!(crs_from_geokeys(&keys), None);
    }

    #[test]
    fn geotransform_from_scale_and_tiepoint() {
        let t = geotransform(None, Some(&[30.0, 30.0, 0.0]), Some(&[0.0, 0.0, 0.0, 500.0, 900.0, 0.0]));
        assert_eq!(t, Affine::north_up(500.0, 900.0, 30.0, 30.0));
    }

    #[test]
    fn geotransform_from_offset_tiepoint() {
        let t = geotransform(None, Some(&[2.0, 2.0, 0.0]), Some(&[10.0, 5.0, 0.0, 500.0, 900.0, 0.0]));
        assert_eq!(t.apply(10.0, 5.0), (500.0, 900.0));
    }

    #[test]
    fn geotransform_from_matrix() {
        let m = [
            1.0, 0.5, 0.0, 100.0, 0.25, -1.0, 0.0, 200.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0,
        ];
        assert_eq!(
            geotransform(Some(&m), None, None),
            Affine::new(1.0, 0.5, 100.0, 0.25, -1.0, 200.0)
        );
    }

    #[test]
    fn missing_tags_give_identity() {
        assert!(geotransform(None, None, None).is_identity());
    }

    // =========================================================================
    // File I/O
    // =========================================================================

    #[test]
    fn write_then_read_uint8_rgba() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("rgba.tif");
        let data: Vec<u8> = (0..48).collect();
        let mut raster = utm_raster(Samples::U8(data), 4);
        raster.metadata.insert("AREA_OR_POINT".into(), "Area".into());
        raster
            .band_metadata
            .insert(3, BTreeMap::from([("NAME".to_string(), "alpha".to_string())]));
        write_geotiff(&path, &raster).unwrap();

        assert!(is_tiff(&path).unwrap());
        let back = read_raster(&path).unwrap();
        assert_eq!(back, raster);
    }

    #[test]
    fn write_then_read_float32_single_band() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("dem.tif");
        let data: Vec<f32> = (0..12).map(|v| v as f32 * 1.5 - 3.0).collect();
        let raster = utm_raster(Samples::F32(data), 1);
        write_geotiff(&path, &raster).unwrap();

        let info = read_info(&path).unwrap();
        assert_eq!(info.dtype, "float32");
        assert_eq!(info.bands, 1);
        assert_eq!(info.crs.as_deref(), Some("EPSG:32648"));
        assert_eq!(read_raster(&path).unwrap().samples, raster.samples);
    }

    #[test]
    fn write_int16_multiband() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bands.tif");
        let data: Vec<i16> = (0..24).map(|v| v - 12).collect();
        let raster = utm_raster(Samples::I16(data), 2);
        write_geotiff(&path, &raster).unwrap();
        let back = read_raster(&path).unwrap();
        assert_eq!(back.bands, 2);
        assert_eq!(back.samples, raster.samples);
    }

    #[test]
    fn plain_tiff_has_no_crs() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("plain.tif");
        image::RgbImage::new(5, 5).save(&path).unwrap();
        let info = read_info(&path).unwrap();
        assert_eq!(info.crs, None);
        assert!(info.transform.is_identity());
        assert_eq!(info.bands, 3);
    }

    #[test]
    fn write_raster_dispatches_on_extension() {
        let tmp = TempDir::new().unwrap();
        let raster = utm_raster(Samples::U8((0..36).collect()), 3);
        let png = tmp.path().join("scene.png");
        assert_eq!(write_raster(&png, &raster).unwrap(), Driver::Png);
        assert!(!is_tiff(&png).unwrap());
        let info = read_info(&png).unwrap();
        assert_eq!(info.crs.as_deref(), Some("EPSG:32648"));
        assert_eq!(read_raster(&png).unwrap().samples, raster.samples);

        assert_eq!(write_raster(&tmp.path().join("s.tiff"), &raster).unwrap(), Driver::GTiff);
        assert!(matches!(
            write_raster(&tmp.path().join("s.jp2"), &raster),
            Err(GeoError::UnsupportedDriver(Driver::Jp2OpenJpeg))
        ));
    }

    #[test]
    fn png_is_not_tiff() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("x.png");
        image::RgbImage::new(2, 2).save(&path).unwrap();
        assert!(!is_tiff(&path).unwrap());
    }

    #[test]
    fn sample_count_mismatch_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let raster = utm_raster(Samples::U8(vec![0; 5]), 1);
        assert!(matches!(
            write_geotiff(&tmp.path().join("bad.tif"), &raster),
            Err(GeoError::InvalidRaster(_))
        ));
    }

    #[test]
    fn remap_band_fills_unmapped_with_zero() {
        let src = Samples::U16(vec![1, 10, 2, 20]); // two pixels, two bands
        let mut dst = src.zeroed_like(6);
        let map = [Some(1), None, Some(0)];
        src.remap_band_into(&mut dst, &map, 2, 0).unwrap();
        src.remap_band_into(&mut dst, &map, 2, 1).unwrap();
        assert_eq!(dst, Samples::U16(vec![2, 20, 0, 0, 1, 10]));
    }
}
