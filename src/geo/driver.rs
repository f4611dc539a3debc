//! Raster output drivers, selected by file extension.
//!
//! | Extension | Driver | Writable |
//! |---|---|---|
//! | `.tif`, `.tiff` | `GTiff` | yes |
//! | `.png` | `PNG` | yes, with world file and `.aux.xml` |
//! | `.jpg`, `.jpeg` | `JPEG` | yes, with world file and `.aux.xml` |
//! | `.vrt` | `VRT` | no |
//! | `.jp2` | `JP2OpenJPEG` | no |
//! | `.img` | `HFA` | no |
//! | `.nc` | `netCDF` | no |
//! | `.grd` | `AIG` | no |
//! | `.mbtiles` | `MBTiles` | no |
//! | `.gpkg` | `GPKG` | no |
//! | `.shp` | `ESRI Shapefile` | no |
//!
//! Unrecognized extensions fall back to `GTiff`. Writing through a driver that
//! is not writable fails with [`GeoError::UnsupportedDriver`](super::GeoError).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Driver {
    #[default]
    #[serde(rename = "GTiff")]
    GTiff,
    #[serde(rename = "PNG")]
    Png,
    #[serde(rename = "JPEG")]
    Jpeg,
    #[serde(rename = "VRT")]
    Vrt,
    #[serde(rename = "JP2OpenJPEG")]
    Jp2OpenJpeg,
    #[serde(rename = "HFA")]
    Hfa,
    #[serde(rename = "netCDF")]
    NetCdf,
    #[serde(rename = "AIG")]
    Aig,
    #[serde(rename = "MBTiles")]
    MbTiles,
    #[serde(rename = "GPKG")]
    GeoPackage,
    #[serde(rename = "ESRI Shapefile")]
    Shapefile,
}

const EXTENSIONS: &[(&str, Driver)] = &[
    ("tif", Driver::GTiff),
    ("tiff", Driver::GTiff),
    ("png", Driver::Png),
    ("jpg", Driver::Jpeg),
    ("jpeg", Driver::Jpeg),
    ("vrt", Driver::Vrt),
    ("jp2", Driver::Jp2OpenJpeg),
    ("img", Driver::Hfa),
    ("nc", Driver::NetCdf),
    ("grd", Driver::Aig),
    ("mbtiles", Driver::MbTiles),
    ("gpkg", Driver::GeoPackage),
    ("shp", Driver::Shapefile),
];

const ALL: &[Driver] = &[
    Driver::GTiff,
    Driver::Png,
    Driver::Jpeg,
    Driver::Vrt,
    Driver::Jp2OpenJpeg,
    Driver::Hfa,
    Driver::NetCdf,
    Driver::Aig,
    Driver::MbTiles,
    Driver::GeoPackage,
    Driver::Shapefile,
];

impl Driver {
    /// Driver for an extension (with or without the dot), if known.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_lowercase();
        EXTENSIONS
            .iter()
            .find(|(e, _)| *e == ext)
            .map(|(_, d)| *d)
    }

    /// Driver for an output path; unknown or missing extensions give `GTiff`.
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
            .unwrap_or_default()
    }

    /// Look up by driver name (`"GTiff"`, case-insensitive) or by the
    /// `"Label (.ext)"` form used in settings.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        if let Some(found) = ALL.iter().find(|d| d.name().eq_ignore_ascii_case(name)) {
            return Some(*found);
        }
        let ext = name.rsplit_once("(.")?.1.trim_end_matches(')');
        Self::from_extension(ext)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::GTiff => "GTiff",
            Self::Png => "PNG",
            Self::Jpeg => "JPEG",
            Self::Vrt => "VRT",
            Self::Jp2OpenJpeg => "JP2OpenJPEG",
            Self::Hfa => "HFA",
            Self::NetCdf => "netCDF",
            Self::Aig => "AIG",
            Self::MbTiles => "MBTiles",
            Self::GeoPackage => "GPKG",
            Self::Shapefile => "ESRI Shapefile",
        }
    }

    /// Extension (with dot) used when this driver names an output file.
    pub fn native_extension(self) -> &'static str {
        match self {
            Self::GTiff => ".tif",
            Self::Png => ".png",
            Self::Jpeg => ".jpg",
            Self::Vrt => ".vrt",
            Self::Jp2OpenJpeg => ".jp2",
            Self::Hfa => ".img",
            Self::NetCdf => ".nc",
            Self::Aig => ".grd",
            Self::MbTiles => ".mbtiles",
            Self::GeoPackage => ".gpkg",
            Self::Shapefile => ".shp",
        }
    }

    /// Whether rasters with georeferencing can be written through this driver.
    pub fn can_write(self) -> bool {
        matches!(self, Self::GTiff | Self::Png | Self::Jpeg)
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
