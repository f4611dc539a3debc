//! Geospatial handling: CRS lookups, GeoTIFF I/O and reprojection.
//!
//! | Piece | Module |
//! |---|---|
//! | CRS table, EPSG parsing, point transforms (`proj4rs`) | [`crs`] |
//! | Pixel → world affine transforms | [`affine`] |
//! | Output drivers by extension | [`driver`] |
//! | Raster read/write, format dispatch, GeoTIFF tags (`tiff`) | [`raster`] |
//! | PNG/JPEG with world file and `.aux.xml` sidecar | [`worldfile`] |
//! | GDAL metadata XML (`quick_xml`) | [`xml`] |
//! | Destination grids, nearest-neighbour index maps | [`warp`] |
//! | [`GeoTransformEngine`] | [`engine`] |
//!
//! Rasters are processed whole and in memory; there is no tiling.

pub mod affine;
pub mod crs;
pub mod driver;
pub mod engine;
pub mod raster;
pub mod warp;
pub mod worldfile;
pub mod xml;

pub use affine::{Affine, Bounds};
pub use crs::{COMMON_CRS, CoordTransformer, crs_for_display_name, display_name_for_crs, is_crs_identifier};
pub use driver::Driver;
pub use engine::{GeoMetadata, GeoTransformEngine, Georef, ReprojectOptions, update_geo_metadata_scale};
pub use raster::{Raster, RasterInfo, Samples, read_info, read_raster, write_raster};
pub use warp::{Grid, Verbosity};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("metadata XML error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("no CRS found for {0}")]
    MissingCrs(String),
    #[error("unsupported CRS: {0}")]
    UnsupportedCrs(String),
    #[error("invalid CRS: {0}")]
    InvalidCrs(String),
    #[error("projection error: {0}")]
    Projection(String),
    #[error("driver {0} cannot write rasters")]
    UnsupportedDriver(Driver),
    #[error("image is {actual_width}x{actual_height}, expected {width}x{height}")]
    DimensionMismatch {
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },
    #[error("invalid raster: {0}")]
    InvalidRaster(String),
}

impl GeoError {
    /// Read/write failures and CRS problems, as opposed to unexpected errors.
    pub fn is_io_or_crs(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::Tiff(_)
                | Self::Image(_)
                | Self::Xml(_)
                | Self::MissingCrs(_)
                | Self::UnsupportedCrs(_)
                | Self::InvalidCrs(_)
                | Self::Projection(_)
        )
    }
}
