//! Destination grids and nearest-neighbour resampling.
//!
//! A reprojection has two halves. [`default_transform`] finds the smallest
//! north-up grid in the target CRS that contains the whole source extent.
//! [`nearest_index_map`] then walks that grid, sending each pixel centre back
//! into the source raster; the resulting map of source pixel indices is
//! applied to every band with [`Samples::remap_band_into`](super::raster::Samples::remap_band_into).

use super::GeoError;
use super::affine::Affine;
use super::crs::CoordTransformer;

/// Points sampled along each edge of the source extent.
const EDGE_SAMPLES: usize = 21;

/// Step logging for a reprojection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    #[default]
    Quiet,
    /// Log open, CRS resolution, transform, allocation, per-band resampling
    /// and write as separate entries.
    Steps,
}

/// A raster grid: transform plus pixel dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    pub transform: Affine,
    pub width: u32,
    pub height: u32,
}

impl Grid {
    pub fn new(transform: Affine, width: u32, height: u32) -> Self {
        Self {
            transform,
            width,
            height,
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Pixel-space points along the four edges of a `width` × `height` raster.
fn edge_points(width: u32, height: u32) -> Vec<(f64, f64)> {
    let (w, h) = (width as f64, height as f64);
    let steps = (EDGE_SAMPLES - 1) as f64;
    let mut points = Vec::with_capacity(EDGE_SAMPLES * 4);
    for i in 0..EDGE_SAMPLES {
        let t = i as f64 / steps;
        points.push((t * w, 0.0));
        points.push((t * w, h));
        points.push((0.0, t * h));
        points.push((w, t * h));
    }
    points
}

/// Smallest north-up grid in the target CRS containing the source extent.
///
/// The pixel size keeps the source's pixel count along the diagonal, so an
/// identity reprojection of a north-up raster reproduces the source grid.
pub fn default_transform(transformer: &CoordTransformer, source: &Grid) -> Result<Grid, GeoError> {
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    let mut projected = 0usize;

    for (col, row) in edge_points(source.width, source.height) {
        let (wx, wy) = source.transform.apply(col, row);
        // Points outside the target projection's domain are skipped.
        let Ok((x, y)) = transformer.transform(wx, wy) else {
            continue;
        };
        min_x = min_x.min(x);
        max_x = max_x.max(x);
        min_y = min_y.min(y);
        max_y = max_y.max(y);
        projected += 1;
    }
    if projected == 0 {
        return Err(GeoError::Projection(
            "no part of the source extent maps into the target CRS".to_string(),
        ));
    }

    let extent_x = max_x - min_x;
    let extent_y = max_y - min_y;
    let diagonal_pixels = (source.width as f64).hypot(source.height as f64);
    let res = extent_x.hypot(extent_y) / diagonal_pixels;
    if !res.is_finite() || res <= 0.0 {
        return Err(GeoError::Projection(format!(
            "degenerate target extent {extent_x} x {extent_y}"
        )));
    }

    let width = ((extent_x / res) - 1e-9).ceil().max(1.0) as u32;
    let height = ((extent_y / res) - 1e-9).ceil().max(1.0) as u32;
    Ok(Grid::new(Affine::north_up(min_x, max_y, res, res), width, height))
}

/// For every destination pixel, the index of the source pixel whose area
/// contains the destination pixel centre, or `None` outside the source.
///
/// `to_source` maps destination CRS coordinates to source CRS coordinates.
pub fn nearest_index_map(
    to_source: &CoordTransformer,
    source: &Grid,
    destination: &Grid,
) -> Result<Vec<Option<usize>>, GeoError> {
    let inverse = source.transform.inverse().ok_or_else(|| {
        GeoError::InvalidRaster("source transform is not invertible".to_string())
    })?;
    let (src_w, src_h) = (source.width as f64, source.height as f64);

    let mut map = Vec::with_capacity(destination.pixel_count());
    for row in 0..destination.height {
        for col in 0..destination.width {
            let (x, y) = destination
                .transform
                .apply(col as f64 + 0.5, row as f64 + 0.5);
            let index = to_source.transform(x, y).ok().and_then(|(sx, sy)| {
                let (c, r) = inverse.apply(sx, sy);
                (c >= 0.0 && r >= 0.0 && c < src_w && r < src_h)
                    .then(|| r.floor() as usize * source.width as usize + c.floor() as usize)
            });
            map.push(index);
        }
    }
    Ok(map)
}
