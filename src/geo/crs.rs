//! CRS identifiers, proj definitions, and point transforms.
//!
//! The processing core always works with `AUTHORITY:CODE` strings
//! (`EPSG:4326`). Only EPSG codes with a known proj definition can be used
//! for reprojection; anything else is reported as [`GeoError::UnsupportedCrs`].
//!
//! | Code | Definition |
//! |---|---|
//! | 4326 | WGS 84 geographic |
//! | 4269 | NAD83 geographic |
//! | 4756 | VN-2000 geographic |
//! | 3857 | Web Mercator |
//! | 3405, 3406 | VN-2000 / UTM 48N, 49N |
//! | 32601-32660 | WGS 84 / UTM north |
//! | 32701-32760 | WGS 84 / UTM south |

use super::GeoError;
use proj4rs::proj::Proj;
use proj4rs::transform::transform;

/// Display names for the CRS choices offered to users, and their codes.
pub const COMMON_CRS: &[(&str, &str)] = &[
    ("WGS 84 (EPSG:4326)", "EPSG:4326"),
    ("Web Mercator (EPSG:3857)", "EPSG:3857"),
    ("UTM Zone 48N - VN (EPSG:32648)", "EPSG:32648"),
    ("UTM Zone 49N - VN (EPSG:32649)", "EPSG:32649"),
    ("VN-2000 (EPSG:9210)", "EPSG:9210"),
];

/// Seven-parameter datum shift from VN-2000 to WGS 84.
const VN2000_TOWGS84: &str =
    "-191.90441429,-39.30318279,-111.45032835,-0.00928836,0.01975479,-0.00427372,0.252906278";

pub fn crs_for_display_name(name: &str) -> Option<&'static str> {
    COMMON_CRS
        .iter()
        .find(|(display, _)| *display == name)
        .map(|(_, code)| *code)
}

pub fn display_name_for_crs(code: &str) -> Option<&'static str> {
    COMMON_CRS
        .iter()
        .find(|(_, c)| c.eq_ignore_ascii_case(code))
        .map(|(display, _)| *display)
}

/// True for strings shaped like `AUTHORITY:CODE`.
pub fn is_crs_identifier(s: &str) -> bool {
    match s.trim().split_once(':') {
        Some((authority, code)) => {
            !authority.is_empty()
                && authority.chars().all(|c| c.is_ascii_alphabetic())
                && !code.is_empty()
                && code.chars().all(|c| c.is_ascii_alphanumeric())
        }
        None => false,
    }
}

/// Parse `EPSG:<code>` (authority case-insensitive) into the numeric code.
pub fn parse_epsg(s: &str) -> Result<u32, GeoError> {
    let s = s.trim();
    let (authority, code) = s
        .split_once(':')
        .ok_or_else(|| GeoError::InvalidCrs(s.to_string()))?;
    if !authority.eq_ignore_ascii_case("EPSG") {
        return Err(GeoError::UnsupportedCrs(s.to_string()));
    }
    code.parse::<u32>()
        .map_err(|_| GeoError::InvalidCrs(s.to_string()))
}

pub fn format_epsg(code: u32) -> String {
    format!("EPSG:{code}")
}

pub fn is_geographic(epsg: u32) -> bool {
    matches!(epsg, 4326 | 4269 | 4756)
}

/// Proj definition for an EPSG code, if known.
pub fn proj_string(epsg: u32) -> Option<String> {
    let def = match epsg {
        4326 => "+proj=longlat +datum=WGS84 +no_defs".to_string(),
        4269 => "+proj=longlat +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +no_defs".to_string(),
        4756 => format!("+proj=longlat +ellps=WGS84 +towgs84={VN2000_TOWGS84} +no_defs"),
        3857 => "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +no_defs"
            .to_string(),
        3405 | 3406 => format!(
            "+proj=utm +zone={} +ellps=WGS84 +towgs84={VN2000_TOWGS84} +units=m +no_defs",
            if epsg == 3405 { 48 } else { 49 }
        ),
        32601..=32660 => format!("+proj=utm +zone={} +datum=WGS84 +units=m +no_defs", epsg - 32600),
        32701..=32760 => format!(
            "+proj=utm +zone={} +south +datum=WGS84 +units=m +no_defs",
            epsg - 32700
        ),
        _ => return None,
    };
    Some(def)
}

fn build_proj(epsg: u32) -> Result<Proj, GeoError> {
    let def = proj_string(epsg).ok_or_else(|| GeoError::UnsupportedCrs(format_epsg(epsg)))?;
    Proj::from_proj_string(&def)
        .map_err(|e| GeoError::Projection(format!("invalid definition for EPSG:{epsg}: {e:?}")))
}

/// Point transformer between two EPSG codes.
///
/// Geographic coordinates are taken and returned in degrees.
pub struct CoordTransformer {
    source_epsg: u32,
    target_epsg: u32,
    /// `None` when source and target are the same CRS.
    projs: Option<(Proj, Proj)>,
}

impl std::fmt::Debug for CoordTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordTransformer")
            .field("source_epsg", &self.source_epsg)
            .field("target_epsg", &self.target_epsg)
            .finish_non_exhaustive()
    }
}

impl CoordTransformer {
    pub fn new(source_epsg: u32, target_epsg: u32) -> Result<Self, GeoError> {
        let projs = if source_epsg == target_epsg {
            // Still reject unknown codes so errors surface the same way.
            proj_string(source_epsg)
                .ok_or_else(|| GeoError::UnsupportedCrs(format_epsg(source_epsg)))?;
            None
        } else {
            Some((build_proj(source_epsg)?, build_proj(target_epsg)?))
        };
        Ok(Self {
            source_epsg,
            target_epsg,
            projs,
        })
    }

    pub fn from_identifiers(source: &str, target: &str) -> Result<Self, GeoError> {
        Self::new(parse_epsg(source)?, parse_epsg(target)?)
    }

    /// The transformer for the opposite direction.
    pub fn inverse(&self) -> Result<Self, GeoError> {
        Self::new(self.target_epsg, self.source_epsg)
    }

    pub fn transform(&self, x: f64, y: f64) -> Result<(f64, f64), GeoError> {
        let Some((source, target)) = &self.projs else {
            return Ok((x, y));
        };
        let (in_x, in_y) = if is_geographic(self.source_epsg) {
            (x.to_radians(), y.to_radians())
        } else {
            (x, y)
        };

        let mut point = (in_x, in_y, 0.0);
        transform(source, target, &mut point)
            .map_err(|e| GeoError::Projection(format!("transform failed: {e:?}")))?;

        let out = if is_geographic(self.target_epsg) {
            (point.0.to_degrees(), point.1.to_degrees())
        } else {
            (point.0, point.1)
        };
        if out.0.is_finite() && out.1.is_finite() {
            Ok(out)
        } else {
            Err(GeoError::Projection(format!(
                "point ({x}, {y}) has no image in EPSG:{}",
                self.target_epsg
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_lookup() {
        assert_eq!(crs_for_display_name("WGS 84 (EPSG:4326)"), Some("EPSG:4326"));
        assert_eq!(crs_for_display_name("Mars 2000"), None);
        assert_eq!(
            display_name_for_crs("epsg:32648"),
            Some("UTM Zone 48N - VN (EPSG:32648)")
        );
    }

    #[test]
    fn identifier_shape() {
        assert!(is_crs_identifier("EPSG:4326"));
        assert!(is_crs_identifier("ESRI:102100"));
        assert!(!is_crs_identifier("4326"));
        assert!(!is_crs_identifier("EPSG:"));
        assert!(!is_crs_identifier("EPSG 4326"));
    }

    #[test]
    fn parse_epsg_codes() {
        assert_eq!(parse_epsg("EPSG:32648").unwrap(), 32648);
        assert_eq!(parse_epsg(" epsg:4326 ").unwrap(), 4326);
        assert!(matches!(parse_epsg("EPSG:abc"), Err(GeoError::InvalidCrs(_))));
        assert!(matches!(parse_epsg("ESRI:102100"), Err(GeoError::UnsupportedCrs(_))));
    }

    #[test]
    fn proj_table_covers_utm_zones() {
        assert!(proj_string(32648).unwrap().contains("+zone=48"));
        assert!(proj_string(32733).unwrap().contains("+south"));
        assert!(proj_string(9210).is_none());
    }

    #[test]
    fn identity_transform_is_exact() {
        let t = CoordTransformer::new(4326, 4326).unwrap();
        assert_eq!(t.transform(105.85, 21.03).unwrap(), (105.85, 21.03));
    }

    #[test]
    fn unsupported_code_is_rejected() {
        assert!(matches!(
            CoordTransformer::new(9210, 4326),
            Err(GeoError::UnsupportedCrs(code)) if code == "EPSG:9210"
        ));
        assert!(CoordTransformer::new(9210, 9210).is_err());
    }

    #[test]
    fn utm_central_meridian_maps_to_105_east() {
        // Zone 48 central meridian is 105°E; false easting is 500 km.
        let t = CoordTransformer::new(32648, 4326).unwrap();
        let (lon, lat) = t.transform(500_000.0, 0.0).unwrap();
        assert!((lon - 105.0).abs() < 1e-6, "lon {lon}");
        assert!(lat.abs() < 1e-6, "lat {lat}");
    }

    #[test]
    fn mercator_round_trip() {
        let fwd = CoordTransformer::new(4326, 3857).unwrap();
        let back = fwd.inverse().unwrap();
        let (x, y) = fwd.transform(106.7, 10.8).unwrap();
        let (lon, lat) = back.transform(x, y).unwrap();
        assert!((lon - 106.7).abs() < 1e-7);
        assert!((lat - 10.8).abs() < 1e-7);
    }
}
