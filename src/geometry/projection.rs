//! EPSG lookups and coordinate transforms.
//!
//! Projection strings come from the `crs-definitions` database and are
//! executed by `proj4rs`, so no system PROJ installation is needed.

use proj4rs::proj::Proj;
use proj4rs::transform::transform;

/// EPSG code of WGS84 geographic coordinates.
pub const WGS84: i32 = 4326;

/// Project a point from one CRS to another using pure Rust (proj4rs + crs-definitions).
///
/// Geographic coordinates are in degrees on both sides.
///
/// # Errors
/// Returns an error if the EPSG code is not supported or the projection transformation fails.
#[inline]
pub fn project_point(source_epsg: i32, target_epsg: i32, x: f64, y: f64) -> Result<(f64, f64), String> {
    // No-op if same CRS
    if source_epsg == target_epsg {
        return Ok((x, y));
    }

    CrsTransformer::new(source_epsg, target_epsg)?.transform(x, y)
}

/// Get PROJ4 string for an EPSG code using the crs-definitions database
#[inline]
#[must_use]
pub fn get_proj_string(epsg: i32) -> Option<&'static str> {
    u16::try_from(epsg).ok()
        .and_then(crs_definitions::from_code)
        .map(|def| def.proj4)
}

/// Check if an EPSG code represents a geographic (lon/lat) CRS
#[inline]
#[must_use]
pub fn is_geographic_crs(epsg: i32) -> bool {
    if let Some(proj_str) = get_proj_string(epsg) {
        proj_str.contains("+proj=longlat")
    } else {
        // Fallback: assume 4326 and similar are geographic
        epsg == WGS84 || (4000..5000).contains(&epsg)
    }
}

/// Reusable transformer between two EPSG codes.
///
/// Parsing the projection strings is the expensive part of a transform, so
/// callers that move many points (raster alignment, layer reprojection)
/// build one transformer and reuse it.
pub struct CrsTransformer {
    source_epsg: i32,
    target_epsg: i32,
    /// `None` when source and target are the same CRS
    projs: Option<(Proj, Proj)>,
    /// True if source uses degrees (needs radian conversion)
    source_is_geographic: bool,
    /// True if target uses degrees (needs radian conversion)
    target_is_geographic: bool,
}

impl CrsTransformer {
    /// Create a transformer from `source_epsg` to `target_epsg`.
    ///
    /// # Errors
    /// Returns an error if either code is missing from the database or its
    /// projection string cannot be parsed.
    pub fn new(source_epsg: i32, target_epsg: i32) -> Result<Self, String> {
        if source_epsg == target_epsg {
            return Ok(Self {
                source_epsg,
                target_epsg,
                projs: None,
                source_is_geographic: false,
                target_is_geographic: false,
            });
        }

        let source_str = get_proj_string(source_epsg)
            .ok_or_else(|| format!("EPSG:{source_epsg} is not in the crs-definitions database"))?;
        let target_str = get_proj_string(target_epsg)
            .ok_or_else(|| format!("EPSG:{target_epsg} is not in the crs-definitions database"))?;

        let source_proj = Proj::from_proj_string(source_str)
            .map_err(|e| format!("Invalid source projection EPSG:{source_epsg}: {e:?}"))?;
        let target_proj = Proj::from_proj_string(target_str)
            .map_err(|e| format!("Invalid target projection EPSG:{target_epsg}: {e:?}"))?;

        Ok(Self {
            source_epsg,
            target_epsg,
            projs: Some((source_proj, target_proj)),
            source_is_geographic: is_geographic_crs(source_epsg),
            target_is_geographic: is_geographic_crs(target_epsg),
        })
    }

    /// True when no transformation takes place.
    #[inline]
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.projs.is_none()
    }

    /// Source EPSG code.
    #[must_use]
    pub fn source_epsg(&self) -> i32 {
        self.source_epsg
    }

    /// Target EPSG code.
    #[must_use]
    pub fn target_epsg(&self) -> i32 {
        self.target_epsg
    }

    /// Transform coordinates from source CRS to target CRS
    ///
    /// # Errors
    /// Returns an error if proj4rs fails or yields non-finite coordinates.
    pub fn transform(&self, x: f64, y: f64) -> Result<(f64, f64), String> {
        let Some((source_proj, target_proj)) = &self.projs else {
            return Ok((x, y));
        };

        // proj4rs uses radians for geographic coordinates
        let (x_in, y_in) = if self.source_is_geographic {
            (x.to_radians(), y.to_radians())
        } else {
            (x, y)
        };

        let mut point = (x_in, y_in, 0.0);
        transform(source_proj, target_proj, &mut point).map_err(|e| {
            format!(
                "Transform from EPSG:{} to EPSG:{} failed: {e:?}",
                self.source_epsg, self.target_epsg
            )
        })?;

        let (out_x, out_y) = if self.target_is_geographic {
            (point.0.to_degrees(), point.1.to_degrees())
        } else {
            (point.0, point.1)
        };

        if !out_x.is_finite() || !out_y.is_finite() {
            return Err(format!(
                "Transform from EPSG:{} to EPSG:{} produced non-finite coordinates for ({x}, {y})",
                self.source_epsg, self.target_epsg
            ));
        }

        Ok((out_x, out_y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < EPS
    }

    #[test]
    fn test_project_point_same_crs() {
        let (x, y) = project_point(4326, 4326, 10.0, 51.5).unwrap();
        assert!(approx_eq(x, 10.0));
        assert!(approx_eq(y, 51.5));
    }

    #[test]
    fn test_project_point_to_utm() {
        // EPSG:32633 is UTM zone 33N
        let result = project_point(4326, 32633, 15.0, 52.0);
        assert!(result.is_ok(), "Should support UTM zones: {:?}", result);
        let (x, y) = result.unwrap();
        // Zone central meridian is 15E, so easting sits at the false easting
        assert!((x - 500_000.0).abs() < 1.0, "UTM easting: {}", x);
        assert!(y > 5_000_000.0 && y < 6_000_000.0, "UTM northing: {}", y);
    }

    #[test]
    fn test_project_point_roundtrip_utm44() {
        // UTM 44N is the default grid CRS of the point conversion
        let (lon, lat) = (81.0, 17.5);
        let (x, y) = project_point(4326, 32644, lon, lat).unwrap();
        let (lon2, lat2) = project_point(32644, 4326, x, y).unwrap();
        assert!((lon - lon2).abs() < 1e-5, "lon roundtrip: {} -> {}", lon, lon2);
        assert!((lat - lat2).abs() < 1e-5, "lat roundtrip: {} -> {}", lat, lat2);
    }

    #[test]
    fn test_transformer_reuse_matches_project_point() {
        let t = CrsTransformer::new(32610, 4326).unwrap();
        assert!(!t.is_identity());
        for (x, y) in [(551_000.0, 4_185_000.0), (500_000.0, 4_000_000.0)] {
            let a = t.transform(x, y).unwrap();
            let b = project_point(32610, 4326, x, y).unwrap();
            assert!(approx_eq(a.0, b.0) && approx_eq(a.1, b.1));
        }
    }

    #[test]
    fn test_identity_transformer() {
        let t = CrsTransformer::new(32644, 32644).unwrap();
        assert!(t.is_identity());
        assert_eq!(t.transform(1.0, 2.0).unwrap(), (1.0, 2.0));
    }

    #[test]
    fn test_is_geographic_crs() {
        assert!(is_geographic_crs(4326), "4326 is geographic");
        assert!(!is_geographic_crs(3857), "3857 is projected");
        assert!(!is_geographic_crs(32644), "UTM is projected");
    }

    #[test]
    fn test_unsupported_epsg_code() {
        let result = project_point(4326, 999999, 0.0, 0.0);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("not in the crs-definitions database"));
    }

    #[test]
    fn test_utm_zone_coverage() {
        let unsupported: Vec<i32> = (1..=60)
            .flat_map(|zone| [32600 + zone, 32700 + zone])
            .filter(|code| get_proj_string(*code).is_none())
            .collect();
        assert!(unsupported.is_empty(), "Unsupported UTM zones: {:?}", unsupported);
    }
}
