//! Region-of-interest geometry.
//!
//! Regions come in as well-known-text polygons; everything downstream works
//! on the derived geographic bounding box and on reprojection parameters
//! computed from it.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{HindcastError, HindcastResult};

const EARTH_RADIUS_KM: f64 = 6371.0;

fn coord_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[-]?\d+\.\d+").expect("valid regex"))
}

/// A geographic rectangle in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoRect {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl GeoRect {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// Width in degrees of longitude.
    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    /// Height in degrees of latitude.
    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn area(&self) -> f64 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Check if this rectangle intersects another.
    pub fn intersects(&self, other: &GeoRect) -> bool {
        self.min_lon < other.max_lon
            && self.max_lon > other.min_lon
            && self.min_lat < other.max_lat
            && self.max_lat > other.min_lat
    }

    /// Compute the intersection of two rectangles.
    pub fn intersection(&self, other: &GeoRect) -> Option<GeoRect> {
        if !self.intersects(other) {
            return None;
        }
        Some(GeoRect {
            min_lon: self.min_lon.max(other.min_lon),
            min_lat: self.min_lat.max(other.min_lat),
            max_lon: self.max_lon.min(other.max_lon),
            max_lat: self.max_lat.min(other.max_lat),
        })
    }

    /// Check if another rectangle lies fully within this one.
    pub fn contains_rect(&self, other: &GeoRect) -> bool {
        other.min_lon >= self.min_lon
            && other.min_lat >= self.min_lat
            && other.max_lon <= self.max_lon
            && other.max_lat <= self.max_lat
    }

    /// Check if a point is contained within this rectangle.
    pub fn contains_point(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }
}

/// Reprojection parameters for a target grid derived from a region.
#[derive(Debug, Clone, PartialEq)]
pub struct ReprojectParams {
    pub easting: f64,
    pub northing: f64,
    pub pixel_size_x: f64,
    pub pixel_size_y: f64,
    pub width: usize,
    pub height: usize,
}

/// An ordered ring of (lon, lat) vertices parsed from WKT.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionPolygon {
    vertices: Vec<(f64, f64)>,
}

impl RegionPolygon {
    /// Parse a WKT POLYGON into its perimeter vertices.
    pub fn from_wkt(wkt: &str) -> HindcastResult<Self> {
        if !wkt.get(..7).map_or(false, |p| p.eq_ignore_ascii_case("polygon")) {
            return Err(HindcastError::InvalidWkt(wkt.to_string()));
        }
        let coords: Vec<f64> = coord_re()
            .find_iter(wkt)
            .filter_map(|m| m.as_str().parse().ok())
            .collect();
        let vertices: Vec<(f64, f64)> = coords
            .chunks_exact(2)
            .map(|c| (c[0], c[1]))
            .collect();
        if vertices.is_empty() {
            return Err(HindcastError::EmptyRegion);
        }
        Ok(Self { vertices })
    }

    /// Perimeter vertices as (lon, lat) pairs.
    pub fn vertices(&self) -> &[(f64, f64)] {
        &self.vertices
    }

    /// All longitudes of the perimeter corners.
    pub fn lons(&self) -> impl Iterator<Item = f64> + '_ {
        self.vertices.iter().map(|v| v.0)
    }

    /// All latitudes of the perimeter corners.
    pub fn lats(&self) -> impl Iterator<Item = f64> + '_ {
        self.vertices.iter().map(|v| v.1)
    }

    /// The geographic bounding box of the perimeter.
    ///
    /// Recomputed on every call; the polygon itself is immutable but nothing
    /// is cached across calls.
    pub fn bounds(&self) -> GeoRect {
        let mut rect = GeoRect::new(f64::MAX, f64::MAX, f64::MIN, f64::MIN);
        for (lon, lat) in &self.vertices {
            rect.min_lon = rect.min_lon.min(*lon);
            rect.min_lat = rect.min_lat.min(*lat);
            rect.max_lon = rect.max_lon.max(*lon);
            rect.max_lat = rect.max_lat.max(*lat);
        }
        rect
    }

    /// Target-grid reprojection parameters for a given resolution in meters.
    ///
    /// Pixel counts come from great-circle distances along the southern and
    /// western edges of the bounding box.
    pub fn reproject_params(&self, resolution_m: u32) -> ReprojectParams {
        let b = self.bounds();
        let x_dist = haversine_km((b.min_lat, b.min_lon), (b.min_lat, b.max_lon));
        let y_dist = haversine_km((b.min_lat, b.min_lon), (b.max_lat, b.min_lon));
        let res_km = f64::from(resolution_m) / 1000.0;
        let width = (x_dist / res_km).round().max(1.0) as usize;
        let height = (y_dist / res_km).round().max(1.0) as usize;

        ReprojectParams {
            easting: b.min_lon,
            northing: b.max_lat,
            pixel_size_x: b.width() / width as f64,
            pixel_size_y: b.height() / height as f64,
            width,
            height,
        }
    }
}

/// Great-circle distance in kilometers between two (lat, lon) points.
pub fn haversine_km(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    const WKT: &str = "POLYGON ((8.1 46.2, 8.6 46.2, 8.6 46.5, 8.1 46.5, 8.1 46.2))";

    #[test]
    fn parse_polygon_vertices() {
        let region = RegionPolygon::from_wkt(WKT).unwrap();
        assert_eq!(region.vertices().len(), 5);
        assert_eq!(region.vertices()[0], (8.1, 46.2));
    }

    #[test]
    fn rejects_non_polygon() {
        assert!(RegionPolygon::from_wkt("POINT (8.1 46.2)").is_err());
        assert!(RegionPolygon::from_wkt("").is_err());
    }

    #[test]
    fn lowercase_polygon_accepted() {
        assert!(RegionPolygon::from_wkt("polygon ((1.0 2.0, 3.0 4.0))").is_ok());
    }

    #[test]
    fn bounds_are_min_max() {
        let region = RegionPolygon::from_wkt(WKT).unwrap();
        let b = region.bounds();
        assert_eq!(b.min_lon, 8.1);
        assert_eq!(b.max_lon, 8.6);
        assert_eq!(b.min_lat, 46.2);
        assert_eq!(b.max_lat, 46.5);
    }

    #[test]
    fn reproject_params_roughly_match_resolution() {
        let region = RegionPolygon::from_wkt(WKT).unwrap();
        let p = region.reproject_params(300);
        // ~38 km east-west at 46.2N, ~33 km north-south.
        assert!(p.width > 100 && p.width < 160, "width = {}", p.width);
        assert!(p.height > 90 && p.height < 130, "height = {}", p.height);
        assert_eq!(p.easting, 8.1);
        assert_eq!(p.northing, 46.5);
        assert!((p.pixel_size_x * p.width as f64 - 0.5).abs() < 1e-9);
    }

    #[test]
    fn haversine_equator_degree() {
        // One degree of longitude at the equator is ~111 km.
        let d = haversine_km((0.0, 0.0), (0.0, 1.0));
        assert!((d - 111.19).abs() < 0.5, "d = {d}");
    }

    #[test]
    fn rect_intersection_and_containment() {
        let a = GeoRect::new(0.0, 0.0, 2.0, 2.0);
        let b = GeoRect::new(1.0, 1.0, 3.0, 3.0);
        let i = a.intersection(&b).unwrap();
        assert_eq!(i, GeoRect::new(1.0, 1.0, 2.0, 2.0));
        assert!(a.contains_rect(&i));
        assert!(!a.contains_rect(&b));
        assert!(a.intersection(&GeoRect::new(5.0, 5.0, 6.0, 6.0)).is_none());
    }
}
