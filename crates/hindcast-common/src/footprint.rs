//! Tile footprints and subset-necessity analysis.
//!
//! For a group of adjacent tiles sharing one sensing date, the reducer works
//! out which tiles are actually needed to cover the region of interest, so
//! redundant tiles never reach the processing stages.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::region::{GeoRect, RegionPolygon};

/// How a product's raster is geolocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeocodingKind {
    /// Every pixel carries its own coordinates.
    PerPixel,
    /// Coordinates are interpolated from a coarse tie-point grid.
    TiePoint,
}

/// Linear geocoding of one tile's raster.
///
/// Rows count from the northern edge, columns from the western edge, both
/// 1-based as in the raster windows consumed by the processing engine.
#[derive(Debug, Clone, PartialEq)]
pub struct TileGeocoding {
    pub width: i64,
    pub height: i64,
    pub west: f64,
    pub north: f64,
    pub lon_step: f64,
    pub lat_step: f64,
}

impl TileGeocoding {
    /// Build a geocoding from a tile's geographic extent and raster size.
    pub fn from_extent(extent: GeoRect, width: i64, height: i64) -> Self {
        Self {
            width,
            height,
            west: extent.min_lon,
            north: extent.max_lat,
            lon_step: extent.width() / width as f64,
            lat_step: extent.height() / height as f64,
        }
    }

    /// The tile's geographic extent.
    pub fn extent(&self) -> GeoRect {
        GeoRect::new(
            self.west,
            self.north - self.lat_step * self.height as f64,
            self.west + self.lon_step * self.width as f64,
            self.north,
        )
    }

    /// Fractional (row, col) raster position of a geographic point.
    pub fn pixel_pos(&self, lon: f64, lat: f64) -> (f64, f64) {
        let col = (lon - self.west) / self.lon_step;
        let row = (self.north - lat) / self.lat_step;
        (row, col)
    }

    fn in_bounds(&self, row: f64, col: f64) -> bool {
        row > 0.0 && col > 0.0 && row <= self.height as f64 && col <= self.width as f64
    }
}

/// Raster window of a footprint: 1-based start position plus size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub row: i64,
    pub col: i64,
    pub width: i64,
    pub height: i64,
}

/// Corner pixel positions (row, col) of the region within one tile's raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileFootprint {
    pub ul: [i64; 2],
    pub ur: [i64; 2],
    pub lr: [i64; 2],
    pub ll: [i64; 2],
}

impl TileFootprint {
    /// The enclosing raster window, or `None` when the footprint is empty.
    pub fn window(&self) -> Option<PixelWindow> {
        let rows = [self.ul[0], self.ur[0], self.lr[0], self.ll[0]];
        let cols = [self.ul[1], self.ur[1], self.lr[1], self.ll[1]];
        let row = rows[0].min(rows[1]).min(rows[2]).min(rows[3]);
        let col = cols[0].min(cols[1]).min(cols[2]).min(cols[3]);
        let height = rows[0].max(rows[1]).max(rows[2]).max(rows[3]) - row;
        let width = cols[0].max(cols[1]).max(cols[2]).max(cols[3]) - col;
        if width <= 0 || height <= 0 {
            return None;
        }
        Some(PixelWindow {
            row,
            col,
            width,
            height,
        })
    }
}

/// Compute the corner pixels of the region's bounding box in a tile raster.
///
/// Corners falling outside the raster are reconstructed from the raster
/// edges. The reconstruction is a case table over the in-bounds pattern of
/// the four corners: one arm per single missing corner, one per pair of
/// adjacent corners missing on each side, and the north/south arms extend to
/// the three-corner patterns the sides share. The resulting corners are
/// finally clamped into the raster, so a tile that does not touch the region
/// at all still yields a (meaningless) edge window; callers pair this with a
/// geographic intersection test.
pub fn corner_pixels(tile: &TileGeocoding, region: &RegionPolygon) -> TileFootprint {
    let b = region.bounds();

    let p_ul = tile.pixel_pos(b.min_lon, b.max_lat);
    let p_ur = tile.pixel_pos(b.max_lon, b.max_lat);
    let p_lr = tile.pixel_pos(b.max_lon, b.min_lat);
    let p_ll = tile.pixel_pos(b.min_lon, b.min_lat);

    let ul_in = tile.in_bounds(p_ul.0, p_ul.1);
    let ur_in = tile.in_bounds(p_ur.0, p_ur.1);
    let lr_in = tile.in_bounds(p_lr.0, p_lr.1);
    let ll_in = tile.in_bounds(p_ll.0, p_ll.1);

    let mut ul = [p_ul.0.floor() as i64, p_ul.1.floor() as i64];
    let mut ur = [p_ur.0.floor() as i64, p_ur.1.floor() as i64];
    let mut lr = [p_lr.0.ceil() as i64, p_lr.1.ceil() as i64];
    let mut ll = [p_ll.0.ceil() as i64, p_ll.1.ceil() as i64];

    let (w, h) = (tile.width, tile.height);

    match (ul_in, ur_in, ll_in, lr_in) {
        (true, true, true, true) => {}

        // Region extends past the northern edge...
        // ...and past the western edge (only LR inside).
        (false, false, false, _) => {
            ul = [1, 1];
            ur = [1, lr[1]];
            ll = [lr[0], 1];
        }
        // ...and past the eastern edge (only LL inside).
        (false, false, true, false) => {
            ul = [1, ll[1]];
            ur = [1, w];
            lr = [ll[0], w];
        }
        (false, false, true, true) => {
            ul = [1, ll[1]];
            ur = [1, lr[1]];
        }

        // Region extends past the southern edge...
        // ...and past the western edge (only UR inside).
        (false, true, false, false) => {
            ul = [ur[0], 1];
            lr = [h, ur[1]];
            ll = [h, 1];
        }
        // ...and past the eastern edge (only UL inside).
        (true, false, false, false) => {
            ll = [h, ul[1]];
            ur = [ul[0], w];
            lr = [h, w];
        }
        (true, true, false, false) => {
            ll = [h, ul[1]];
            lr = [h, ur[1]];
        }

        // Region extends past the eastern edge only.
        (true, false, true, false) => {
            ur = [ul[0], w];
            lr = [ll[0], w];
        }
        // Region extends past the western edge only.
        (false, true, false, true) => {
            ul = [ur[0], 1];
            ll = [lr[0], 1];
        }

        // Single missing corners.
        (false, true, true, true) => ul = [ur[0], 1],
        (true, false, true, true) => ur = [ul[0], w],
        (true, true, false, true) => ll = [lr[0], 1],
        (true, true, true, false) => lr = [ll[0], w],

        // Diagonal patterns (both opposite corners in, both others out) cannot
        // occur for an axis-aligned bbox over an axis-aligned raster: if two
        // opposite corners are in-bounds the other two must be as well.
        (true, false, false, true) | (false, true, true, false) => unreachable!(),
    }

    let clamp = |c: [i64; 2]| [c[0].clamp(1, h), c[1].clamp(1, w)];

    TileFootprint {
        ul: clamp(ul),
        ur: clamp(ur),
        lr: clamp(lr),
        ll: clamp(ll),
    }
}

/// Determine the minimal subset of tiles needed to cover the region.
///
/// Returns the indices of the surviving tiles (input order preserved) and
/// whether their joint coverage is complete over the region's bounding box.
/// Tiles with an empty footprint window, no geographic overlap with the
/// region, or coverage fully contained in another tile's are dropped.
pub fn minimal_subset(tiles: &[TileGeocoding], region: &RegionPolygon) -> (Vec<usize>, bool) {
    let bbox = region.bounds();

    // Geographic coverage each tile contributes to the region.
    let coverage: Vec<Option<GeoRect>> = tiles
        .iter()
        .map(|tile| {
            let window = corner_pixels(tile, region).window();
            let rect = tile.extent().intersection(&bbox);
            match (window, rect) {
                (Some(_), Some(rect)) if rect.area() > 0.0 => Some(rect),
                _ => None,
            }
        })
        .collect();

    let survivors: Vec<usize> = coverage
        .iter()
        .enumerate()
        .filter_map(|(i, rect)| rect.map(|r| (i, r)))
        .filter(|(i, rect)| {
            // Drop a tile whose coverage another tile fully provides. Ties on
            // identical coverage keep the earliest listing.
            !coverage
                .iter()
                .enumerate()
                .filter_map(|(j, other)| other.map(|o| (j, o)))
                .any(|(j, other)| {
                    j != *i
                        && other.contains_rect(rect)
                        && (other.area() > rect.area() || j < *i)
                })
        })
        .map(|(i, _)| i)
        .collect();

    let rects: Vec<GeoRect> = survivors
        .iter()
        .filter_map(|&i| coverage[i])
        .collect();
    let covered = rects_cover(&rects, &bbox);

    debug!(
        tiles = tiles.len(),
        necessary = survivors.len(),
        covered,
        "Reduced group to necessary tiles"
    );

    (survivors, covered)
}

/// Check whether a set of rectangles jointly covers a target rectangle.
///
/// Exact for axis-aligned rectangles: the target is cut along every edge
/// coordinate and each resulting cell must fall inside some rectangle.
fn rects_cover(rects: &[GeoRect], target: &GeoRect) -> bool {
    if target.area() <= 0.0 {
        return true;
    }

    let mut xs = vec![target.min_lon, target.max_lon];
    let mut ys = vec![target.min_lat, target.max_lat];
    for r in rects {
        for x in [r.min_lon, r.max_lon] {
            if x > target.min_lon && x < target.max_lon {
                xs.push(x);
            }
        }
        for y in [r.min_lat, r.max_lat] {
            if y > target.min_lat && y < target.max_lat {
                ys.push(y);
            }
        }
    }
    xs.sort_by(|a, b| a.total_cmp(b));
    ys.sort_by(|a, b| a.total_cmp(b));

    for wx in xs.windows(2) {
        for wy in ys.windows(2) {
            if wx[1] - wx[0] <= 0.0 || wy[1] - wy[0] <= 0.0 {
                continue;
            }
            let (cx, cy) = ((wx[0] + wx[1]) / 2.0, (wy[0] + wy[1]) / 2.0);
            if !rects.iter().any(|r| r.contains_point(cx, cy)) {
                return false;
            }
        }
    }
    true
}
