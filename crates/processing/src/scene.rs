//! Reading scene metadata from downloaded products.
//!
//! The driver needs two things from a product without running the engine:
//! the tile's geocoding (for subset-necessity analysis) and the geocoding
//! mode precondition for the ocean-color family. Both come from the
//! product's main metadata file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

use hindcast_common::footprint::{GeocodingKind, TileGeocoding};
use hindcast_common::names::{satellite_from_name, Satellite};
use hindcast_common::region::GeoRect;

use crate::engine::GraphEngine;
use crate::error::{ProcessingError, Result};

/// Access to per-product geocoding metadata.
#[async_trait]
pub trait SceneReader: Send + Sync {
    /// The tile's raster geocoding.
    async fn geocoding(&self, product: &Path) -> Result<TileGeocoding>;

    /// How the product family will be geolocated by the engine.
    async fn geocoding_kind(&self, product: &Path) -> Result<GeocodingKind>;
}

/// Reads geocoding from the product's main metadata file.
pub struct ManifestSceneReader {
    engine: GraphEngine,
}

impl ManifestSceneReader {
    pub fn new(engine: GraphEngine) -> Self {
        Self { engine }
    }
}

/// The file third-party software opens to read a level-1 product.
pub fn main_metadata_file(product: &Path) -> Result<PathBuf> {
    let name = product
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ProcessingError::InvalidScene(product.display().to_string()))?;
    let satellite = satellite_from_name(name)?;
    Ok(match satellite {
        Satellite::S2A | Satellite::S2B => product.join("MTD_MSIL1C.xml"),
        Satellite::S3A | Satellite::S3B => product.join("xfdumanifest.xml"),
        Satellite::L8 => product.join(format!("{name}_MTL.txt")),
    })
}

#[async_trait]
impl SceneReader for ManifestSceneReader {
    async fn geocoding(&self, product: &Path) -> Result<TileGeocoding> {
        let path = main_metadata_file(product)?;
        let text = tokio::fs::read_to_string(&path).await?;

        let geocoding = if path.extension().map_or(false, |e| e == "xml") {
            parse_xml_geocoding(&text)
        } else {
            parse_mtl_geocoding(&text)
        }?;

        debug!(
            product = %product.display(),
            width = geocoding.width,
            height = geocoding.height,
            "Read tile geocoding"
        );
        Ok(geocoding)
    }

    async fn geocoding_kind(&self, product: &Path) -> Result<GeocodingKind> {
        let name = product
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ProcessingError::InvalidScene(product.display().to_string()))?;
        match satellite_from_name(name)? {
            Satellite::S3A | Satellite::S3B => {
                if self.engine.pixel_geocoding_enabled()? {
                    Ok(GeocodingKind::PerPixel)
                } else {
                    Ok(GeocodingKind::TiePoint)
                }
            }
            _ => Ok(GeocodingKind::PerPixel),
        }
    }
}

/// Extract footprint and raster size from an XML metadata file.
///
/// Footprint coordinates live in a `posList`-style element as
/// whitespace-separated lat/lon pairs; raster size in `rows`/`columns`
/// (`NROWS`/`NCOLS` for the tiled family).
fn parse_xml_geocoding(text: &str) -> Result<TileGeocoding> {
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);

    let mut current = String::new();
    let mut footprint: Option<Vec<f64>> = None;
    let mut rows: Option<i64> = None;
    let mut cols: Option<i64> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                current = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
            }
            Ok(Event::Text(t)) => {
                let value = t.unescape()?;
                match current.as_str() {
                    "posList" | "EXT_POS_LIST" if footprint.is_none() => {
                        footprint = Some(
                            value
                                .split_whitespace()
                                .filter_map(|v| v.parse().ok())
                                .collect(),
                        );
                    }
                    "rows" | "NROWS" if rows.is_none() => rows = value.trim().parse().ok(),
                    "columns" | "NCOLS" if cols.is_none() => cols = value.trim().parse().ok(),
                    _ => {}
                }
            }
            Ok(Event::End(_)) => current.clear(),
            Ok(Event::Eof) => break,
            Err(e) => return Err(ProcessingError::Xml(e)),
            _ => {}
        }
    }

    let coords = footprint
        .filter(|c| c.len() >= 4)
        .ok_or_else(|| ProcessingError::InvalidScene("no footprint in metadata".to_string()))?;
    let (rows, cols) = match (rows, cols) {
        (Some(r), Some(c)) if r > 0 && c > 0 => (r, c),
        _ => {
            return Err(ProcessingError::InvalidScene(
                "no raster dimensions in metadata".to_string(),
            ))
        }
    };

    // posList pairs are lat lon.
    let lats: Vec<f64> = coords.iter().step_by(2).copied().collect();
    let lons: Vec<f64> = coords.iter().skip(1).step_by(2).copied().collect();
    let extent = GeoRect::new(
        lons.iter().copied().fold(f64::MAX, f64::min),
        lats.iter().copied().fold(f64::MAX, f64::min),
        lons.iter().copied().fold(f64::MIN, f64::max),
        lats.iter().copied().fold(f64::MIN, f64::max),
    );

    Ok(TileGeocoding::from_extent(extent, cols, rows))
}

/// Extract footprint and raster size from a `KEY = value` metadata file.
fn parse_mtl_geocoding(text: &str) -> Result<TileGeocoding> {
    let mut lats = Vec::new();
    let mut lons = Vec::new();
    let mut rows: Option<i64> = None;
    let mut cols: Option<i64> = None;

    for line in text.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        if key.starts_with("CORNER_") && key.ends_with("_LAT_PRODUCT") {
            if let Ok(v) = value.parse() {
                lats.push(v);
            }
        } else if key.starts_with("CORNER_") && key.ends_with("_LON_PRODUCT") {
            if let Ok(v) = value.parse() {
                lons.push(v);
            }
        } else if key == "REFLECTIVE_LINES" {
            rows = value.parse().ok();
        } else if key == "REFLECTIVE_SAMPLES" {
            cols = value.parse().ok();
        }
    }

    if lats.is_empty() || lons.is_empty() {
        return Err(ProcessingError::InvalidScene(
            "no corner coordinates in metadata".to_string(),
        ));
    }
    let (rows, cols) = match (rows, cols) {
        (Some(r), Some(c)) if r > 0 && c > 0 => (r, c),
        _ => {
            return Err(ProcessingError::InvalidScene(
                "no raster dimensions in metadata".to_string(),
            ))
        }
    };

    let extent = GeoRect::new(
        lons.iter().copied().fold(f64::MAX, f64::min),
        lats.iter().copied().fold(f64::MAX, f64::min),
        lons.iter().copied().fold(f64::MIN, f64::max),
        lats.iter().copied().fold(f64::MIN, f64::max),
    );
    Ok(TileGeocoding::from_extent(extent, cols, rows))
}
