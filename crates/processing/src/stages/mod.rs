//! Built-in processing stages.

pub mod atmcorr;
pub mod lswt;
pub mod pixclass;

pub use atmcorr::AtmosphericCorrection;
pub use lswt::LakeSurfaceTemperature;
pub use pixclass::PixelClassification;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::info;

use hindcast_common::region::ReprojectParams;

use crate::config::{ProcessingContext, StageSettings};
use crate::error::{ProcessingError, Result};
use crate::graphs::{GraphNode, OUTPUT_PLACEHOLDER};

/// Handle an already-existing target artifact.
///
/// Returns the artifact when the run keeps existing outputs; otherwise the
/// stale file is removed so the stage recomputes it. Ensures the target's
/// directory exists either way.
pub(crate) fn existing_target(
    ctx: &ProcessingContext,
    stage: &str,
    target: &Path,
) -> Result<Option<PathBuf>> {
    if target.is_file() {
        if ctx.synchronise {
            info!(stage, target = %target.display(), "Skipping, target already exists");
            return Ok(Some(target.to_path_buf()));
        }
        info!(stage, target = %target.display(), "Removing existing target for re-run");
        std::fs::remove_file(target)?;
    }
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(None)
}

/// Resolve the stage's input: an upstream stage artifact or the tile itself.
pub(crate) fn stage_input(
    stage: &str,
    settings: &StageSettings,
    tile: &Path,
    prior: &HashMap<String, PathBuf>,
) -> Result<PathBuf> {
    match &settings.input_stage {
        Some(upstream) => {
            prior
                .get(upstream)
                .cloned()
                .ok_or_else(|| ProcessingError::MissingUpstream {
                    stage: stage.to_string(),
                    upstream: upstream.clone(),
                })
        }
        None => Ok(tile.to_path_buf()),
    }
}

pub(crate) fn product_name(tile: &Path) -> Result<String> {
    tile.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| ProcessingError::InvalidScene(tile.display().to_string()))
}

/// Timestamp token used in reproducibility graph names.
pub(crate) fn graph_timestamp(product_name: &str) -> String {
    hindcast_common::names::sensing_datetime_from_name(product_name)
        .map(|dt| dt.format("%Y%m%dT%H%M%S").to_string())
        .or_else(|| {
            hindcast_common::names::sensing_date_from_name(product_name)
                .ok()
                .map(|d| d.format("%Y%m%d").to_string())
        })
        .unwrap_or_else(|| "undated".to_string())
}

/// Reprojection node shared by stages that output the target grid.
pub(crate) fn reproject_node(source: &str, grid: &ReprojectParams) -> GraphNode {
    GraphNode::new("reproject", "Reproject")
        .with_source(source)
        .param("crs", "EPSG:4326")
        .param("resampling", "Nearest")
        .param("orthorectify", "false")
        .param("noDataValue", "NaN")
        .param("easting", grid.easting.to_string())
        .param("northing", grid.northing.to_string())
        .param("pixelSizeX", grid.pixel_size_x.to_string())
        .param("pixelSizeY", grid.pixel_size_y.to_string())
        .param("width", grid.width.to_string())
        .param("height", grid.height.to_string())
}

/// Terminal write node of every stage graph.
pub(crate) fn write_node(source: &str) -> GraphNode {
    GraphNode::new("write", "Write")
        .with_source(source)
        .param("file", OUTPUT_PLACEHOLDER)
        .param("formatName", "NetCDF4-CF")
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    use hindcast_common::names::Sensor;
    use hindcast_common::region::RegionPolygon;

    use crate::config::{EngineConfig, ProcessingContext};
    use crate::engine::GraphEngine;

    /// Context backed by a no-op engine binary, writing under `out_root`.
    pub(crate) fn context(out_root: &Path, gpt: &str) -> ProcessingContext {
        ProcessingContext {
            engine: GraphEngine::new(EngineConfig {
                gpt_path: PathBuf::from(gpt),
                cache_size: "512M".to_string(),
                use_default: false,
                properties_path: None,
            }),
            sensor: Sensor::Olci,
            resolution: 300,
            region: RegionPolygon::from_wkt(
                "POLYGON ((8.1 46.2, 8.6 46.2, 8.6 46.5, 8.1 46.5, 8.1 46.2))",
            )
            .expect("valid wkt"),
            region_name: "testlake".to_string(),
            out_root: out_root.to_path_buf(),
            synchronise: true,
            stages: HashMap::new(),
            adapters: HashMap::new(),
        }
    }
}
