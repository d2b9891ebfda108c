//! Lake surface water temperature stage.
//!
//! Derives skin temperature over inland water from the thermal bands and
//! reprojects onto the target grid. Not available for the MSI family, which
//! carries no thermal instrument.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use hindcast_common::names::Sensor;

use crate::config::ProcessingContext;
use crate::error::{ProcessingError, Result};
use crate::graphs::{self, GraphNode};
use crate::processor::Processor;
use crate::stages::{
    existing_target, graph_timestamp, product_name, reproject_node, stage_input, write_node,
};

pub const NAME: &str = "LSWT";

const OUT_DIR: &str = "LSWT";

pub struct LakeSurfaceTemperature;

#[async_trait]
impl Processor for LakeSurfaceTemperature {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn run(
        &self,
        ctx: &ProcessingContext,
        tile: &Path,
        prior: &HashMap<String, PathBuf>,
    ) -> Result<PathBuf> {
        if ctx.sensor == Sensor::Msi {
            return Err(ProcessingError::NotApplicable {
                stage: NAME.to_string(),
                sensor: ctx.sensor.to_string(),
            });
        }

        let product = product_name(tile)?;
        let settings = ctx.stage_settings(NAME);

        let target = ctx.out_root.join(OUT_DIR).join(format!("LSWT_{product}.nc"));
        if let Some(existing) = existing_target(ctx, NAME, &target)? {
            return Ok(existing);
        }

        let input = stage_input(NAME, &settings, tile, prior)?;

        let temperature = GraphNode::new("temperature", "LSWT")
            .param("sattype", ctx.sensor.as_str())
            .param("validPixelExpression", settings.valid_expression.clone());

        let grid = ctx.region.reproject_params(ctx.resolution);
        let graph_path = ctx
            .out_root
            .join(OUT_DIR)
            .join("_reproducibility")
            .join(format!(
                "lswt_{}_{}.xml",
                ctx.sensor.as_str().to_lowercase(),
                graph_timestamp(&product)
            ));
        graphs::write_graph(
            &graph_path,
            "lswt-netcdf-reproj",
            &[
                temperature,
                reproject_node("temperature", &grid),
                write_node("reproject"),
            ],
        )?;

        ctx.engine
            .run_graph(
                &graph_path,
                &input,
                &target,
                settings.attempts,
                settings.timeout_secs.map(Duration::from_secs),
            )
            .await?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::testutil::context;

    #[tokio::test]
    async fn rejects_msi() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path(), "true");
        ctx.sensor = Sensor::Msi;

        let stage = LakeSurfaceTemperature;
        let err = stage
            .run(
                &ctx,
                Path::new("S2A_MSIL1C_20210104T102411_N0209_R065_T32TLS_20210104T123456.SAFE"),
                &HashMap::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessingError::NotApplicable { .. }));
    }
}
