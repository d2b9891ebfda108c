//! Atmospheric correction stage.
//!
//! Derives water-leaving reflectances and in-water constituents from the
//! level-1 radiances via the engine's neural-network correction operator,
//! then reprojects onto the target grid.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use hindcast_common::names::Sensor;

use crate::config::ProcessingContext;
use crate::error::Result;
use crate::graphs::{self, GraphNode};
use crate::processor::Processor;
use crate::stages::{
    existing_target, graph_timestamp, product_name, reproject_node, stage_input, write_node,
};

pub const NAME: &str = "ATMCORR";

const OUT_DIR: &str = "L2ATM";

pub struct AtmosphericCorrection;

#[async_trait]
impl Processor for AtmosphericCorrection {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn run(
        &self,
        ctx: &ProcessingContext,
        tile: &Path,
        prior: &HashMap<String, PathBuf>,
    ) -> Result<PathBuf> {
        let product = product_name(tile)?;
        let settings = ctx.stage_settings(NAME);

        let target = ctx
            .out_root
            .join(OUT_DIR)
            .join(format!("L2ATM_{product}.nc"));
        if let Some(existing) = existing_target(ctx, NAME, &target)? {
            return Ok(existing);
        }

        let input = stage_input(NAME, &settings, tile, prior)?;

        let operator = match ctx.sensor {
            Sensor::Olci => "c2rcc.olci",
            Sensor::Msi => "c2rcc.msi",
            Sensor::OliTirs => "c2rcc.landsat8",
        };

        let mut correction = GraphNode::new("correction", operator)
            .param("validPixelExpression", settings.valid_expression.clone())
            .param("salinity", "0.05")
            .param("temperature", "15.0")
            .param("ozone", "330.0")
            .param("press", "1000.0")
            .param("TSMfakBpart", "1.72")
            .param("TSMfakBwit", "3.1")
            .param("CHLexp", "1.04")
            .param("CHLfak", "21.0")
            .param("thresholdRtosaOOS", "0.05")
            .param("thresholdAcReflecOos", "0.1")
            .param("thresholdCloudTDown865", "0.955")
            .param("outputAsRrs", "false")
            .param("outputAcReflectance", "true")
            .param("outputRhown", "true")
            .param("outputKd", "true")
            .param("outputUncertainties", "true");
        if ctx.sensor != Sensor::Msi {
            correction = correction.param("useEcmwfAuxData", "true");
        }

        let grid = ctx.region.reproject_params(ctx.resolution);
        let graph_path = ctx
            .out_root
            .join(OUT_DIR)
            .join("_reproducibility")
            .join(format!(
                "atmcorr_{}_{}.xml",
                ctx.sensor.as_str().to_lowercase(),
                graph_timestamp(&product)
            ));
        graphs::write_graph(
            &graph_path,
            "atmcorr-netcdf-reproj",
            &[
                correction,
                reproject_node("correction", &grid),
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
