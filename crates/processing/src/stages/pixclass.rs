//! Pixel classification stage.
//!
//! Flags cloud, snow, land and water pixels on the level-1 product. Other
//! stages commonly consume this stage's artifact as their input.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use hindcast_common::names::Sensor;

use crate::config::ProcessingContext;
use crate::error::{ProcessingError, Result};
use crate::graphs::{self, GraphNode};
use crate::processor::Processor;
use crate::stages::{existing_target, graph_timestamp, product_name, stage_input, write_node};

pub const NAME: &str = "PIXCLASS";

const OUT_DIR: &str = "L2PIX";

pub struct PixelClassification;

#[async_trait]
impl Processor for PixelClassification {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn run(
        &self,
        ctx: &ProcessingContext,
        tile: &Path,
        prior: &HashMap<String, PathBuf>,
    ) -> Result<PathBuf> {
        let operator = match ctx.sensor {
            Sensor::Olci => "Idepix.Sentinel3.Olci",
            Sensor::Msi => "Idepix.Sentinel2",
            Sensor::OliTirs => {
                return Err(ProcessingError::NotApplicable {
                    stage: NAME.to_string(),
                    sensor: ctx.sensor.to_string(),
                })
            }
        };

        let product = product_name(tile)?;
        let settings = ctx.stage_settings(NAME);

        let target = ctx
            .out_root
            .join(OUT_DIR)
            .join(format!("L2PIX_{product}.nc"));
        if let Some(existing) = existing_target(ctx, NAME, &target)? {
            return Ok(existing);
        }

        let input = stage_input(NAME, &settings, tile, prior)?;

        let classification = GraphNode::new("classification", operator)
            .param("computeCloudBuffer", "true")
            .param("cloudBufferWidth", "2")
            .param("computeCloudShadow", "true")
            .param("copyAllTiePoints", "true");

        let graph_path = ctx
            .out_root
            .join(OUT_DIR)
            .join("_reproducibility")
            .join(format!(
                "pixclass_{}_{}.xml",
                ctx.sensor.as_str().to_lowercase(),
                graph_timestamp(&product)
            ));
        graphs::write_graph(
            &graph_path,
            "pixclass-netcdf",
            &[classification, write_node("classification")],
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
    async fn rejects_unsupported_sensor() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path(), "true");
        ctx.sensor = Sensor::OliTirs;

        let stage = PixelClassification;
        let err = stage
            .run(
                &ctx,
                Path::new("LC08_L1TP_195028_20210104_20210112_01_T1"),
                &HashMap::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessingError::NotApplicable { .. }));
    }

    #[tokio::test]
    async fn selects_operator_per_sensor() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path(), "true");
        ctx.sensor = Sensor::Msi;

        let tile = "S2A_MSIL1C_20210104T102411_N0209_R065_T32TLS_20210104T123456.SAFE";
        let stage = PixelClassification;
        stage.run(&ctx, Path::new(tile), &HashMap::new()).await.unwrap();

        let graph = dir
            .path()
            .join(OUT_DIR)
            .join("_reproducibility")
            .join("pixclass_msi_20210104T102411.xml");
        let xml = std::fs::read_to_string(graph).unwrap();
        assert!(xml.contains("<operator>Idepix.Sentinel2</operator>"));
    }
}
