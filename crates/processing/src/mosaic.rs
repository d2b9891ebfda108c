//! Merging per-tile stage outputs into one group-level artifact.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::info;

use crate::config::ProcessingContext;
use crate::error::Result;
use crate::stages::graph_timestamp;

const OUT_DIR: &str = "MOSAIC";

/// Mosaic capability over finished stage artifacts.
#[async_trait]
pub trait MosaicOp: Send + Sync {
    /// Merge several per-tile artifacts of one stage into a single product.
    async fn merge(
        &self,
        ctx: &ProcessingContext,
        stage: &str,
        inputs: &[PathBuf],
    ) -> Result<PathBuf>;
}

/// Mosaicking through the external graph engine.
pub struct EngineMosaic;

#[async_trait]
impl MosaicOp for EngineMosaic {
    async fn merge(
        &self,
        ctx: &ProcessingContext,
        stage: &str,
        inputs: &[PathBuf],
    ) -> Result<PathBuf> {
        let date_token = inputs
            .first()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .map(graph_timestamp)
            .unwrap_or_else(|| "undated".to_string());

        let target = ctx
            .out_root
            .join(OUT_DIR)
            .join(format!("{stage}_MOSAIC_{date_token}.nc"));

        if target.is_file() && ctx.synchronise {
            info!(stage, target = %target.display(), "Skipping mosaic, target already exists");
            return Ok(target);
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!(stage, tiles = inputs.len(), "Mosaicking stage outputs");
        ctx.engine
            .run_mosaic(inputs, &target, &ctx.region, ctx.resolution)
            .await?;
        Ok(target)
    }
}
