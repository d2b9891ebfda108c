//! Per-date run manifest for downstream pickup.
//!
//! Writes one JSON document per group listing every finished stage and its
//! artifact path, so consumers can discover results without scanning the
//! output tree.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::adapter::Adapter;
use crate::config::ProcessingContext;
use crate::error::Result;
use crate::stages::graph_timestamp;

pub const NAME: &str = "MANIFEST";

const OUT_DIR: &str = "manifests";

pub struct ManifestAdapter;

#[async_trait]
impl Adapter for ManifestAdapter {
    fn name(&self) -> &'static str {
        NAME
    }

    fn input_stage(&self) -> Option<&str> {
        None
    }

    async fn apply(
        &self,
        ctx: &ProcessingContext,
        outputs: &BTreeMap<String, PathBuf>,
    ) -> Result<()> {
        let Some(first) = outputs.values().next() else {
            return Ok(());
        };
        let date_token = first
            .file_name()
            .and_then(|n| n.to_str())
            .map(graph_timestamp)
            .unwrap_or_else(|| "undated".to_string());

        let stages: BTreeMap<&String, String> = outputs
            .iter()
            .map(|(stage, path)| (stage, path.display().to_string()))
            .collect();

        let manifest = json!({
            "region": ctx.region_name,
            "date": date_token,
            "stages": stages,
        });

        let path = ctx
            .out_root
            .join(OUT_DIR)
            .join(format!("{date_token}.json"));
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, serde_json::to_vec_pretty(&manifest)?).await?;

        info!(adapter = NAME, path = %path.display(), "Wrote group manifest");
        Ok(())
    }
}
