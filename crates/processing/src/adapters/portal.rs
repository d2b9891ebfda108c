//! Export finished artifacts to a data portal's ingestion tree.
//!
//! Copies one stage's group-level artifact into a per-region, per-datetime
//! folder, writes a small metadata document next to it and notifies the
//! portal API. Notification failures are tolerated; the exported files stay
//! valid either way.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{info, warn};

use crate::adapter::Adapter;
use crate::config::{AdapterSettings, ProcessingContext};
use crate::error::{ProcessingError, Result};
use crate::stages::graph_timestamp;

pub const NAME: &str = "PORTAL";

pub struct PortalAdapter {
    settings: AdapterSettings,
    client: Client,
}

impl PortalAdapter {
    pub fn new(settings: AdapterSettings) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to create HTTP client");
        Self { settings, client }
    }
}

#[async_trait]
impl Adapter for PortalAdapter {
    fn name(&self) -> &'static str {
        NAME
    }

    fn input_stage(&self) -> Option<&str> {
        Some(&self.settings.input_stage)
    }

    async fn apply(
        &self,
        ctx: &ProcessingContext,
        outputs: &BTreeMap<String, PathBuf>,
    ) -> Result<()> {
        let Some(artifact) = outputs.get(&self.settings.input_stage) else {
            warn!(
                adapter = NAME,
                stage = %self.settings.input_stage,
                "Input stage produced no artifact, skipping export"
            );
            return Ok(());
        };

        let root = self
            .settings
            .root_path
            .as_ref()
            .ok_or_else(|| ProcessingError::MissingConfig("portal root_path".to_string()))?;

        let file_name = artifact
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ProcessingError::InvalidScene(artifact.display().to_string()))?;
        let datetime = graph_timestamp(file_name);

        let out_path = root.join(&ctx.region_name).join(&datetime);
        tokio::fs::create_dir_all(&out_path).await?;
        tokio::fs::copy(artifact, out_path.join(file_name)).await?;

        let metadata = json!({
            "region": ctx.region_name,
            "datetime": datetime,
            "stage": self.settings.input_stage,
            "file": file_name,
        });
        tokio::fs::write(
            out_path.join("metadata.json"),
            serde_json::to_vec_pretty(&metadata)?,
        )
        .await?;

        info!(
            adapter = NAME,
            path = %out_path.display(),
            "Exported artifact to portal tree"
        );

        if let Some(api_url) = &self.settings.api_url {
            let mut request = self.client.post(api_url).json(&json!({
                "region": ctx.region_name,
                "datetime": datetime,
            }));
            if let Some(key) = &self.settings.api_key {
                request = request.header("Authorization", key);
            }
            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    info!(adapter = NAME, "Portal notified of new data");
                }
                Ok(response) => {
                    warn!(
                        adapter = NAME,
                        status = %response.status(),
                        "Unexpected response from portal"
                    );
                }
                Err(e) => {
                    warn!(adapter = NAME, error = %e, "Failed to notify portal");
                }
            }
        }

        Ok(())
    }
}
