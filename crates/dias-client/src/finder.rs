//! RESTO-style catalog client.
//!
//! Searches a resto finder endpoint (`search.json` per collection) and
//! downloads products through the archive's zipper service with a bearer
//! token.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use hindcast_common::filters::{filter_for_baseline, filter_for_timeliness};
use hindcast_common::names::Sensor;
use hindcast_common::request::DownloadRequest;

use crate::api::{CatalogApi, Credentials, SceneQuery};
use crate::auth;
use crate::download::Downloader;
use crate::error::{DiasError, Result};

const SEARCH_ADDRESS: &str = "https://finder.creodias.eu/resto/api/collections/{collection}/search.json";
const DOWNLOAD_ADDRESS: &str = "https://zipper.creodias.eu/download/{uuid}?token={token}";
const TOKEN_ADDRESS: &str =
    "https://auth.creodias.eu/auth/realms/DIAS/protocol/openid-connect/token";

const MAX_RECORDS: usize = 100;

/// Dataset selection within a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetId {
    pub collection: &'static str,
    pub instrument: &'static str,
    pub product_type: &'static str,
}

/// Map (sensor, resolution) onto the archive's dataset identifiers.
pub fn dataset_id(sensor: Sensor, resolution: u32) -> Result<DatasetId> {
    match sensor {
        Sensor::Olci if resolution < 1000 => Ok(DatasetId {
            collection: "Sentinel3",
            instrument: "OL",
            product_type: "EFR",
        }),
        Sensor::Olci => Ok(DatasetId {
            collection: "Sentinel3",
            instrument: "OL",
            product_type: "ERR",
        }),
        Sensor::Msi => Ok(DatasetId {
            collection: "Sentinel2",
            instrument: "MSI",
            product_type: "S2MSI1C",
        }),
        other => Err(DiasError::UnsupportedDataset(format!(
            "{other} at {resolution}m"
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    id: String,
    properties: FeatureProperties,
}

#[derive(Debug, Deserialize)]
struct FeatureProperties {
    title: String,
}

/// Catalog client for a resto finder deployment.
pub struct FinderApi {
    client: Client,
    credentials: Credentials,
    downloader: Downloader,
    search_address: String,
    download_address: String,
    token_address: String,
}

impl FinderApi {
    pub fn new(credentials: Credentials) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(600))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            downloader: Downloader::new(client.clone()),
            client,
            credentials,
            search_address: SEARCH_ADDRESS.to_string(),
            download_address: DOWNLOAD_ADDRESS.to_string(),
            token_address: TOKEN_ADDRESS.to_string(),
        }
    }

    /// Point the client at a different deployment (tests, mirrors).
    pub fn with_endpoints(
        mut self,
        search_address: impl Into<String>,
        download_address: impl Into<String>,
        token_address: impl Into<String>,
    ) -> Self {
        self.search_address = search_address.into();
        self.download_address = download_address.into();
        self.token_address = token_address.into();
        self
    }

    /// Run one paged search, returning (uuid, product name) pairs.
    async fn search(&self, query: &SceneQuery, dataset: DatasetId) -> Result<Vec<(String, String)>> {
        let url = self.search_address.replace("{collection}", dataset.collection);
        let geometry = encode_geometry(&query.wkt);

        let mut results = Vec::new();
        let mut page = 1;
        loop {
            debug!(collection = dataset.collection, page, "Searching catalog");
            let response = self
                .client
                .get(&url)
                .query(&[
                    ("maxRecords", MAX_RECORDS.to_string()),
                    ("startDate", query.start.clone()),
                    ("completionDate", query.end.clone()),
                    ("instrument", dataset.instrument.to_string()),
                    ("geometry", geometry.clone()),
                    ("productType", dataset.product_type.to_string()),
                    ("page", page.to_string()),
                ])
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(DiasError::Search(format!(
                    "unexpected response {status}: {body}"
                )));
            }

            let body: SearchResponse = response
                .json()
                .await
                .map_err(|e| DiasError::Search(format!("invalid search response: {e}")))?;

            let count = body.features.len();
            results.extend(
                body.features
                    .into_iter()
                    .map(|f| (f.id, f.properties.title)),
            );
            if count < MAX_RECORDS {
                break;
            }
            page += 1;
        }

        info!(count = results.len(), "Catalog search complete");
        Ok(results)
    }
}

#[async_trait]
impl CatalogApi for FinderApi {
    async fn resolve(&self, query: &SceneQuery) -> Result<(Vec<DownloadRequest>, Vec<String>)> {
        let dataset = dataset_id(query.sensor, query.resolution)?;
        let found = self.search(query, dataset).await?;

        let (requests, names): (Vec<_>, Vec<_>) = found
            .into_iter()
            .map(|(uuid, name)| (DownloadRequest::new(uuid), name))
            .unzip();

        // Superseded copies never reach the scheduler.
        let (requests, names) = filter_for_timeliness(requests, names);
        let (requests, names) = filter_for_baseline(requests, names, query.sensor);

        Ok((requests, names))
    }

    async fn fetch(&self, request: &DownloadRequest, destination: &Path) -> Result<()> {
        let token = auth::request_token(&self.client, &self.token_address, &self.credentials).await?;
        let url = self
            .download_address
            .replace("{uuid}", &request.uuid)
            .replace("{token}", &token);

        info!(uuid = %request.uuid, path = %destination.display(), "Downloading product");
        self.downloader.fetch_zip(&url, destination).await
    }
}

/// Encode a WKT polygon the way the finder expects it in a query string:
/// the space after the geometry type dropped, remaining spaces as `+`.
fn encode_geometry(wkt: &str) -> String {
    wkt.replacen(' ', "", 1).replace(' ', "+")
}
