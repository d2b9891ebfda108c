//! Catalog API trait and client selection.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use hindcast_common::names::Sensor;
use hindcast_common::request::DownloadRequest;

use crate::error::{DiasError, Result};
use crate::finder::FinderApi;

/// Username/password pair for one external system.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Search criteria handed to a catalog.
#[derive(Debug, Clone)]
pub struct SceneQuery {
    /// Inclusive start of the sensing period (ISO date or datetime).
    pub start: String,
    /// Inclusive end of the sensing period.
    pub end: String,
    pub sensor: Sensor,
    /// Target resolution in meters; selects the dataset within a sensor.
    pub resolution: u32,
    /// Region of interest as WKT polygon text.
    pub wkt: String,
}

/// One remote imagery archive.
///
/// Implementations translate the abstract search/fetch contract into the
/// archive's own wire protocol.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// Find products matching the query.
    ///
    /// The returned request and product-name lists are ordered consistently
    /// with each other and already deduplicated of superseded copies.
    async fn resolve(&self, query: &SceneQuery) -> Result<(Vec<DownloadRequest>, Vec<String>)>;

    /// Download one product into the given directory path.
    ///
    /// Parent directories are created as needed; a transport error or
    /// non-success status fails loudly rather than leaving partial files.
    async fn fetch(&self, request: &DownloadRequest, destination: &Path) -> Result<()>;
}

/// Select the archive client by its configured name.
///
/// Resolved once at startup; an unrecognized name is a configuration error
/// that aborts the run.
pub fn create_client(api: &str, credentials: Credentials) -> Result<Arc<dyn CatalogApi>> {
    match api.to_uppercase().as_str() {
        "FINDER" => Ok(Arc::new(FinderApi::new(credentials))),
        other => Err(DiasError::UnknownApi(other.to_string())),
    }
}
