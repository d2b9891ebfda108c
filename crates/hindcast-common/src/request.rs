//! Download request handed from the catalog resolver to the driver.

use serde::{Deserialize, Serialize};

/// Opaque remote identifier of one downloadable product.
///
/// Resolved once by a catalog search and never mutated afterwards; the
/// archive client knows how to turn it into an actual transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub uuid: String,
}

impl DownloadRequest {
    pub fn new(uuid: impl Into<String>) -> Self {
        Self { uuid: uuid.into() }
    }
}
