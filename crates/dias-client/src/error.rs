//! Error types for the archive clients.

use thiserror::Error;

/// Errors raised while talking to a remote archive.
#[derive(Debug, Error)]
pub enum DiasError {
    #[error("Unknown catalog API: {0} (possible options are 'FINDER')")]
    UnknownApi(String),

    #[error("Catalog search failed: {0}")]
    Search(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Unsupported sensor/resolution combination: {0}")]
    UnsupportedDataset(String),

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to read or write local file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive extraction failed: {0}")]
    Extract(#[from] zip::result::ZipError),
}

/// Result type for archive operations.
pub type Result<T> = std::result::Result<T, DiasError>;
