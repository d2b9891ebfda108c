//! Error types for the processing crate.

use thiserror::Error;

/// Errors that can occur while processing, mosaicking or adapting products.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Unknown processor: {0}")]
    UnknownProcessor(String),

    #[error("Unknown adapter: {0}")]
    UnknownAdapter(String),

    #[error("Stage {stage} does not apply to sensor {sensor}")]
    NotApplicable { stage: String, sensor: String },

    #[error("Stage {stage} requires upstream stage {upstream}, which produced no output")]
    MissingUpstream { stage: String, upstream: String },

    #[error("Missing required configuration: {0}")]
    MissingConfig(String),

    #[error("Engine run failed for {graph} after {attempts} attempt(s)")]
    EngineFailed { graph: String, attempts: u32 },

    #[error("Engine exited with {0}")]
    EngineExit(std::process::ExitStatus),

    #[error("Engine run exceeded timeout of {0}s")]
    EngineTimeout(u64),

    #[error("Could not read scene metadata: {0}")]
    InvalidScene(String),

    #[error("Failed to read or write file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to write graph XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Failed to serialize metadata: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Domain(#[from] hindcast_common::HindcastError),
}

/// Result type for processing operations.
pub type Result<T> = std::result::Result<T, ProcessingError>;
