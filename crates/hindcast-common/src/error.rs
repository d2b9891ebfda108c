//! Error types for the hindcast pipeline.

use thiserror::Error;

/// Result type alias using HindcastError.
pub type HindcastResult<T> = Result<T, HindcastError>;

/// Primary error type for domain-level operations.
#[derive(Debug, Error)]
pub enum HindcastError {
    // === Product name errors ===
    #[error("Could not read satellite name from product name: {0}")]
    UnknownSatellite(String),

    #[error("Could not read sensing date from product name: {0}")]
    MissingSensingDate(String),

    #[error("Invalid sensing timestamp '{value}' in product name: {name}")]
    InvalidTimestamp { name: String, value: String },

    #[error("Unknown sensor: {0}")]
    UnknownSensor(String),

    // === Region errors ===
    #[error("Provided wkt must be a polygon: {0}")]
    InvalidWkt(String),

    #[error("Region polygon has no vertices")]
    EmptyRegion,

    // === Geocoding errors ===
    #[error("Invalid tile geocoding: {0}")]
    InvalidGeocoding(String),

    #[error("Mismatched request and product name list lengths: {requests} vs {names}")]
    ListLengthMismatch { requests: usize, names: usize },
}
