//! Built-in output adapters.

pub mod manifest;
pub mod portal;

pub use manifest::ManifestAdapter;
pub use portal::PortalAdapter;
