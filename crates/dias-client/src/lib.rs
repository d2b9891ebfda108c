//! Clients for the remote data archives the hindcast pipeline pulls from.
//!
//! The driver only ever talks to the [`CatalogApi`] trait; the concrete
//! archive protocol behind it is selected once at startup by name.

pub mod api;
pub mod auth;
pub mod download;
pub mod error;
pub mod finder;

pub use api::{create_client, CatalogApi, Credentials, SceneQuery};
pub use error::{DiasError, Result};
pub use finder::FinderApi;
