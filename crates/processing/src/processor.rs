//! Processing stage capability.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::config::ProcessingContext;
use crate::error::Result;

/// One configured processing stage.
///
/// Implementations wrap an external algorithm; the pipeline only cares that
/// a tile goes in and an artifact path comes out.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Stage name as used in configuration and output keys.
    fn name(&self) -> &'static str;

    /// Process one tile and return the artifact path.
    ///
    /// `prior` maps earlier stage names to this tile's artifacts, for stages
    /// that consume an upstream product instead of the level-1 tile.
    /// Idempotent: an existing target artifact is returned without
    /// recomputation unless the run forces re-processing.
    async fn run(
        &self,
        ctx: &ProcessingContext,
        tile: &Path,
        prior: &HashMap<String, PathBuf>,
    ) -> Result<PathBuf>;
}
