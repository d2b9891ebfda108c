//! Downstream adapter capability.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::config::ProcessingContext;
use crate::error::Result;

/// One configured downstream consumer of finished stage artifacts.
///
/// Adapters are side-effect only: they export or publish, and the pipeline
/// consumes nothing they produce. Failures are logged and never fatal.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Adapter name as used in configuration.
    fn name(&self) -> &'static str;

    /// The upstream stage whose artifact this adapter exports, or `None`
    /// when it consumes whatever stages are present.
    fn input_stage(&self) -> Option<&str>;

    /// Export the group's finished stage artifacts.
    async fn apply(
        &self,
        ctx: &ProcessingContext,
        outputs: &BTreeMap<String, PathBuf>,
    ) -> Result<()>;
}
