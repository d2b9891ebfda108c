//! Chain runner: drives a group of tiles through the configured stages.
//!
//! Failures are contained at tile+stage granularity; a tile that fails one
//! stage simply contributes nothing to that stage's group result while
//! sibling tiles and later stages continue.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::ProcessingContext;
use crate::error::ProcessingError;
use crate::mosaic::MosaicOp;
use crate::processor::Processor;

/// Two-level output map of a running group: tile → stage → artifact, plus
/// the finalized group-level stage → artifact entries.
///
/// Tile-level entries exist only while some later stage may still consume
/// them; pruning is driven by the chain runner once a stage's mosaic is
/// finalized and no downstream stage names it as input.
#[derive(Debug, Default)]
pub struct StageOutputs {
    tiles: HashMap<PathBuf, HashMap<String, PathBuf>>,
    group: BTreeMap<String, PathBuf>,
}

impl StageOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tile(&mut self, tile: &Path, stage: &str, artifact: PathBuf) {
        self.tiles
            .entry(tile.to_path_buf())
            .or_default()
            .insert(stage.to_string(), artifact);
    }

    /// This tile's finished stage artifacts, for use as processor input.
    pub fn tile_outputs(&self, tile: &Path) -> HashMap<String, PathBuf> {
        self.tiles.get(tile).cloned().unwrap_or_default()
    }

    pub fn tile_artifact(&self, tile: &Path, stage: &str) -> Option<&PathBuf> {
        self.tiles.get(tile).and_then(|stages| stages.get(stage))
    }

    /// Record the group-level artifact of a finished stage.
    pub fn finalize_stage(&mut self, stage: &str, artifact: PathBuf) {
        self.group.insert(stage.to_string(), artifact);
    }

    /// Drop every tile-level entry of a stage.
    pub fn prune_stage(&mut self, stage: &str) {
        for stages in self.tiles.values_mut() {
            stages.remove(stage);
        }
    }

    pub fn has_tile_entries(&self, stage: &str) -> bool {
        self.tiles.values().any(|stages| stages.contains_key(stage))
    }

    pub fn group_artifacts(&self) -> &BTreeMap<String, PathBuf> {
        &self.group
    }

    pub fn into_group_artifacts(self) -> BTreeMap<String, PathBuf> {
        self.group
    }
}

/// Runs every configured stage over a group's tiles and mosaics the results.
pub struct ChainRunner {
    processors: Vec<Arc<dyn Processor>>,
    mosaic: Arc<dyn MosaicOp>,
}

impl ChainRunner {
    pub fn new(processors: Vec<Arc<dyn Processor>>, mosaic: Arc<dyn MosaicOp>) -> Self {
        Self { processors, mosaic }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.processors.iter().map(|p| p.name()).collect()
    }

    /// Process a (possibly reduced) tile list, returning stage → artifact.
    ///
    /// A stage with a single surviving tile output uses that artifact
    /// directly; multiple outputs are mosaicked; zero outputs leave the
    /// stage absent from the result.
    pub async fn run(
        &self,
        ctx: &ProcessingContext,
        tiles: &[PathBuf],
    ) -> BTreeMap<String, PathBuf> {
        let mut outputs = StageOutputs::new();
        let prune_after = self.prune_points(ctx);

        for (index, processor) in self.processors.iter().enumerate() {
            let stage = processor.name();

            for tile in tiles {
                let prior = outputs.tile_outputs(tile);
                match processor.run(ctx, tile, &prior).await {
                    Ok(artifact) => outputs.record_tile(tile, stage, artifact),
                    Err(ProcessingError::NotApplicable { .. }) => {
                        debug!(stage, tile = %tile.display(), "Stage not applicable");
                    }
                    Err(e) => {
                        warn!(
                            stage,
                            tile = %tile.display(),
                            error = %e,
                            "Stage failed for tile"
                        );
                    }
                }
            }

            let produced: Vec<PathBuf> = tiles
                .iter()
                .filter_map(|tile| outputs.tile_artifact(tile, stage).cloned())
                .collect();

            match produced.as_slice() {
                [] => info!(stage, "Stage produced no output for this group"),
                [single] => outputs.finalize_stage(stage, single.clone()),
                many => match self.mosaic.merge(ctx, stage, many).await {
                    Ok(mosaic) => outputs.finalize_stage(stage, mosaic),
                    Err(e) => warn!(stage, error = %e, "Mosaicking failed"),
                },
            }

            for (consumed_stage, last_consumer) in &prune_after {
                if *last_consumer == index {
                    outputs.prune_stage(consumed_stage);
                }
            }
        }

        outputs.into_group_artifacts()
    }

    /// For each stage, the index of the last stage consuming its per-tile
    /// artifacts; tile entries are pruned right after that stage finishes.
    fn prune_points(&self, ctx: &ProcessingContext) -> HashMap<String, usize> {
        let mut points = HashMap::new();
        for (i, processor) in self.processors.iter().enumerate() {
            let mut last = i;
            for (j, consumer) in self.processors.iter().enumerate().skip(i + 1) {
                let settings = ctx.stage_settings(consumer.name());
                if settings.input_stage.as_deref() == Some(processor.name()) {
                    last = j;
                }
            }
            points.insert(processor.name().to_string(), last);
        }
        points
    }
}
