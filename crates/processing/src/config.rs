//! Configuration surface of the processing crate.
//!
//! These structs are deserialized from the driver's environment and params
//! files and bundled into a [`ProcessingContext`] shared by every stage.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use hindcast_common::names::Sensor;
use hindcast_common::region::RegionPolygon;

/// External graph-engine installation.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Path to the engine's graph-processing binary.
    pub gpt_path: PathBuf,
    /// Tile cache handed to the engine.
    #[serde(default = "default_cache_size")]
    pub cache_size: String,
    /// Invoke the engine with its own default options instead of ours.
    #[serde(default)]
    pub use_default: bool,
    /// Properties file of the engine's reader configuration, used for the
    /// per-pixel geocoding precondition.
    #[serde(default)]
    pub properties_path: Option<PathBuf>,
}

fn default_cache_size() -> String {
    "2048M".to_string()
}

/// Per-stage tuning, keyed by stage name in the params file.
#[derive(Debug, Clone, Deserialize)]
pub struct StageSettings {
    /// Band arithmetic deciding which pixels the stage may trust.
    #[serde(default)]
    pub valid_expression: String,
    /// Name of the upstream stage whose artifact feeds this stage; the
    /// level-1 product is used when unset.
    #[serde(default)]
    pub input_stage: Option<String>,
    /// Engine invocations per tile before giving up.
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    /// Engine timeout in seconds; does not apply to the final attempt.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_attempts() -> u32 {
    1
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            valid_expression: String::new(),
            input_stage: None,
            attempts: default_attempts(),
            timeout_secs: None,
        }
    }
}

/// Per-adapter settings, keyed by adapter name in the params file.
#[derive(Debug, Clone, Deserialize)]
pub struct AdapterSettings {
    /// The processing stage whose group-level artifact this adapter exports.
    pub input_stage: String,
    /// Root directory for exported artifacts.
    #[serde(default)]
    pub root_path: Option<PathBuf>,
    /// Endpoint notified after a successful export.
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Everything a stage invocation needs to know about the run.
///
/// Built once per hindcast invocation and shared read-only between all
/// group workers.
#[derive(Debug, Clone)]
pub struct ProcessingContext {
    pub engine: crate::engine::GraphEngine,
    pub sensor: Sensor,
    /// Target resolution in meters.
    pub resolution: u32,
    pub region: RegionPolygon,
    /// Human-readable region name, used in export trees.
    pub region_name: String,
    /// Root of the level-2 output tree.
    pub out_root: PathBuf,
    /// Keep existing artifacts (`true`) or force re-runs (`false`).
    pub synchronise: bool,
    pub stages: HashMap<String, StageSettings>,
    pub adapters: HashMap<String, AdapterSettings>,
}

impl ProcessingContext {
    /// Settings for a stage, falling back to defaults when unconfigured.
    pub fn stage_settings(&self, stage: &str) -> StageSettings {
        self.stages.get(stage).cloned().unwrap_or_default()
    }
}
