//! Configuration loading for the hindcast driver.
//!
//! Two YAML files describe a run: the environment file (archive endpoints,
//! credentials, engine installation, local roots) and the params file (what
//! to process: sensor, region, period, stages, adapters). The params file is
//! copied into the output tree so every run documents itself.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use dias_client::Credentials;
use hindcast_common::names::Sensor;
use processing::{AdapterSettings, EngineConfig, StageSettings};

/// Environment-level configuration: where things live and how to reach them.
#[derive(Debug, Clone, Deserialize)]
pub struct EnvConfig {
    pub general: GeneralEnv,
    pub dias: DiasEnv,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralEnv {
    /// Root of the local level-1 product archive.
    pub l1_root: PathBuf,
    /// Root under which each job's level-2 output tree is created.
    pub out_root: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiasEnv {
    /// Which archive client to use.
    pub api: String,
    pub credentials: Credentials,
    /// Optional path template overriding `<l1_root>/<product_name>`;
    /// placeholders as in the name parser's path templating.
    #[serde(default)]
    pub l1_path_template: Option<String>,
}

/// Job-level parameters: what to hindcast.
#[derive(Debug, Clone, Deserialize)]
pub struct ParamsConfig {
    pub general: GeneralParams,
    #[serde(default)]
    pub stages: HashMap<String, StageSettings>,
    #[serde(default)]
    pub adapters: HashMap<String, AdapterSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralParams {
    /// Job name; becomes the output subfolder and export region name.
    pub name: String,
    pub sensor: Sensor,
    /// Target resolution in meters.
    pub resolution: u32,
    /// Region of interest as WKT polygon text.
    pub wkt: String,
    /// Inclusive sensing period bounds (ISO dates or datetimes).
    pub start: String,
    pub end: String,
    /// Stage names in execution order.
    #[serde(default)]
    pub processors: Vec<String>,
    /// Adapter names applied to every finished group.
    #[serde(default)]
    pub adapters: Vec<String>,
    /// Restrict gridded products to these tile ids.
    #[serde(default)]
    pub tiles: Option<Vec<String>>,
    /// Keep existing artifacts instead of recomputing them.
    #[serde(default = "default_true")]
    pub synchronise: bool,
    #[serde(default = "default_parallel")]
    pub max_parallel_downloads: usize,
    #[serde(default = "default_parallel")]
    pub max_parallel_processors: usize,
    #[serde(default = "default_parallel")]
    pub max_parallel_adapters: usize,
}

fn default_true() -> bool {
    true
}

fn default_parallel() -> usize {
    1
}

impl EnvConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read env file: {}", path.display()))?;
        let config: EnvConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse env file: {}", path.display()))?;
        debug!(path = %path.display(), "Loaded environment configuration");
        Ok(config)
    }
}

impl ParamsConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read params file: {}", path.display()))?;
        let config: ParamsConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse params file: {}", path.display()))?;
        debug!(job = %config.general.name, path = %path.display(), "Loaded job parameters");
        Ok(config)
    }
}

/// Local directories of one run.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub l1_root: PathBuf,
    pub l2_root: PathBuf,
}

/// Create the run's directories and copy the params file into the output
/// tree for reproducibility.
pub fn init_run(env: &EnvConfig, params: &ParamsConfig, params_path: &Path) -> Result<RunPaths> {
    let l1_root = env.general.l1_root.clone();
    let l2_root = env.general.out_root.join(&params.general.name);
    std::fs::create_dir_all(&l1_root)
        .with_context(|| format!("Failed to create {}", l1_root.display()))?;
    std::fs::create_dir_all(&l2_root)
        .with_context(|| format!("Failed to create {}", l2_root.display()))?;

    if let Some(file_name) = params_path.file_name() {
        std::fs::copy(params_path, l2_root.join(file_name))
            .with_context(|| "Failed to copy params file into output tree".to_string())?;
    }

    info!(
        l1 = %l1_root.display(),
        l2 = %l2_root.display(),
        "Initialized run directories"
    );
    Ok(RunPaths { l1_root, l2_root })
}

/// Local path a product will occupy once downloaded.
pub fn l1_product_path(env: &EnvConfig, paths: &RunPaths, product_name: &str) -> PathBuf {
    match &env.dias.l1_path_template {
        Some(template) => match hindcast_common::names::l1_product_path(template, product_name) {
            Ok(filled) => PathBuf::from(filled),
            Err(_) => paths.l1_root.join(product_name),
        },
        None => paths.l1_root.join(product_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENV_YAML: &str = r#"
general:
  l1_root: /data/l1
  out_root: /data/l2

dias:
  api: FINDER
  credentials:
    username: someone
    password: secret

engine:
  gpt_path: /opt/engine/bin/gpt
  properties_path: /opt/engine/etc/reader.properties
"#;

    const PARAMS_YAML: &str = r#"
general:
  name: greifensee
  sensor: OLCI
  resolution: 300
  wkt: "POLYGON ((8.63 47.31, 8.71 47.31, 8.71 47.38, 8.63 47.38, 8.63 47.31))"
  start: "2021-01-01"
  end: "2021-01-31"
  processors: [PIXCLASS, ATMCORR]
  adapters: [PORTAL]
  max_parallel_downloads: 2

stages:
  ATMCORR:
    input_stage: PIXCLASS
    attempts: 2
    timeout_secs: 1800

adapters:
  PORTAL:
    input_stage: ATMCORR
    root_path: /data/portal
"#;

    #[test]
    fn parse_env_config() {
        let env: EnvConfig = serde_yaml::from_str(ENV_YAML).unwrap();
        assert_eq!(env.dias.api, "FINDER");
        assert_eq!(env.general.l1_root, PathBuf::from("/data/l1"));
        assert_eq!(env.engine.cache_size, "2048M");
        assert!(env.dias.l1_path_template.is_none());
    }

    #[test]
    fn parse_params_config() {
        let params: ParamsConfig = serde_yaml::from_str(PARAMS_YAML).unwrap();
        assert_eq!(params.general.sensor, Sensor::Olci);
        assert_eq!(params.general.processors, vec!["PIXCLASS", "ATMCORR"]);
        assert_eq!(params.general.max_parallel_downloads, 2);
        // Unset maxima fall back to fully serial.
        assert_eq!(params.general.max_parallel_processors, 1);
        assert!(params.general.synchronise);

        let atmcorr = &params.stages["ATMCORR"];
        assert_eq!(atmcorr.input_stage.as_deref(), Some("PIXCLASS"));
        assert_eq!(atmcorr.attempts, 2);

        let portal = &params.adapters["PORTAL"];
        assert_eq!(portal.input_stage, "ATMCORR");
    }

    #[test]
    fn init_run_copies_params_for_reproducibility() {
        let dir = tempfile::tempdir().unwrap();
        let mut env: EnvConfig = serde_yaml::from_str(ENV_YAML).unwrap();
        env.general.l1_root = dir.path().join("l1");
        env.general.out_root = dir.path().join("l2");

        let params: ParamsConfig = serde_yaml::from_str(PARAMS_YAML).unwrap();
        let params_path = dir.path().join("greifensee.yaml");
        std::fs::write(&params_path, PARAMS_YAML).unwrap();

        let paths = init_run(&env, &params, &params_path).unwrap();
        assert!(paths.l1_root.is_dir());
        assert_eq!(paths.l2_root, dir.path().join("l2").join("greifensee"));
        assert!(paths.l2_root.join("greifensee.yaml").is_file());
    }

    #[test]
    fn product_path_uses_template_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let mut env: EnvConfig = serde_yaml::from_str(ENV_YAML).unwrap();
        env.dias.l1_path_template =
            Some("/archive/{satellite}/{year}/{month}/{day}/{product_name}".to_string());

        let paths = RunPaths {
            l1_root: dir.path().to_path_buf(),
            l2_root: dir.path().to_path_buf(),
        };
        let name = "S3A_OL_1_EFR____20210104T093232_20210104T093532_20210105T134312_0180_067_036_2160_LN1_O_NT_002.SEN3";
        let path = l1_product_path(&env, &paths, name);
        assert_eq!(
            path,
            PathBuf::from(format!("/archive/Sentinel-3/2021/01/04/{name}"))
        );

        // Unparseable names fall back to the flat layout.
        let fallback = l1_product_path(&env, &paths, "not-a-product");
        assert_eq!(fallback, dir.path().join("not-a-product"));
    }
}
