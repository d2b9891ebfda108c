//! External graph-engine invocation.
//!
//! All pixel-level work happens in a third-party processing engine driven
//! through its command-line graph processor. The engine is an opaque,
//! long-running external process; this module only sequences its
//! invocations, enforces attempts/timeout policy and cleans up after
//! failures.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use hindcast_common::region::RegionPolygon;

use crate::config::EngineConfig;
use crate::error::{ProcessingError, Result};

/// Handle on the configured engine installation.
#[derive(Debug, Clone)]
pub struct GraphEngine {
    config: EngineConfig,
}

impl GraphEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Run a graph over one source product, writing one target artifact.
    ///
    /// Retries up to `attempts` times; the timeout is not applied to the
    /// final attempt, so a slow-but-healthy run still gets one unbounded
    /// chance. A failed run's truncated target artifact is removed before
    /// the next attempt.
    pub async fn run_graph(
        &self,
        graph: &Path,
        source: &Path,
        target: &Path,
        attempts: u32,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let attempts = attempts.max(1);
        for attempt in 1..=attempts {
            let last = attempt == attempts;
            let effective_timeout = if last { None } else { timeout };

            match self.invoke(graph, source, target, effective_timeout).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    if target.exists() {
                        std::fs::remove_file(target).ok();
                        warn!(target = %target.display(), "Removed corrupted output file");
                    }
                    if last {
                        warn!(graph = %graph.display(), error = %e, "Engine run failed");
                        return Err(ProcessingError::EngineFailed {
                            graph: graph.display().to_string(),
                            attempts,
                        });
                    }
                    warn!(
                        graph = %graph.display(),
                        error = %e,
                        attempt,
                        attempts,
                        "Engine run failed, retrying"
                    );
                }
            }
        }
        unreachable!("attempts >= 1")
    }

    async fn invoke(
        &self,
        graph: &Path,
        source: &Path,
        target: &Path,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let mut command = Command::new(&self.config.gpt_path);
        command.arg(graph);
        if !self.config.use_default {
            command.arg("-c").arg(&self.config.cache_size).arg("-e");
        }
        command.arg(format!("-SsourceFile={}", source.display()));
        command.arg(format!("-PoutputFile={}", target.display()));

        debug!(
            engine = %self.config.gpt_path.display(),
            graph = %graph.display(),
            source = %source.display(),
            "Invoking graph engine"
        );

        let mut child = command.spawn()?;
        let status = match timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status?,
                Err(_) => {
                    child.kill().await.ok();
                    return Err(ProcessingError::EngineTimeout(limit.as_secs()));
                }
            },
            None => child.wait().await?,
        };

        if status.success() {
            Ok(())
        } else {
            Err(ProcessingError::EngineExit(status))
        }
    }

    /// Merge several per-tile artifacts into one mosaic.
    pub async fn run_mosaic(
        &self,
        inputs: &[PathBuf],
        target: &Path,
        region: &RegionPolygon,
        resolution: u32,
    ) -> Result<()> {
        let bounds = region.bounds();
        let grid = region.reproject_params(resolution);

        let mut command = Command::new(&self.config.gpt_path);
        command.arg("Mosaic");
        if !self.config.use_default {
            command.arg("-c").arg(&self.config.cache_size).arg("-e");
        }
        command
            .arg(format!("-PwestBound={}", bounds.min_lon))
            .arg(format!("-PeastBound={}", bounds.max_lon))
            .arg(format!("-PsouthBound={}", bounds.min_lat))
            .arg(format!("-PnorthBound={}", bounds.max_lat))
            .arg(format!("-PpixelSizeX={}", grid.pixel_size_x))
            .arg(format!("-PpixelSizeY={}", grid.pixel_size_y))
            .arg("-t")
            .arg(target);
        for input in inputs {
            command.arg(input);
        }

        debug!(inputs = inputs.len(), target = %target.display(), "Invoking mosaic");

        let status = command.spawn()?.wait().await?;
        if status.success() {
            Ok(())
        } else {
            if target.exists() {
                std::fs::remove_file(target).ok();
                warn!(target = %target.display(), "Removed corrupted mosaic output");
            }
            Err(ProcessingError::EngineExit(status))
        }
    }

    /// Whether the engine's reader configuration enables per-pixel
    /// geocoding for the ocean-color family.
    ///
    /// Absent configuration counts as disabled, so the precondition check
    /// fails loudly instead of silently processing with tie-point geocoding.
    pub fn pixel_geocoding_enabled(&self) -> Result<bool> {
        let Some(path) = &self.config.properties_path else {
            return Ok(false);
        };
        let text = std::fs::read_to_string(path)?;
        Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.starts_with('#'))
            .filter_map(|line| line.split_once('='))
            .any(|(key, value)| {
                key.trim() == "s3tbx.reader.olci.pixelGeoCoding" && value.trim() == "true"
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn engine_with(gpt_path: &str, properties: Option<PathBuf>) -> GraphEngine {
        GraphEngine::new(EngineConfig {
            gpt_path: PathBuf::from(gpt_path),
            cache_size: "1024M".to_string(),
            use_default: false,
            properties_path: properties,
        })
    }

    #[tokio::test]
    async fn successful_run_returns_ok() {
        let engine = engine_with("true", None);
        let dir = tempfile::tempdir().unwrap();
        engine
            .run_graph(
                &dir.path().join("graph.xml"),
                &dir.path().join("in.nc"),
                &dir.path().join("out.nc"),
                1,
                None,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn failing_run_reports_attempts() {
        let engine = engine_with("false", None);
        let dir = tempfile::tempdir().unwrap();
        let err = engine
            .run_graph(
                &dir.path().join("graph.xml"),
                &dir.path().join("in.nc"),
                &dir.path().join("out.nc"),
                2,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProcessingError::EngineFailed { attempts: 2, .. }
        ));
    }

    #[test]
    fn pixel_geocoding_flag_parsing() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# reader configuration").unwrap();
        writeln!(file, "s3tbx.reader.olci.pixelGeoCoding = true").unwrap();
        let engine = engine_with("true", Some(file.path().to_path_buf()));
        assert!(engine.pixel_geocoding_enabled().unwrap());

        let engine = engine_with("true", None);
        assert!(!engine.pixel_geocoding_enabled().unwrap());
    }

    #[test]
    fn pixel_geocoding_flag_disabled() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "s3tbx.reader.olci.pixelGeoCoding=false").unwrap();
        let engine = engine_with("true", Some(file.path().to_path_buf()));
        assert!(!engine.pixel_geocoding_enabled().unwrap());
    }
}
