//! Bounded-concurrency group coordination.
//!
//! Every group worker walks the same sequence: download what is missing,
//! verify, check the engine precondition, process under the process permit,
//! export under the adapt permit. Workers cooperate only through the three
//! shared counting semaphores; apart from their ceilings there is no
//! cross-group ordering.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use dias_client::CatalogApi;
use hindcast_common::footprint::{minimal_subset, GeocodingKind, TileGeocoding};
use hindcast_common::names::Sensor;
use processing::{Adapter, ChainRunner, ProcessingContext, SceneReader};

use crate::scheduler::ProductGroup;

/// The three stage ceilings shared by every group worker.
///
/// Created once per run and never resized. A ceiling of 1 serializes that
/// stage across all groups.
pub struct StageSemaphores {
    pub download: Arc<Semaphore>,
    pub process: Arc<Semaphore>,
    pub adapt: Arc<Semaphore>,
}

impl StageSemaphores {
    pub fn new(max_downloads: usize, max_processors: usize, max_adapters: usize) -> Self {
        Self {
            download: Arc::new(Semaphore::new(max_downloads.max(1))),
            process: Arc::new(Semaphore::new(max_processors.max(1))),
            adapt: Arc::new(Semaphore::new(max_adapters.max(1))),
        }
    }
}

/// Everything a group worker needs, shared read-only across workers.
pub struct RunContext {
    pub catalog: Arc<dyn CatalogApi>,
    pub scenes: Arc<dyn SceneReader>,
    pub chain: ChainRunner,
    pub adapters: Vec<Arc<dyn Adapter>>,
    pub processing: ProcessingContext,
    pub semaphores: StageSemaphores,
}

/// Terminal state of one group worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupStatus {
    /// All stages ran; lists the stages that produced a group artifact.
    Completed { stages: Vec<String> },
    /// The group stopped early. `fatal` marks configuration-level failures
    /// that must abort the whole run, not just this group.
    Failed { reason: String, fatal: bool },
}

/// Outcome of one group, collected by the driver for end-of-run reporting.
#[derive(Debug, Clone)]
pub struct GroupOutcome {
    pub date: chrono::NaiveDate,
    pub status: GroupStatus,
}

impl GroupOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, GroupStatus::Failed { .. })
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self.status, GroupStatus::Failed { fatal: true, .. })
    }
}

struct GroupFailure {
    reason: String,
    fatal: bool,
}

impl GroupFailure {
    fn group(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            fatal: false,
        }
    }

    fn run(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            fatal: true,
        }
    }
}

impl From<tokio::sync::AcquireError> for GroupFailure {
    fn from(e: tokio::sync::AcquireError) -> Self {
        GroupFailure::run(format!("stage semaphore closed: {e}"))
    }
}

/// Run one date-group through download, processing and export.
pub async fn run_group(ctx: Arc<RunContext>, group: ProductGroup) -> GroupOutcome {
    let date = group.date;
    match run_group_inner(&ctx, &group).await {
        Ok(stages) => {
            info!(date = %date, stages = stages.len(), "Group complete");
            GroupOutcome {
                date,
                status: GroupStatus::Completed { stages },
            }
        }
        Err(failure) => {
            error!(date = %date, reason = %failure.reason, "Group failed");
            GroupOutcome {
                date,
                status: GroupStatus::Failed {
                    reason: failure.reason,
                    fatal: failure.fatal,
                },
            }
        }
    }
}

async fn run_group_inner(
    ctx: &RunContext,
    group: &ProductGroup,
) -> Result<Vec<String>, GroupFailure> {
    // Download the products which are not yet available locally. Sequential
    // within the group, concurrent across groups up to the download ceiling.
    for (request, path) in group.requests.iter().zip(&group.paths) {
        if path.exists() {
            continue;
        }
        let _permit = ctx.semaphores.download.acquire().await?;
        info!(date = %group.date, product = %path.display(), "Downloading product");
        if let Err(e) = ctx.catalog.fetch(request, path).await {
            warn!(product = %path.display(), error = %e, "Download failed");
        }
    }

    // Verification gate: the group only proceeds complete.
    for path in &group.paths {
        if !path.exists() {
            return Err(GroupFailure::group(format!(
                "Download of product was not successful: {}",
                path.display()
            )));
        }
    }

    // Environment precondition for the ocean-color family: the engine must
    // geolocate per pixel, otherwise every result would be subtly wrong.
    if ctx.processing.sensor == Sensor::Olci {
        let reference = group
            .paths
            .first()
            .ok_or_else(|| GroupFailure::group("empty product group"))?;
        match ctx.scenes.geocoding_kind(reference).await {
            Ok(GeocodingKind::PerPixel) => {}
            Ok(GeocodingKind::TiePoint) => {
                return Err(GroupFailure::run(
                    "Per-pixel geocoding is not enabled in the engine configuration",
                ));
            }
            Err(e) => {
                return Err(GroupFailure::run(format!(
                    "Could not verify engine geocoding configuration: {e}"
                )));
            }
        }
    }

    // Process the whole group under one process permit, so the engine's
    // memory-heavy phase respects the configured ceiling end to end.
    let outputs = {
        let _permit = ctx.semaphores.process.acquire().await?;
        let tiles = necessary_tiles(ctx, group).await;
        ctx.chain.run(&ctx.processing, &tiles).await
    };

    {
        let _permit = ctx.semaphores.adapt.acquire().await?;
        for adapter in &ctx.adapters {
            if let Some(stage) = adapter.input_stage() {
                if !outputs.contains_key(stage) {
                    warn!(
                        date = %group.date,
                        adapter = adapter.name(),
                        stage,
                        "Input stage produced nothing for this group, skipping adapter"
                    );
                    continue;
                }
            }
            if let Err(e) = adapter.apply(&ctx.processing, &outputs).await {
                warn!(
                    date = %group.date,
                    adapter = adapter.name(),
                    error = %e,
                    "Adapter failed"
                );
            }
        }
    }

    Ok(outputs.into_keys().collect())
}

/// Reduce the group to the tiles actually needed to cover the region.
///
/// Only the known adjacent-tile layouts (2 or 4 tiles) are analyzed; any
/// other group size, and any group whose geocoding cannot be read, is used
/// unreduced.
async fn necessary_tiles(ctx: &RunContext, group: &ProductGroup) -> Vec<PathBuf> {
    if !matches!(group.paths.len(), 2 | 4) {
        return group.paths.clone();
    }

    let mut geocodings: Vec<TileGeocoding> = Vec::with_capacity(group.paths.len());
    for path in &group.paths {
        match ctx.scenes.geocoding(path).await {
            Ok(geocoding) => geocodings.push(geocoding),
            Err(e) => {
                warn!(
                    product = %path.display(),
                    error = %e,
                    "Could not read tile geocoding, keeping full group"
                );
                return group.paths.clone();
            }
        }
    }

    let (kept, covered) = minimal_subset(&geocodings, &ctx.processing.region);
    if !covered {
        warn!(date = %group.date, "Region is only partially covered by this group's tiles");
    }
    if kept.is_empty() {
        warn!(date = %group.date, "No tile overlaps the region, keeping full group");
        return group.paths.clone();
    }
    if kept.len() != group.paths.len() {
        info!(
            date = %group.date,
            "Group has been reduced from {} to {} necessary product(s)",
            group.paths.len(),
            kept.len()
        );
    }
    kept.into_iter().map(|i| group.paths[i].clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::{BTreeMap, HashMap};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::NaiveDate;

    use dias_client::{DiasError, SceneQuery};
    use hindcast_common::region::{GeoRect, RegionPolygon};
    use hindcast_common::request::DownloadRequest;
    use processing::{
        EngineConfig, GraphEngine, MosaicOp, ProcessingError, Processor, StageSettings,
    };

    /// Tracks how many calls run concurrently and the maximum ever seen.
    #[derive(Default)]
    struct Gauge {
        active: AtomicUsize,
        max_seen: AtomicUsize,
    }

    impl Gauge {
        fn enter(&self) {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
        }

        fn exit(&self) {
            self.active.fetch_sub(1, Ordering::SeqCst);
        }

        fn max(&self) -> usize {
            self.max_seen.load(Ordering::SeqCst)
        }
    }

    struct MockCatalog {
        gauge: Arc<Gauge>,
        failing_uuid: Option<String>,
    }

    #[async_trait]
    impl CatalogApi for MockCatalog {
        async fn resolve(
            &self,
            _query: &SceneQuery,
        ) -> dias_client::Result<(Vec<DownloadRequest>, Vec<String>)> {
            Ok((Vec::new(), Vec::new()))
        }

        async fn fetch(
            &self,
            request: &DownloadRequest,
            destination: &std::path::Path,
        ) -> dias_client::Result<()> {
            self.gauge.enter();
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.gauge.exit();
            if self.failing_uuid.as_deref() == Some(request.uuid.as_str()) {
                return Err(DiasError::Download("mock transport failure".to_string()));
            }
            if let Some(parent) = destination.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(destination, b"product")?;
            Ok(())
        }
    }

    struct MockScenes {
        kind: GeocodingKind,
        geocodings: HashMap<PathBuf, TileGeocoding>,
    }

    #[async_trait]
    impl SceneReader for MockScenes {
        async fn geocoding(&self, product: &Path) -> processing::Result<TileGeocoding> {
            self.geocodings
                .get(product)
                .cloned()
                .ok_or_else(|| ProcessingError::InvalidScene(product.display().to_string()))
        }

        async fn geocoding_kind(&self, _product: &Path) -> processing::Result<GeocodingKind> {
            Ok(self.kind)
        }
    }

    struct MockStage {
        gauge: Arc<Gauge>,
        seen_tiles: Arc<Mutex<Vec<PathBuf>>>,
    }

    #[async_trait]
    impl Processor for MockStage {
        fn name(&self) -> &'static str {
            "MOCK"
        }

        async fn run(
            &self,
            ctx: &ProcessingContext,
            tile: &Path,
            _prior: &HashMap<String, PathBuf>,
        ) -> processing::Result<PathBuf> {
            self.gauge.enter();
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.gauge.exit();
            self.seen_tiles.lock().unwrap().push(tile.to_path_buf());
            Ok(ctx
                .out_root
                .join(format!("MOCK_{}.nc", tile.file_name().unwrap().to_str().unwrap())))
        }
    }

    struct MockMosaic;

    #[async_trait]
    impl MosaicOp for MockMosaic {
        async fn merge(
            &self,
            ctx: &ProcessingContext,
            stage: &str,
            _inputs: &[PathBuf],
        ) -> processing::Result<PathBuf> {
            Ok(ctx.out_root.join(format!("{stage}_MOSAIC.nc")))
        }
    }

    struct MockAdapter {
        input_stage: Option<String>,
        applied: AtomicUsize,
    }

    #[async_trait]
    impl Adapter for MockAdapter {
        fn name(&self) -> &'static str {
            "MOCKADAPTER"
        }

        fn input_stage(&self) -> Option<&str> {
            self.input_stage.as_deref()
        }

        async fn apply(
            &self,
            _ctx: &ProcessingContext,
            _outputs: &BTreeMap<String, PathBuf>,
        ) -> processing::Result<()> {
            self.applied.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct TestRun {
        ctx: Arc<RunContext>,
        download_gauge: Arc<Gauge>,
        process_gauge: Arc<Gauge>,
        seen_tiles: Arc<Mutex<Vec<PathBuf>>>,
    }

    fn processing_context(out_root: &Path, sensor: Sensor) -> ProcessingContext {
        ProcessingContext {
            engine: GraphEngine::new(EngineConfig {
                gpt_path: PathBuf::from("true"),
                cache_size: "512M".to_string(),
                use_default: false,
                properties_path: None,
            }),
            sensor,
            resolution: 300,
            region: RegionPolygon::from_wkt(
                "POLYGON ((0.2 0.2, 0.8 0.2, 0.8 0.8, 0.2 0.8, 0.2 0.2))",
            )
            .unwrap(),
            region_name: "testlake".to_string(),
            out_root: out_root.to_path_buf(),
            synchronise: true,
            stages: HashMap::<String, StageSettings>::new(),
            adapters: HashMap::new(),
        }
    }

    fn test_run(
        out_root: &Path,
        sensor: Sensor,
        kind: GeocodingKind,
        ceilings: (usize, usize, usize),
        failing_uuid: Option<&str>,
        geocodings: HashMap<PathBuf, TileGeocoding>,
        adapters: Vec<Arc<dyn Adapter>>,
    ) -> TestRun {
        let download_gauge = Arc::new(Gauge::default());
        let process_gauge = Arc::new(Gauge::default());
        let seen_tiles = Arc::new(Mutex::new(Vec::new()));

        let ctx = Arc::new(RunContext {
            catalog: Arc::new(MockCatalog {
                gauge: download_gauge.clone(),
                failing_uuid: failing_uuid.map(str::to_string),
            }),
            scenes: Arc::new(MockScenes { kind, geocodings }),
            chain: ChainRunner::new(
                vec![Arc::new(MockStage {
                    gauge: process_gauge.clone(),
                    seen_tiles: seen_tiles.clone(),
                })],
                Arc::new(MockMosaic),
            ),
            adapters,
            processing: processing_context(out_root, sensor),
            semaphores: StageSemaphores::new(ceilings.0, ceilings.1, ceilings.2),
        });

        TestRun {
            ctx,
            download_gauge,
            process_gauge,
            seen_tiles,
        }
    }

    fn group(dir: &Path, date: (i32, u32, u32), products: &[&str]) -> ProductGroup {
        ProductGroup {
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            requests: products
                .iter()
                .map(|p| DownloadRequest::new(format!("uuid-{p}")))
                .collect(),
            paths: products.iter().map(|p| dir.join(p)).collect(),
        }
    }

    async fn run_all(ctx: Arc<RunContext>, groups: Vec<ProductGroup>) -> Vec<GroupOutcome> {
        let mut workers = tokio::task::JoinSet::new();
        for g in groups {
            let ctx = ctx.clone();
            workers.spawn(async move { run_group(ctx, g).await });
        }
        let mut outcomes = Vec::new();
        while let Some(joined) = workers.join_next().await {
            outcomes.push(joined.unwrap());
        }
        outcomes
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn download_ceiling_bounds_concurrent_fetches() {
        let dir = tempfile::tempdir().unwrap();
        let run = test_run(
            dir.path(),
            Sensor::Msi,
            GeocodingKind::PerPixel,
            (2, 8, 8),
            None,
            HashMap::new(),
            Vec::new(),
        );

        let groups: Vec<ProductGroup> = (1..=5)
            .map(|day| {
                let name = format!("S2A_MSIL1C_2021010{day}T102411_N0209_R065_T32TLS_X.SAFE");
                group(dir.path(), (2021, 1, day), &[name.as_str()])
            })
            .collect();
        let paths: Vec<PathBuf> = groups.iter().flat_map(|g| g.paths.clone()).collect();

        let outcomes = run_all(run.ctx, groups).await;

        assert_eq!(outcomes.len(), 5);
        assert!(outcomes.iter().all(|o| !o.is_failed()));
        assert!(paths.iter().all(|p| p.exists()));
        assert!(
            run.download_gauge.max() <= 2,
            "saw {} concurrent downloads",
            run.download_gauge.max()
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn process_ceiling_one_serializes_processing() {
        let dir = tempfile::tempdir().unwrap();
        let run = test_run(
            dir.path(),
            Sensor::Msi,
            GeocodingKind::PerPixel,
            (8, 1, 8),
            None,
            HashMap::new(),
            Vec::new(),
        );

        let groups: Vec<ProductGroup> = (1..=3)
            .map(|day| {
                let name = format!("S2A_MSIL1C_2021020{day}T102411_N0209_R065_T32TLS_X.SAFE");
                let g = group(dir.path(), (2021, 2, day), &[name.as_str()]);
                // Products already available: no downloads involved.
                for p in &g.paths {
                    std::fs::write(p, b"product").unwrap();
                }
                g
            })
            .collect();

        let outcomes = run_all(run.ctx, groups).await;

        assert!(outcomes.iter().all(|o| !o.is_failed()));
        assert_eq!(
            run.process_gauge.max(),
            1,
            "process bodies of two groups overlapped"
        );
    }

    #[tokio::test]
    async fn failed_download_aborts_only_that_group() {
        let dir = tempfile::tempdir().unwrap();
        let bad = "S2A_MSIL1C_20210301T102411_N0209_R065_T32TLS_X.SAFE";
        let run = test_run(
            dir.path(),
            Sensor::Msi,
            GeocodingKind::PerPixel,
            (1, 1, 1),
            Some(&format!("uuid-{bad}")),
            HashMap::new(),
            Vec::new(),
        );

        let groups = vec![
            group(dir.path(), (2021, 3, 1), &[bad]),
            group(
                dir.path(),
                (2021, 3, 2),
                &["S2A_MSIL1C_20210302T102411_N0209_R065_T32TLS_X.SAFE"],
            ),
        ];
        let mut outcomes = run_all(run.ctx, groups).await;
        outcomes.sort_by_key(|o| o.date);

        assert!(outcomes[0].is_failed());
        assert!(!outcomes[0].is_fatal());
        assert!(!outcomes[1].is_failed());
    }

    #[tokio::test]
    async fn tie_point_geocoding_is_run_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let run = test_run(
            dir.path(),
            Sensor::Olci,
            GeocodingKind::TiePoint,
            (1, 1, 1),
            None,
            HashMap::new(),
            Vec::new(),
        );

        let name = "S3A_OL_1_EFR____20210104T093232_20210104T093532_20210105T134312_X.SEN3";
        let g = group(dir.path(), (2021, 1, 4), &[name]);
        std::fs::write(&g.paths[0], b"product").unwrap();

        let outcomes = run_all(run.ctx, vec![g]).await;
        assert!(outcomes[0].is_fatal());
    }

    #[tokio::test]
    async fn adapters_follow_their_input_stage() {
        let dir = tempfile::tempdir().unwrap();
        let matched = Arc::new(MockAdapter {
            input_stage: Some("MOCK".to_string()),
            applied: AtomicUsize::new(0),
        });
        let unmatched = Arc::new(MockAdapter {
            input_stage: Some("ABSENT".to_string()),
            applied: AtomicUsize::new(0),
        });
        let unconditional = Arc::new(MockAdapter {
            input_stage: None,
            applied: AtomicUsize::new(0),
        });

        let run = test_run(
            dir.path(),
            Sensor::Msi,
            GeocodingKind::PerPixel,
            (1, 1, 1),
            None,
            HashMap::new(),
            vec![matched.clone(), unmatched.clone(), unconditional.clone()],
        );

        let g = group(
            dir.path(),
            (2021, 4, 1),
            &["S2A_MSIL1C_20210401T102411_N0209_R065_T32TLS_X.SAFE"],
        );
        std::fs::write(&g.paths[0], b"product").unwrap();

        let outcomes = run_all(run.ctx, vec![g]).await;
        assert!(!outcomes[0].is_failed());
        assert_eq!(matched.applied.load(Ordering::SeqCst), 1);
        assert_eq!(unmatched.applied.load(Ordering::SeqCst), 0);
        assert_eq!(unconditional.applied.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pair_group_is_reduced_before_processing() {
        let dir = tempfile::tempdir().unwrap();
        let covering = "S2A_MSIL1C_20210501T102411_N0209_R065_T32TLS_X.SAFE";
        let redundant = "S2A_MSIL1C_20210501T102411_N0209_R065_T32TMS_X.SAFE";

        // The region polygon sits inside the first tile's footprint only.
        let mut geocodings = HashMap::new();
        geocodings.insert(
            dir.path().join(covering),
            TileGeocoding::from_extent(GeoRect::new(0.0, 0.0, 1.0, 1.0), 100, 100),
        );
        geocodings.insert(
            dir.path().join(redundant),
            TileGeocoding::from_extent(GeoRect::new(1.0, 0.0, 2.0, 1.0), 100, 100),
        );

        let run = test_run(
            dir.path(),
            Sensor::Msi,
            GeocodingKind::PerPixel,
            (1, 1, 1),
            None,
            geocodings,
            Vec::new(),
        );

        let g = group(dir.path(), (2021, 5, 1), &[covering, redundant]);
        for p in &g.paths {
            std::fs::write(p, b"product").unwrap();
        }

        let outcomes = run_all(run.ctx, vec![g]).await;
        assert!(!outcomes[0].is_failed());

        let seen = run.seen_tiles.lock().unwrap();
        assert_eq!(seen.as_slice(), &[dir.path().join(covering)]);
    }

    #[tokio::test]
    async fn unreadable_geocoding_keeps_full_group() {
        let dir = tempfile::tempdir().unwrap();
        let run = test_run(
            dir.path(),
            Sensor::Msi,
            GeocodingKind::PerPixel,
            (1, 1, 1),
            None,
            HashMap::new(),
            Vec::new(),
        );

        let g = group(
            dir.path(),
            (2021, 6, 1),
            &[
                "S2A_MSIL1C_20210601T102411_N0209_R065_T32TLS_X.SAFE",
                "S2A_MSIL1C_20210601T102411_N0209_R065_T32TMS_X.SAFE",
            ],
        );
        for p in &g.paths {
            std::fs::write(p, b"product").unwrap();
        }

        let outcomes = run_all(run.ctx, vec![g]).await;
        assert!(!outcomes[0].is_failed());
        assert_eq!(run.seen_tiles.lock().unwrap().len(), 2);
    }
}
