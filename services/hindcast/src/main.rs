//! Satellite-imagery hindcast driver.
//!
//! Resolves matching scenes from a remote archive, downloads what is not
//! yet local, runs the configured processing stages per sensing-date group
//! and fans finished artifacts out to the configured adapters, all under
//! independent download/process/adapt concurrency ceilings.

mod config;
mod coordinator;
mod scheduler;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use dias_client::{create_client, SceneQuery};
use hindcast_common::filters::filter_for_tiles;
use hindcast_common::region::RegionPolygon;
use processing::{
    resolve_adapters, resolve_processors, ChainRunner, EngineMosaic, GraphEngine,
    ManifestSceneReader, ProcessingContext,
};

use config::{EnvConfig, ParamsConfig, RunPaths};
use coordinator::{GroupStatus, RunContext, StageSemaphores};
use scheduler::{group_by_sensing_date, run_groups};

#[derive(Parser, Debug)]
#[command(name = "hindcast")]
#[command(about = "Hindcast satellite imagery over a region and period")]
struct Args {
    /// Params file describing the job
    #[arg(short, long)]
    params: PathBuf,

    /// Environment file with endpoints, credentials and engine paths
    #[arg(short, long, env = "HINDCAST_ENV")]
    env: PathBuf,

    /// Override the configured download ceiling
    #[arg(long)]
    max_parallel_downloads: Option<usize>,

    /// Override the configured processing ceiling
    #[arg(long)]
    max_parallel_processors: Option<usize>,

    /// Override the configured adapter ceiling
    #[arg(long)]
    max_parallel_adapters: Option<usize>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting hindcast");

    let env = EnvConfig::load(&args.env)?;
    let params = ParamsConfig::load(&args.params)?;
    let paths = config::init_run(&env, &params, &args.params)?;

    run_hindcast(env, params, paths, &args).await
}

async fn run_hindcast(
    env: EnvConfig,
    params: ParamsConfig,
    paths: RunPaths,
    args: &Args,
) -> Result<()> {
    let general = &params.general;

    // Decide which archive API to use; an unknown name aborts the run.
    let catalog = create_client(&env.dias.api, env.dias.credentials.clone())
        .context("Failed to select catalog API")?;

    let region = RegionPolygon::from_wkt(&general.wkt).context("Invalid region polygon")?;

    // Find products matching the job criteria.
    let query = SceneQuery {
        start: general.start.clone(),
        end: general.end.clone(),
        sensor: general.sensor,
        resolution: general.resolution,
        wkt: general.wkt.clone(),
    };
    let (requests, names) = catalog
        .resolve(&query)
        .await
        .context("Catalog search failed")?;
    info!(products = names.len(), "Catalog search finished");

    let (requests, names) = match &general.tiles {
        Some(tiles) => filter_for_tiles(requests, names, tiles),
        None => (requests, names),
    };

    let l1_paths: Vec<PathBuf> = names
        .iter()
        .map(|name| config::l1_product_path(&env, &paths, name))
        .collect();
    let missing = l1_paths.iter().filter(|p| !p.exists()).count();
    info!("{} products are already available", l1_paths.len() - missing);
    info!("{} products must be downloaded first", missing);

    // Resolve stage and adapter names once, before any work is scheduled.
    let processors =
        resolve_processors(&general.processors).context("Invalid processor configuration")?;
    let adapters = resolve_adapters(&general.adapters, &params.adapters)
        .context("Invalid adapter configuration")?;

    let engine = GraphEngine::new(env.engine.clone());
    let processing = ProcessingContext {
        engine: engine.clone(),
        sensor: general.sensor,
        resolution: general.resolution,
        region,
        region_name: general.name.clone(),
        out_root: paths.l2_root.clone(),
        synchronise: general.synchronise,
        stages: params.stages.clone(),
        adapters: params.adapters.clone(),
    };

    let semaphores = StageSemaphores::new(
        args.max_parallel_downloads
            .unwrap_or(general.max_parallel_downloads),
        args.max_parallel_processors
            .unwrap_or(general.max_parallel_processors),
        args.max_parallel_adapters
            .unwrap_or(general.max_parallel_adapters),
    );

    let ctx = Arc::new(RunContext {
        catalog,
        scenes: Arc::new(ManifestSceneReader::new(engine)),
        chain: ChainRunner::new(processors, Arc::new(EngineMosaic)),
        adapters,
        processing,
        semaphores,
    });

    let groups = group_by_sensing_date(requests, l1_paths)?;

    let start_time = Instant::now();
    let outcomes = run_groups(ctx, groups).await;

    let failed = outcomes.iter().filter(|o| o.is_failed()).count();
    for outcome in &outcomes {
        match &outcome.status {
            GroupStatus::Completed { stages } => {
                info!(date = %outcome.date, stages = %stages.join(","), "Group completed");
            }
            GroupStatus::Failed { reason, .. } => {
                warn!(date = %outcome.date, reason = %reason, "Group failed");
            }
        }
    }
    info!(
        completed = outcomes.len() - failed,
        failed,
        elapsed_secs = format!("{:.1}", start_time.elapsed().as_secs_f64()),
        "Hindcast complete"
    );

    if let Some(fatal) = outcomes.iter().find(|o| o.is_fatal()) {
        if let GroupStatus::Failed { reason, .. } = &fatal.status {
            bail!("Configuration precondition failed: {reason}");
        }
    }
    Ok(())
}
