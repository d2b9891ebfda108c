//! Date-group scheduling.
//!
//! Products sharing a sensing date are processed together so adjacent tiles
//! can be reduced and mosaicked. One worker task runs per group; the number
//! of workers is unbounded here, because all throttling happens in the
//! coordinator's stage semaphores.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::task::JoinSet;
use tracing::{error, info};

use hindcast_common::error::{HindcastError, HindcastResult};
use hindcast_common::names::sensing_date_from_name;
use hindcast_common::request::DownloadRequest;

use crate::coordinator::{run_group, GroupOutcome, RunContext};

/// Products of one sensing date, in resolver order.
#[derive(Debug, Clone)]
pub struct ProductGroup {
    pub date: NaiveDate,
    pub requests: Vec<DownloadRequest>,
    pub paths: Vec<PathBuf>,
}

/// Group parallel (request, local path) lists by parsed sensing date.
///
/// Every request lands in exactly one group. The returned dispatch order is
/// group size ascending, then date ascending: small groups run first to
/// surface failures early and spread worker startup cost.
pub fn group_by_sensing_date(
    requests: Vec<DownloadRequest>,
    paths: Vec<PathBuf>,
) -> HindcastResult<Vec<ProductGroup>> {
    if requests.len() != paths.len() {
        return Err(HindcastError::ListLengthMismatch {
            requests: requests.len(),
            names: paths.len(),
        });
    }

    let mut by_date: BTreeMap<NaiveDate, ProductGroup> = BTreeMap::new();
    for (request, path) in requests.into_iter().zip(paths) {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| HindcastError::MissingSensingDate(path.display().to_string()))?;
        let date = sensing_date_from_name(name)?;
        let group = by_date.entry(date).or_insert_with(|| ProductGroup {
            date,
            requests: Vec::new(),
            paths: Vec::new(),
        });
        group.requests.push(request);
        group.paths.push(path);
    }

    let mut groups: Vec<ProductGroup> = by_date.into_values().collect();
    groups.sort_by_key(|g| (g.paths.len(), g.date));
    Ok(groups)
}

/// Spawn one worker per group and collect every outcome.
pub async fn run_groups(ctx: Arc<RunContext>, groups: Vec<ProductGroup>) -> Vec<GroupOutcome> {
    info!(
        groups = groups.len(),
        "Products grouped by sensing date; each group is handled by an individual worker"
    );

    let mut workers = JoinSet::new();
    for group in groups {
        let ctx = ctx.clone();
        workers.spawn(async move { run_group(ctx, group).await });
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => error!(error = %e, "Group worker panicked"),
        }
    }
    outcomes.sort_by_key(|o| o.date);
    outcomes
}
