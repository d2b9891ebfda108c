//! Candidate filters applied between catalog search and download.
//!
//! Archives frequently list several copies of one acquisition (reprocessed
//! baselines, different timeliness classes). These filters pick the single
//! authoritative copy per acquisition while preserving the pairwise
//! association and relative order of the surviving (request, name) lists.

use tracing::{debug, warn};

use crate::names::{parse_msi_baseline, parse_s3_fields, Sensor};
use crate::request::DownloadRequest;

/// Keep only the most recently created copy of each sensing window.
///
/// Candidates are grouped by (sensing start, sensing end, satellite); within
/// a group only the newest creation time survives. Names that do not carry
/// the timestamped naming convention pass through untouched. Idempotent.
pub fn filter_for_timeliness(
    requests: Vec<DownloadRequest>,
    names: Vec<String>,
) -> (Vec<DownloadRequest>, Vec<String>) {
    let fields: Vec<_> = names.iter().map(|n| parse_s3_fields(n)).collect();

    let mut filtered_requests = Vec::with_capacity(requests.len());
    let mut filtered_names = Vec::with_capacity(names.len());

    for (i, (request, name)) in requests.into_iter().zip(names.iter()).enumerate() {
        let Some(current) = &fields[i] else {
            // Not a timestamped product family: exempt from the filter.
            filtered_requests.push(request);
            filtered_names.push(name.clone());
            continue;
        };

        let newest = fields
            .iter()
            .flatten()
            .filter(|f| {
                f.sensing_start == current.sensing_start
                    && f.sensing_end == current.sensing_end
                    && f.satellite == current.satellite
            })
            .map(|f| f.creation_time)
            .max();

        if Some(current.creation_time) == newest {
            filtered_requests.push(request);
            filtered_names.push(name.clone());
        } else {
            warn!(product = %name, "Removed superseded product");
        }
    }

    (filtered_requests, filtered_names)
}

/// Keep only the highest processing baseline per datatake/tile.
///
/// Applies to the MSI sensor family only; other sensors pass through
/// untouched. Idempotent.
pub fn filter_for_baseline(
    requests: Vec<DownloadRequest>,
    names: Vec<String>,
    sensor: Sensor,
) -> (Vec<DownloadRequest>, Vec<String>) {
    if sensor != Sensor::Msi {
        return (requests, names);
    }
    debug!("Filtering for most recent baseline");

    let baselines: Vec<_> = names.iter().map(|n| parse_msi_baseline(n)).collect();

    let mut filtered_requests = Vec::with_capacity(requests.len());
    let mut filtered_names = Vec::with_capacity(names.len());

    for (i, (request, name)) in requests.into_iter().zip(names.iter()).enumerate() {
        let Some(current) = &baselines[i] else {
            filtered_requests.push(request);
            filtered_names.push(name.clone());
            continue;
        };

        // Survivor per group: highest baseline, earliest listing among ties.
        let survivor = baselines
            .iter()
            .enumerate()
            .filter_map(|(j, b)| b.as_ref().map(|b| (j, b)))
            .filter(|(_, b)| b.group_key == current.group_key)
            .max_by(|(i, a), (j, b)| a.baseline.cmp(&b.baseline).then(j.cmp(i)))
            .map(|(j, _)| j);

        if survivor == Some(i) {
            filtered_requests.push(request);
            filtered_names.push(name.clone());
        } else {
            warn!(product = %name, "Removed superseded baseline");
        }
    }

    (filtered_requests, filtered_names)
}

/// Keep only products belonging to one of the given tiles.
pub fn filter_for_tiles(
    requests: Vec<DownloadRequest>,
    names: Vec<String>,
    tiles: &[String],
) -> (Vec<DownloadRequest>, Vec<String>) {
    debug!(tiles = %tiles.join(", "), "Filtering for configured tiles");

    requests
        .into_iter()
        .zip(names)
        .filter(|(_, name)| tiles.iter().any(|t| name.contains(&format!("_{}_", t))))
        .unzip()
}
