//! Aggregation passes over a loaded simulation record.
//!
//! Everything here is a pure function of the record; the renderer decides
//! what to show and the loader decides what exists.

use crate::metrics::{RawSeries, SimulationRecord, TransferCompletion};
use std::collections::BTreeMap;

pub const SECONDS_PER_DAY: f64 = 24.0 * 3600.0;
pub const SECONDS_PER_YEAR: f64 = 365.25 * 24.0 * 3600.0;

/// Target point count for the concurrency overlay in the progress panel.
pub const OVERLAY_SAMPLE_TARGET: usize = 2000;
/// Target point count for summary statistics over the large series.
pub const SUMMARY_SAMPLE_TARGET: usize = 1000;

/// Per-node transfer counts, aligned to the sorted node list.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct NodeTransferCounts {
    /// Every id seen as uploader or downloader, lexically sorted.
    pub nodes: Vec<String>,
    pub uploads: Vec<u64>,
    pub downloads: Vec<u64>,
}

/// Count how often each node appears as uploader and as downloader.
pub fn transfers_by_node(transfers: &[TransferCompletion]) -> NodeTransferCounts {
    let mut counts: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
    for transfer in transfers {
        counts.entry(&transfer.uploader).or_default().0 += 1;
        counts.entry(&transfer.downloader).or_default().1 += 1;
    }

    let mut result = NodeTransferCounts::default();
    for (node, (uploads, downloads)) in counts {
        result.nodes.push(node.to_string());
        result.uploads.push(uploads);
        result.downloads.push(downloads);
    }
    result
}

/// Stride that thins a series of `len` samples to roughly `target` points.
///
/// Deterministic: the same input always keeps the same samples.
pub fn downsample_stride(len: usize, target: usize) -> usize {
    (len / target.max(1)).max(1)
}

/// Concurrent-transfer samples thinned for plotting or statistics.
#[derive(Debug)]
pub struct ConcurrencySeries {
    /// Sample times in simulation seconds.
    pub times: Vec<f64>,
    /// Uploads plus downloads in flight at each sample.
    pub total: Vec<f64>,
}

impl ConcurrencySeries {
    pub fn max(&self) -> f64 {
        self.total.iter().copied().fold(0.0, f64::max)
    }

    pub fn mean(&self) -> f64 {
        if self.total.is_empty() {
            0.0
        } else {
            self.total.iter().sum::<f64>() / self.total.len() as f64
        }
    }
}

/// Down-sampled total-concurrency series, if the run recorded one.
pub fn concurrency_series(series: &RawSeries, target: usize) -> Option<ConcurrencySeries> {
    let times = series.sim_times.as_deref().filter(|t| !t.is_empty())?;
    let uploads = series.sim_uploads.as_deref()?;
    let downloads = series.sim_downloads.as_deref()?;

    let stride = downsample_stride(times.len(), target);
    let times = times.iter().step_by(stride).copied().collect();
    let total = uploads
        .iter()
        .step_by(stride)
        .zip(downloads.iter().step_by(stride))
        .map(|(uploads, downloads)| uploads + downloads)
        .collect();
    Some(ConcurrencySeries { times, total })
}

#[derive(Debug, PartialEq)]
pub struct ConcurrencyStats {
    pub max: u64,
    pub mean: f64,
}

/// Scalar figures for the summary panel.
#[derive(Debug)]
pub struct SummaryStats {
    pub total_transfers: usize,
    pub simulation_years: f64,
    pub total_nodes: u64,
    pub avg_transfers_per_node: f64,
    pub transfers_per_year: f64,
    /// Mean in-flight time of a completed transfer, in seconds.
    pub avg_transfer_duration: f64,
    pub data_loss_events: u64,
    pub nodes_with_data_loss: u64,
    /// Mean used/capacity in percent over the down-sampled window.
    pub avg_upload_utilization: f64,
    pub avg_download_utilization: f64,
    /// Completion counts per transfer type, sorted by type name.
    pub transfer_type_counts: BTreeMap<String, usize>,
    /// Only present for parallel-mode runs that sampled concurrency.
    pub concurrency: Option<ConcurrencyStats>,
}

/// Derive the summary figures for one run.
///
/// Rates are guarded to read as zero for degenerate runs (no nodes, zero
/// simulated time) instead of dividing by zero.
pub fn summarize(record: &SimulationRecord) -> SummaryStats {
    let metadata = &record.metadata;
    let total_transfers = record.transfers.len();
    let simulation_years = metadata.simulation_end_time / SECONDS_PER_YEAR;

    let avg_transfers_per_node = if metadata.total_nodes > 0 {
        total_transfers as f64 / metadata.total_nodes as f64
    } else {
        0.0
    };
    let transfers_per_year = if simulation_years > 0.0 {
        total_transfers as f64 / simulation_years
    } else {
        0.0
    };
    let avg_transfer_duration = if total_transfers > 0 {
        record.transfers.iter().map(|t| t.duration).sum::<f64>() / total_transfers as f64
    } else {
        0.0
    };

    let mut transfer_type_counts = BTreeMap::new();
    for transfer in &record.transfers {
        *transfer_type_counts
            .entry(transfer.transfer_type.clone())
            .or_insert(0) += 1;
    }

    let (avg_upload_utilization, avg_download_utilization) = bandwidth_utilization(&record.series);

    let concurrency = if metadata.parallel_enabled {
        concurrency_series(&record.series, SUMMARY_SAMPLE_TARGET).map(|series| ConcurrencyStats {
            max: series.max() as u64,
            mean: series.mean(),
        })
    } else {
        None
    };

    SummaryStats {
        total_transfers,
        simulation_years,
        total_nodes: metadata.total_nodes,
        avg_transfers_per_node,
        transfers_per_year,
        avg_transfer_duration,
        data_loss_events: metadata.data_loss_events,
        nodes_with_data_loss: metadata.nodes_with_data_loss,
        avg_upload_utilization,
        avg_download_utilization,
        transfer_type_counts,
        concurrency,
    }
}

/// Mean upload and download utilization in percent, zero when the run
/// recorded no bandwidth samples.
fn bandwidth_utilization(series: &RawSeries) -> (f64, f64) {
    let Some(times) = series.bw_times.as_deref().filter(|t| !t.is_empty()) else {
        return (0.0, 0.0);
    };
    let (Some(upload_used), Some(upload_capacity), Some(download_used), Some(download_capacity)) = (
        series.bw_upload_used.as_deref(),
        series.bw_upload_capacity.as_deref(),
        series.bw_download_used.as_deref(),
        series.bw_download_capacity.as_deref(),
    ) else {
        return (0.0, 0.0);
    };

    let stride = downsample_stride(times.len(), SUMMARY_SAMPLE_TARGET);
    (
        mean_utilization(upload_used, upload_capacity, stride),
        mean_utilization(download_used, download_capacity, stride),
    )
}

/// Mean used/capacity ratio in percent. Capacity is floored at 1 so a
/// node reporting zero capacity does not divide by zero.
fn mean_utilization(used: &[f64], capacity: &[f64], stride: usize) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for (used, capacity) in used
        .iter()
        .step_by(stride)
        .zip(capacity.iter().step_by(stride))
    {
        sum += used / capacity.max(1.0);
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64 * 100.0
    }
}
