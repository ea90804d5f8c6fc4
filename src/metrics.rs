//! Loading of simulation metrics archives.
//!
//! A metrics archive is a JSON object of named arrays as written by the
//! simulation at shutdown: five required 1-element `metadata_*` arrays,
//! an optional group of five equal-length transfer arrays, and optional
//! concurrency/bandwidth sample series.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::io::{self, BufReader};
use thiserror::Error;

/// Extension the simulation appends when saving metrics.
pub const ARCHIVE_SUFFIX: &str = ".json";

/// Terminal failures while loading a metrics archive.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Neither the literal name nor the extension-appended variant exists.
    #[error("data file '{0}' not found")]
    NotFound(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Scalar run-level facts recorded by the simulation.
#[derive(Debug, Clone)]
pub struct Metadata {
    pub parallel_enabled: bool,
    pub total_nodes: u64,
    /// Simulation clock at shutdown, in seconds.
    pub simulation_end_time: f64,
    pub data_loss_events: u64,
    pub nodes_with_data_loss: u64,
}

/// One finished transfer between two nodes, in archive order.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferCompletion {
    /// Completion time in simulation seconds.
    pub time: f64,
    pub transfer_type: String,
    /// How long the transfer was in flight, in seconds.
    pub duration: f64,
    pub uploader: String,
    pub downloader: String,
}

/// Large sample series kept in the form the archive was parsed into;
/// consumers down-sample on access instead of copying. All series are
/// optional and index-aligned within their group.
#[derive(Debug, Default, Deserialize)]
pub struct RawSeries {
    pub sim_times: Option<Vec<f64>>,
    pub sim_uploads: Option<Vec<f64>>,
    pub sim_downloads: Option<Vec<f64>>,
    pub bw_times: Option<Vec<f64>>,
    pub bw_upload_used: Option<Vec<f64>>,
    pub bw_upload_capacity: Option<Vec<f64>>,
    pub bw_download_used: Option<Vec<f64>>,
    pub bw_download_capacity: Option<Vec<f64>>,
}

/// A fully loaded simulation run, read-only after construction.
#[derive(Debug)]
pub struct SimulationRecord {
    pub metadata: Metadata,
    pub transfers: Vec<TransferCompletion>,
    pub series: RawSeries,
}

/// Flat named-array layout of the archive file.
#[derive(Debug, Deserialize)]
struct RawArchive {
    metadata_parallel_enabled: Vec<f64>,
    metadata_total_nodes: Vec<f64>,
    metadata_simulation_end_time: Vec<f64>,
    metadata_data_loss_events: Vec<f64>,
    metadata_nodes_with_data_loss: Vec<f64>,
    transfer_times: Option<Vec<f64>>,
    transfer_types: Option<Vec<String>>,
    transfer_durations: Option<Vec<f64>>,
    uploaders: Option<Vec<String>>,
    downloaders: Option<Vec<String>>,
    #[serde(flatten)]
    series: RawSeries,
}

/// Load a metrics archive, tolerating a missing `.json` extension.
pub fn load_metrics(filename: &str) -> Result<SimulationRecord, LoadError> {
    let file = open_archive(filename)?;
    let raw: RawArchive = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("malformed metrics archive '{filename}'"))?;
    Ok(process_archive(raw)?)
}

/// Open the archive as named, then retry with the extension appended.
fn open_archive(filename: &str) -> Result<File, LoadError> {
    match File::open(filename) {
        Ok(file) => return Ok(file),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(anyhow::Error::new(err)
                .context(format!("failed to open data file '{filename}'"))
                .into())
        }
    }

    if filename.ends_with(ARCHIVE_SUFFIX) {
        return Err(LoadError::NotFound(filename.to_string()));
    }

    let retry = format!("{filename}{ARCHIVE_SUFFIX}");
    match File::open(&retry) {
        Ok(file) => Ok(file),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Err(LoadError::NotFound(retry)),
        Err(err) => Err(anyhow::Error::new(err)
            .context(format!("failed to open data file '{retry}'"))
            .into()),
    }
}

/// Reconstruct the record from the flat archive layout.
fn process_archive(raw: RawArchive) -> Result<SimulationRecord> {
    let metadata = Metadata {
        parallel_enabled: scalar(&raw.metadata_parallel_enabled, "metadata_parallel_enabled")?
            != 0.0,
        total_nodes: scalar(&raw.metadata_total_nodes, "metadata_total_nodes")? as u64,
        simulation_end_time: scalar(
            &raw.metadata_simulation_end_time,
            "metadata_simulation_end_time",
        )?,
        data_loss_events: scalar(&raw.metadata_data_loss_events, "metadata_data_loss_events")?
            as u64,
        nodes_with_data_loss: scalar(
            &raw.metadata_nodes_with_data_loss,
            "metadata_nodes_with_data_loss",
        )? as u64,
    };

    // The transfer arrays only mean anything as a complete group; if the
    // run logged none, the record simply has no completions.
    let transfers = match (
        raw.transfer_times,
        raw.transfer_types,
        raw.transfer_durations,
        raw.uploaders,
        raw.downloaders,
    ) {
        (Some(times), Some(types), Some(durations), Some(uploaders), Some(downloaders)) => times
            .into_iter()
            .zip(types)
            .zip(durations)
            .zip(uploaders)
            .zip(downloaders)
            .map(
                |((((time, transfer_type), duration), uploader), downloader)| TransferCompletion {
                    time,
                    transfer_type,
                    duration,
                    uploader,
                    downloader,
                },
            )
            .collect(),
        _ => Vec::new(),
    };

    Ok(SimulationRecord {
        metadata,
        transfers,
        series: raw.series,
    })
}

/// First element of a required 1-element metadata array.
fn scalar(values: &[f64], name: &str) -> Result<f64> {
    values
        .first()
        .copied()
        .with_context(|| format!("metadata field '{name}' is empty"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    const MINIMAL: &str = r#"{
        "metadata_parallel_enabled": [0],
        "metadata_total_nodes": [3],
        "metadata_simulation_end_time": [31557600.0],
        "metadata_data_loss_events": [1],
        "metadata_nodes_with_data_loss": [1]
    }"#;

    fn write_archive(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn loads_archive_without_optional_series() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_archive(dir.path(), "run.json", MINIMAL);

        let record = load_metrics(path.to_str().unwrap()).unwrap();
        assert!(!record.metadata.parallel_enabled);
        assert_eq!(record.metadata.total_nodes, 3);
        assert_eq!(record.metadata.data_loss_events, 1);
        assert!(record.transfers.is_empty());
        assert!(record.series.sim_times.is_none());
        assert!(record.series.bw_times.is_none());
    }

    #[test]
    fn appends_extension_when_name_has_none() {
        let dir = tempfile::tempdir().unwrap();
        write_archive(dir.path(), "run.json", MINIMAL);

        let bare = dir.path().join("run");
        let record = load_metrics(bare.to_str().unwrap()).unwrap();
        assert_eq!(record.metadata.total_nodes, 3);
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");

        let err = load_metrics(missing.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, LoadError::NotFound(_)));
        let message = err.to_string();
        assert!(message.contains("nope.json"), "got: {message}");
    }

    #[test]
    fn missing_metadata_field_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_archive(
            dir.path(),
            "run.json",
            r#"{"metadata_parallel_enabled": [0]}"#,
        );

        let err = load_metrics(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, LoadError::Other(_)));
    }

    #[test]
    fn empty_metadata_array_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let archive = MINIMAL.replace("\"metadata_total_nodes\": [3]", "\"metadata_total_nodes\": []");
        let path = write_archive(dir.path(), "run.json", &archive);

        let err = load_metrics(path.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("metadata_total_nodes"));
    }

    #[test]
    fn zips_transfer_arrays_into_completions() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_archive(
            dir.path(),
            "run.json",
            r#"{
                "metadata_parallel_enabled": [1],
                "metadata_total_nodes": [2],
                "metadata_simulation_end_time": [1000.0],
                "metadata_data_loss_events": [0],
                "metadata_nodes_with_data_loss": [0],
                "transfer_times": [10.0, 20.0],
                "transfer_types": ["backup", "restore"],
                "transfer_durations": [5.0, 2.5],
                "uploaders": ["node_0", "node_1"],
                "downloaders": ["node_1", "node_0"]
            }"#,
        );

        let record = load_metrics(path.to_str().unwrap()).unwrap();
        assert!(record.metadata.parallel_enabled);
        assert_eq!(
            record.transfers,
            vec![
                TransferCompletion {
                    time: 10.0,
                    transfer_type: "backup".to_string(),
                    duration: 5.0,
                    uploader: "node_0".to_string(),
                    downloader: "node_1".to_string(),
                },
                TransferCompletion {
                    time: 20.0,
                    transfer_type: "restore".to_string(),
                    duration: 2.5,
                    uploader: "node_1".to_string(),
                    downloader: "node_0".to_string(),
                },
            ]
        );
    }

    #[test]
    fn partial_transfer_group_falls_back_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let archive = MINIMAL.replace(
            "\"metadata_parallel_enabled\": [0],",
            "\"metadata_parallel_enabled\": [0], \"transfer_times\": [1.0, 2.0],",
        );
        let path = write_archive(dir.path(), "run.json", &archive);

        let record = load_metrics(path.to_str().unwrap()).unwrap();
        assert!(record.transfers.is_empty());
    }

    #[test]
    fn keeps_sample_series_from_the_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive = MINIMAL.replace(
            "\"metadata_parallel_enabled\": [0],",
            "\"metadata_parallel_enabled\": [1], \"sim_times\": [0.0, 1.0, 2.0], \"sim_uploads\": [1, 0, 2], \"sim_downloads\": [0, 1, 1],",
        );
        let path = write_archive(dir.path(), "run.json", &archive);

        let record = load_metrics(path.to_str().unwrap()).unwrap();
        assert_eq!(record.series.sim_times.as_deref(), Some(&[0.0, 1.0, 2.0][..]));
        assert_eq!(record.series.sim_uploads.as_deref(), Some(&[1.0, 0.0, 2.0][..]));
    }
}
