//! Result rows and their CSV representation.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};

use crate::dataset::FileCategory;

/// Column names of a run CSV, in order.
pub const HEADERS: [&str; 15] = [
    "storage_system",
    "file_category",
    "file_name",
    "file_size_bytes",
    "file_type",
    "upload_time_sec",
    "upload_speed_mb_sec",
    "retrieval_time_sec",
    "retrieval_speed_mb_sec",
    "upload_success",
    "retrieval_success",
    "download_verified",
    "cpu_usage",
    "memory_usage",
    "timestamp",
];

/// The extra trailing column of the combined CSV.
pub const RUN_ID_HEADER: &str = "run_id";

/// Format of [`ExperimentResult::timestamp`].
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const MIB: f64 = 1024.0 * 1024.0;

/// Measurements of one file transferred to and from one backend.
///
/// Speeds are in MiB per second. The `run_id` is only present in combined results.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ExperimentResult {
    pub storage_system: String,
    pub file_category: FileCategory,
    pub file_name: String,
    pub file_size_bytes: u64,
    pub file_type: String,
    pub upload_time_sec: f64,
    pub upload_speed_mb_sec: f64,
    pub retrieval_time_sec: f64,
    pub retrieval_speed_mb_sec: f64,
    #[serde(deserialize_with = "lenient_bool")]
    pub upload_success: bool,
    #[serde(deserialize_with = "lenient_bool")]
    pub retrieval_success: bool,
    #[serde(deserialize_with = "lenient_bool")]
    pub download_verified: bool,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<u32>,
}

/// Computes a transfer speed in MiB/s. A zero duration yields zero.
pub fn throughput_mib_s(bytes: u64, seconds: f64) -> f64 {
    if seconds > 0.0 {
        bytes as f64 / MIB / seconds
    } else {
        0.0
    }
}

/// Accepts the spellings other tools write for booleans, such as `True` or `1`.
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    match value.trim() {
        v if v.eq_ignore_ascii_case("true") || v == "1" => Ok(true),
        v if v.eq_ignore_ascii_case("false") || v == "0" || v.is_empty() => Ok(false),
        v => Err(serde::de::Error::custom(format!(
            "invalid boolean `{v}`, expected `true` or `false`"
        ))),
    }
}

/// Encodes the rows of a single run as CSV.
///
/// The header is written even if there are no rows.
pub fn encode_results(results: &[ExperimentResult]) -> Result<Vec<u8>> {
    encode_rows(&HEADERS, results)
}

/// Writes the rows of a single run, replacing any existing file.
pub async fn write_results(path: &Path, results: &[ExperimentResult]) -> Result<()> {
    let contents = encode_results(results)?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create `{}`", parent.display()))?;
    }
    tokio::fs::write(path, contents)
        .await
        .with_context(|| format!("failed to write `{}`", path.display()))
}

/// Writes combined rows, which all carry a `run_id`.
pub fn write_combined(path: &Path, results: &[ExperimentResult]) -> Result<()> {
    let mut headers = HEADERS.to_vec();
    headers.push(RUN_ID_HEADER);
    let contents = encode_rows(&headers, results)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create `{}`", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("failed to write `{}`", path.display()))
}

fn encode_rows(headers: &[&str], results: &[ExperimentResult]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    writer.write_record(headers)?;
    for result in results {
        writer.serialize(result)?;
    }

    writer
        .into_inner()
        .map_err(|error| anyhow::anyhow!("failed to encode results: {}", error.error()))
}

/// Reads all rows of a run or combined CSV.
pub fn read_results(path: &Path) -> Result<Vec<ExperimentResult>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open `{}`", path.display()))?;

    reader
        .deserialize()
        .collect::<Result<Vec<ExperimentResult>, _>>()
        .with_context(|| format!("failed to parse `{}`", path.display()))
}
