//! Descriptive statistics over result rows.
//!
//! All groupings keep the order in which their keys first appear in the rows, so summaries of the
//! same input always come out identical.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};

use crate::charts;
use crate::dataset::FileCategory;
use crate::record::{self, ExperimentResult};
use crate::runs::{ANALYSIS_DIR, COMBINED_FILE};

/// Aggregates over a group of rows.
///
/// Rates are fractions between `0` and `1`, speeds are in MiB/s. An empty group has all values at
/// zero.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GroupStats {
    pub count: usize,
    pub upload_success_rate: f64,
    pub retrieval_success_rate: f64,
    /// Share of rows where both the upload and the retrieval succeeded.
    pub success_rate: f64,
    pub verified_rate: f64,
    pub mean_upload_speed: f64,
    pub mean_retrieval_speed: f64,
    pub mean_size_bytes: f64,
}

impl GroupStats {
    pub fn from_rows<'a>(rows: impl IntoIterator<Item = &'a ExperimentResult>) -> Self {
        let mut stats = Self::default();
        for row in rows {
            stats.count += 1;
            stats.upload_success_rate += f64::from(u8::from(row.upload_success));
            stats.retrieval_success_rate += f64::from(u8::from(row.retrieval_success));
            stats.success_rate += f64::from(u8::from(row.upload_success && row.retrieval_success));
            stats.verified_rate += f64::from(u8::from(row.download_verified));
            stats.mean_upload_speed += row.upload_speed_mb_sec;
            stats.mean_retrieval_speed += row.retrieval_speed_mb_sec;
            stats.mean_size_bytes += row.file_size_bytes as f64;
        }

        if stats.count > 0 {
            let n = stats.count as f64;
            stats.upload_success_rate /= n;
            stats.retrieval_success_rate /= n;
            stats.success_rate /= n;
            stats.verified_rate /= n;
            stats.mean_upload_speed /= n;
            stats.mean_retrieval_speed /= n;
            stats.mean_size_bytes /= n;
        }

        stats
    }
}

/// Groups rows by a key, in order of first appearance.
pub fn group_by<K, F>(rows: &[ExperimentResult], key: F) -> Vec<(K, GroupStats)>
where
    K: PartialEq,
    F: Fn(&ExperimentResult) -> K,
{
    let mut groups: Vec<(K, Vec<&ExperimentResult>)> = Vec::new();
    for row in rows {
        let k = key(row);
        match groups.iter_mut().find(|(existing, _)| *existing == k) {
            Some((_, members)) => members.push(row),
            None => groups.push((k, vec![row])),
        }
    }

    groups
        .into_iter()
        .map(|(k, members)| (k, GroupStats::from_rows(members)))
        .collect()
}

/// Everything reported about a set of result rows.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Summary {
    /// Run ids present in the rows, ascending.
    pub runs: Vec<u32>,
    pub overall: GroupStats,
    pub by_system: Vec<(String, GroupStats)>,
    pub by_category: Vec<(FileCategory, GroupStats)>,
    pub by_system_category: Vec<((String, FileCategory), GroupStats)>,
    /// The ten most common file types with their row counts, most common first.
    pub file_types: Vec<(String, usize)>,
    /// Per-run aggregates, ascending by run id.
    pub by_run: Vec<(u32, GroupStats)>,
}

impl Summary {
    pub fn new(rows: &[ExperimentResult]) -> Self {
        let mut by_run = group_by(rows, |row| row.run_id);
        by_run.sort_by_key(|(run_id, _)| *run_id);
        let by_run: Vec<_> = by_run
            .into_iter()
            .filter_map(|(run_id, stats)| Some((run_id?, stats)))
            .collect();

        let mut file_types: Vec<_> = group_by(rows, |row| row.file_type.clone())
            .into_iter()
            .map(|(file_type, stats)| (file_type, stats.count))
            .collect();
        // stable, so ties keep their order of appearance
        file_types.sort_by(|a, b| b.1.cmp(&a.1));
        file_types.truncate(10);

        Self {
            runs: by_run.iter().map(|(run_id, _)| *run_id).collect(),
            overall: GroupStats::from_rows(rows),
            by_system: group_by(rows, |row| row.storage_system.clone()),
            by_category: group_by(rows, |row| row.file_category),
            by_system_category: group_by(rows, |row| {
                (row.storage_system.clone(), row.file_category)
            }),
            file_types,
            by_run,
        }
    }
}

/// Paths of the rendered charts.
#[derive(Clone, Debug)]
pub struct Charts {
    pub by_system: PathBuf,
    pub by_category: PathBuf,
}

/// Loads the combined results, renders the charts into `analysis/` and returns the summary.
pub fn analyze(results_root: &Path) -> Result<(Summary, Charts)> {
    let combined = results_root.join(COMBINED_FILE);
    if !combined.is_file() {
        bail!(
            "no combined results at `{}`; run `storebench combine` first",
            combined.display()
        );
    }

    let rows = record::read_results(&combined)?;
    let summary = Summary::new(&rows);
    tracing::info!(rows = rows.len(), runs = ?summary.runs, "loaded combined results");

    let analysis_dir = results_root.join(ANALYSIS_DIR);
    let charts = Charts {
        by_system: analysis_dir.join(charts::BY_SYSTEM_FILE),
        by_category: analysis_dir.join(charts::BY_CATEGORY_FILE),
    };
    std::fs::create_dir_all(&analysis_dir)?;
    charts::render_by_system(&summary, &charts.by_system)?;
    charts::render_by_category(&summary, &charts.by_category)?;

    Ok((summary, charts))
}
