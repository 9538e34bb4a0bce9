//! Repeated sweeps and the combination of their results.
//!
//! Every run writes `run{id}.csv` into the results root. Combining merges all run files found
//! there into `combined_results.csv` and writes a plain text report to
//! `analysis/performance_summary.txt`.

use std::collections::BTreeSet;
use std::error::Error;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::analysis::{GroupStats, Summary};
use crate::backends::Connect;
use crate::dataset::Dataset;
use crate::experiment::{self, ExperimentRunner, RESULTS_FILE};
use crate::pacing::Pacing;
use crate::record::{self, ExperimentResult};
use crate::report;
use crate::stats::StatsProbe;

pub const COMBINED_FILE: &str = "combined_results.csv";
pub const ANALYSIS_DIR: &str = "analysis";
pub const SUMMARY_FILE: &str = "performance_summary.txt";

/// Returns the file name of a run's CSV.
pub fn run_file_name(run_id: u32) -> String {
    format!("run{run_id}.csv")
}

/// Parses the run id out of a run CSV's file name. Run ids start at 1.
pub fn parse_run_id(file_name: &str) -> Option<u32> {
    let digits = file_name.strip_prefix("run")?.strip_suffix(".csv")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().filter(|&id| id > 0)
}

/// How a single run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// All measurements were recorded into the run's CSV.
    Completed { run_id: u32, rows: usize },
    /// The run was skipped, usually because a backend was unreachable.
    Aborted { run_id: u32, error: anyhow::Error },
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Executes a number of sweeps, each against freshly connected and cleaned backends.
#[derive(Debug)]
pub struct RunAggregator {
    results_root: PathBuf,
    runner: ExperimentRunner,
    runs: u32,
    pacing: Pacing,
}

impl RunAggregator {
    pub fn new(results_root: impl Into<PathBuf>, runner: ExperimentRunner) -> Self {
        Self {
            results_root: results_root.into(),
            runner,
            runs: 5,
            pacing: Pacing::default(),
        }
    }

    /// The number of runs to execute.
    pub fn runs(mut self, runs: u32) -> Self {
        self.runs = runs;
        self
    }

    /// Pause between runs. Only `between_runs` is used here.
    pub fn pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// Executes all runs.
    ///
    /// Stale run files from earlier invocations are removed first. A run whose backends cannot be
    /// connected is reported as [`RunOutcome::Aborted`] and the remaining runs still execute.
    /// Errors are only returned for failures to access the results root.
    pub async fn run(
        &self,
        backends: &dyn Connect,
        dataset: &Dataset,
        probe: &mut dyn StatsProbe,
    ) -> Result<Vec<RunOutcome>> {
        tokio::fs::create_dir_all(&self.results_root)
            .await
            .with_context(|| {
                format!(
                    "failed to create results folder `{}`",
                    self.results_root.display()
                )
            })?;

        for run_id in 1..=self.runs {
            let path = self.results_root.join(run_file_name(run_id));
            match tokio::fs::remove_file(&path).await {
                Ok(()) => tracing::info!(path = %path.display(), "removed stale run file"),
                Err(error) if error.kind() == io::ErrorKind::NotFound => (),
                Err(error) => {
                    return Err(error)
                        .with_context(|| format!("failed to remove `{}`", path.display()));
                }
            }
        }

        let mut outcomes = Vec::with_capacity(self.runs as usize);
        for run_id in 1..=self.runs {
            tracing::info!(run_id, runs = self.runs, "starting run");

            let outcome = match self.run_once(run_id, backends, dataset, probe).await {
                Ok(rows) => RunOutcome::Completed { run_id, rows },
                Err(error) => {
                    tracing::error!(
                        error = &*error as &dyn Error,
                        run_id,
                        "run aborted"
                    );
                    RunOutcome::Aborted { run_id, error }
                }
            };
            outcomes.push(outcome);

            if run_id < self.runs {
                self.pacing.after_run().await;
            }
        }

        Ok(outcomes)
    }

    async fn run_once(
        &self,
        run_id: u32,
        backends: &dyn Connect,
        dataset: &Dataset,
        probe: &mut dyn StatsProbe,
    ) -> Result<usize> {
        let clients = backends.connect().await?;
        for client in &clients {
            if let Err(error) = client.cleanup().await {
                tracing::warn!(
                    error = &error as &dyn Error,
                    system = client.name(),
                    "cleanup failed"
                );
            }
        }

        let results = self.runner.sweep(&clients, dataset, probe).await?;
        experiment::log_summary(&results);

        let source = self.results_root.join(RESULTS_FILE);
        let target = self.results_root.join(run_file_name(run_id));
        record::write_results(&source, &results).await?;
        tokio::fs::rename(&source, &target)
            .await
            .with_context(|| {
                format!(
                    "failed to move `{}` to `{}`",
                    source.display(),
                    target.display()
                )
            })?;

        log_run(run_id, &GroupStats::from_rows(&results));
        Ok(results.len())
    }
}

fn log_run(run_id: u32, stats: &GroupStats) {
    tracing::info!(
        run_id,
        rows = stats.count,
        "run saved: success rate {:.1}%, avg upload {:.1} MB/s, avg download {:.1} MB/s",
        stats.upload_success_rate * 100.0,
        stats.mean_upload_speed,
        stats.mean_retrieval_speed,
    );
}

/// The result of combining run files.
#[derive(Debug)]
pub struct Combined {
    /// Ids of the runs that were read, ascending.
    pub runs: Vec<u32>,
    pub rows: Vec<ExperimentResult>,
    pub summary: Summary,
    pub combined_path: PathBuf,
    pub summary_path: PathBuf,
}

/// Lists the run files in the results root, ascending by run id.
pub fn discover_runs(results_root: &Path) -> Result<Vec<(u32, PathBuf)>> {
    let entries = fs::read_dir(results_root)
        .with_context(|| format!("failed to read `{}`", results_root.display()))?;

    let mut runs = Vec::new();
    for entry in entries {
        let entry = entry?;
        let Some(run_id) = entry.file_name().to_str().and_then(parse_run_id) else {
            continue;
        };
        if entry.file_type()?.is_file() {
            runs.push((run_id, entry.path()));
        }
    }

    runs.sort_by_key(|(run_id, _)| *run_id);
    Ok(runs)
}

/// Merges all run files into the combined CSV and writes the performance summary.
///
/// Unreadable run files are skipped. Running this again on the same run files produces identical
/// output files.
pub fn combine_runs(results_root: &Path) -> Result<Combined> {
    let mut runs = Vec::new();
    let mut rows = Vec::new();

    for (run_id, path) in discover_runs(results_root)? {
        let mut run_rows = match record::read_results(&path) {
            Ok(run_rows) => run_rows,
            Err(error) => {
                tracing::warn!(
                    error = &*error as &dyn Error,
                    run_id,
                    "skipping unreadable run file"
                );
                continue;
            }
        };

        log_run(run_id, &GroupStats::from_rows(&run_rows));
        for row in &mut run_rows {
            row.run_id = Some(run_id);
        }
        runs.push(run_id);
        rows.append(&mut run_rows);
    }

    if runs.is_empty() {
        bail!(
            "no run files found in `{}`; execute `storebench run` first",
            results_root.display()
        );
    }

    let combined_path = results_root.join(COMBINED_FILE);
    record::write_combined(&combined_path, &rows)?;

    let summary = Summary::new(&rows);
    let summary_path = results_root.join(ANALYSIS_DIR).join(SUMMARY_FILE);
    fs::create_dir_all(results_root.join(ANALYSIS_DIR))?;
    fs::write(&summary_path, report::render_text(&summary, &runs))
        .with_context(|| format!("failed to write `{}`", summary_path.display()))?;

    check_data_quality(&rows);

    Ok(Combined {
        runs,
        rows,
        summary,
        combined_path,
        summary_path,
    })
}

fn check_data_quality(rows: &[ExperimentResult]) {
    let first = rows.iter().map(|row| row.timestamp.as_str()).min();
    let last = rows.iter().map(|row| row.timestamp.as_str()).max();
    let runs: BTreeSet<_> = rows.iter().filter_map(|row| row.run_id).collect();

    let mut systems: Vec<&str> = Vec::new();
    let mut categories = Vec::new();
    for row in rows {
        if !systems.contains(&row.storage_system.as_str()) {
            systems.push(&row.storage_system);
        }
        if !categories.contains(&row.file_category) {
            categories.push(row.file_category);
        }
    }

    tracing::info!(
        records = rows.len(),
        from = first.unwrap_or_default(),
        to = last.unwrap_or_default(),
        unique_runs = runs.len(),
        ?systems,
        ?categories,
        "data quality check"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_ids() {
        assert_eq!(parse_run_id("run1.csv"), Some(1));
        assert_eq!(parse_run_id("run12.csv"), Some(12));
        assert_eq!(parse_run_id(&run_file_name(7)), Some(7));

        assert_eq!(parse_run_id("run0.csv"), None);
        assert_eq!(parse_run_id("run.csv"), None);
        assert_eq!(parse_run_id("run+1.csv"), None);
        assert_eq!(parse_run_id("run1.csv.bak"), None);
        assert_eq!(parse_run_id("combined_results.csv"), None);
    }

    #[test]
    fn discovers_runs_in_numeric_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["run10.csv", "run2.csv", "run1.csv", "notes.txt", COMBINED_FILE] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        fs::create_dir(dir.path().join("run3.csv")).unwrap();

        let runs = discover_runs(dir.path()).unwrap();
        let ids: Vec<_> = runs.iter().map(|(id, _)| *id).collect();

        assert_eq!(ids, [1, 2, 10]);
    }

    #[test]
    fn combining_nothing_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = combine_runs(dir.path()).unwrap_err();
        assert!(err.to_string().contains("no run files"));
    }
}
