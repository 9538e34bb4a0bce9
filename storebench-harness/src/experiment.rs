//! A single benchmark sweep over the dataset.
//!
//! The sweep visits every sampled file of every category and transfers it to and from every
//! backend, strictly one operation at a time. Every visit produces one [`ExperimentResult`], no
//! matter whether the transfers succeeded.

use std::error::Error;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use storebench_backends::{BoxedClient, StorageClient};

use crate::analysis::group_by;
use crate::dataset::{Dataset, DatasetFile, FileCategory, Sampling};
use crate::pacing::Pacing;
use crate::record::{ExperimentResult, TIMESTAMP_FORMAT, throughput_mib_s};
use crate::stats::StatsProbe;

/// Name of the CSV a single sweep is written to, inside the results root.
pub const RESULTS_FILE: &str = "experiment_results.csv";

/// Runs sweeps of upload and retrieval measurements.
pub struct ExperimentRunner {
    scratch_root: PathBuf,
    sampling: Sampling,
    pacing: Pacing,
    progress: ProgressBar,
}

impl ExperimentRunner {
    /// Creates a runner that downloads into `scratch_root`.
    pub fn new(scratch_root: impl Into<PathBuf>) -> Self {
        Self {
            scratch_root: scratch_root.into(),
            sampling: Sampling::default(),
            pacing: Pacing::default(),
            progress: ProgressBar::hidden(),
        }
    }

    /// Which files of each category to measure.
    pub fn sampling(mut self, sampling: Sampling) -> Self {
        self.sampling = sampling;
        self
    }

    /// Pauses between upload and retrieval.
    pub fn pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// A progress bar advanced once per measured file and backend.
    pub fn progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Measures every sampled file against every backend.
    ///
    /// Categories are visited in the order small, medium, large, backends in the given order.
    /// Only a missing or unwritable scratch folder fails the sweep; transfer failures are recorded
    /// in the returned rows.
    pub async fn sweep(
        &self,
        backends: &[BoxedClient],
        dataset: &Dataset,
        probe: &mut dyn StatsProbe,
    ) -> Result<Vec<ExperimentResult>> {
        tokio::fs::create_dir_all(&self.scratch_root)
            .await
            .with_context(|| {
                format!(
                    "failed to create scratch folder `{}`",
                    self.scratch_root.display()
                )
            })?;

        let sample = dataset.sample(&self.sampling);
        let total: usize = sample.iter().map(|(_, files)| files.len()).sum();
        self.progress.set_length((total * backends.len()) as u64);

        let mut results = Vec::with_capacity(total * backends.len());
        for (category, files) in sample {
            if files.is_empty() {
                tracing::info!(%category, "no files found in category, skipping");
                continue;
            }

            for file in files {
                for backend in backends {
                    self.progress.set_message(format!(
                        "{} | {category} | {}",
                        backend.name(),
                        file.name
                    ));
                    let result = self.measure(backend.as_ref(), category, file, probe).await;
                    results.push(result);
                    self.progress.inc(1);
                }
            }
        }

        Ok(results)
    }

    async fn measure(
        &self,
        backend: &dyn StorageClient,
        category: FileCategory,
        file: &DatasetFile,
        probe: &mut dyn StatsProbe,
    ) -> ExperimentResult {
        let system = backend.name();
        let object_name = format!("{category}/{}", file.name);

        let start = Instant::now();
        let upload = backend.upload(&file.path, &object_name).await;
        let upload_time = start.elapsed().as_secs_f64();
        if let Err(ref error) = upload {
            tracing::warn!(
                error = error as &dyn Error,
                system,
                %object_name,
                "upload failed"
            );
        }

        self.pacing.after_operation().await;

        let download_path = self
            .scratch_root
            .join(format!("{system}_{category}_{}", file.name));
        let start = Instant::now();
        let retrieval = backend.retrieve(&object_name, &download_path).await;
        let retrieval_time = start.elapsed().as_secs_f64();
        if let Err(ref error) = retrieval {
            tracing::warn!(
                error = error as &dyn Error,
                system,
                %object_name,
                not_found = error.is_not_found(),
                "retrieval failed"
            );
        }

        let retrieval_success = retrieval.is_ok();
        let download_verified = retrieval_success && has_size(&download_path, file.size).await;
        let stats = probe.sample();
        remove_download(&download_path).await;

        let result = ExperimentResult {
            storage_system: system.to_owned(),
            file_category: category,
            file_name: file.name.clone(),
            file_size_bytes: file.size,
            file_type: file.extension(),
            upload_time_sec: upload_time,
            upload_speed_mb_sec: throughput_mib_s(file.size, upload_time),
            retrieval_time_sec: retrieval_time,
            retrieval_speed_mb_sec: throughput_mib_s(file.size, retrieval_time),
            upload_success: upload.is_ok(),
            retrieval_success,
            download_verified,
            cpu_usage: stats.cpu_usage,
            memory_usage: stats.memory_usage,
            timestamp: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
            run_id: None,
        };

        tracing::info!(
            system,
            verified = result.download_verified,
            "{object_name} ({}): upload {:.2}s ({:.2} MB/s) | retrieval {:.2}s ({:.2} MB/s) | success: {}",
            bytesize::ByteSize::b(file.size),
            result.upload_time_sec,
            result.upload_speed_mb_sec,
            result.retrieval_time_sec,
            result.retrieval_speed_mb_sec,
            result.upload_success && result.retrieval_success,
        );

        result
    }
}

impl std::fmt::Debug for ExperimentRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExperimentRunner")
            .field("scratch_root", &self.scratch_root)
            .field("sampling", &self.sampling)
            .field("pacing", &self.pacing)
            .finish_non_exhaustive()
    }
}

async fn has_size(path: &Path, expected: u64) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata.len() == expected,
        Err(_) => false,
    }
}

async fn remove_download(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => (),
        Err(error) if error.kind() == io::ErrorKind::NotFound => (),
        Err(error) => tracing::warn!(
            error = &error as &dyn Error,
            path = %path.display(),
            "failed to remove downloaded file"
        ),
    }
}

/// Logs per-backend and per-category aggregates of a sweep.
pub fn log_summary(results: &[ExperimentResult]) {
    tracing::info!(rows = results.len(), "sweep finished");

    for (system, stats) in group_by(results, |row| row.storage_system.clone()) {
        tracing::info!(
            %system,
            tests = stats.count,
            "success rate {:.1}%, avg upload {:.2} MB/s, avg retrieval {:.2} MB/s",
            stats.success_rate * 100.0,
            stats.mean_upload_speed,
            stats.mean_retrieval_speed,
        );
    }

    for (category, stats) in group_by(results, |row| row.file_category) {
        tracing::info!(
            %category,
            tests = stats.count,
            "avg size {:.1} MB",
            stats.mean_size_bytes / (1024.0 * 1024.0),
        );
    }
}
