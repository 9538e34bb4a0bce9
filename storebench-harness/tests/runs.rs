use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Result, bail};
use async_trait::async_trait;
use storebench_backends::BoxedClient;
use storebench_harness::analysis::{self, GroupStats};
use storebench_harness::backends::Connect;
use storebench_harness::dataset::{Dataset, FileCategory, SampleOrder, Sampling};
use storebench_harness::experiment::{ExperimentRunner, RESULTS_FILE};
use storebench_harness::pacing::Pacing;
use storebench_harness::record::{self, ExperimentResult};
use storebench_harness::runs::{self, ANALYSIS_DIR, COMBINED_FILE, RunAggregator, SUMMARY_FILE};
use storebench_harness::stats::SystemStats;
use storebench_test::memory::{Faults, InMemoryClient};

/// Hands out clones of in-memory clients, failing on the configured attempts.
#[derive(Debug)]
struct TestBackends {
    clients: Vec<InMemoryClient>,
    fail_attempts: BTreeSet<usize>,
    attempts: Mutex<usize>,
}

impl TestBackends {
    fn new(clients: Vec<InMemoryClient>) -> Self {
        Self {
            clients,
            fail_attempts: BTreeSet::new(),
            attempts: Mutex::new(0),
        }
    }

    fn failing_on(mut self, attempt: usize) -> Self {
        self.fail_attempts.insert(attempt);
        self
    }
}

#[async_trait]
impl Connect for TestBackends {
    async fn connect(&self) -> Result<Vec<BoxedClient>> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            *attempts += 1;
            *attempts
        };

        if self.fail_attempts.contains(&attempt) {
            bail!("failed to connect to mongodb: server selection timeout");
        }

        Ok(self
            .clients
            .iter()
            .map(|client| Box::new(client.clone()) as BoxedClient)
            .collect())
    }
}

fn dataset(root: &Path) -> Dataset {
    for (category, name, len) in [
        ("small", "a.txt", 100),
        ("small", "b.jpg", 200),
        ("medium", "c.mp3", 3000),
        ("large", "d.mp4", 9000),
    ] {
        let dir = root.join(category);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(name), vec![1u8; len]).unwrap();
    }
    Dataset::scan(root).unwrap()
}

fn aggregator(results_root: &Path, scratch_root: &Path, runs: u32) -> RunAggregator {
    let runner = ExperimentRunner::new(scratch_root)
        .sampling(Sampling {
            files_per_category: 3,
            order: SampleOrder::Name,
        })
        .pacing(Pacing::none());

    RunAggregator::new(results_root, runner)
        .runs(runs)
        .pacing(Pacing::none())
}

fn row(system: &str, category: FileCategory, speed: f64, success: bool) -> ExperimentResult {
    ExperimentResult {
        storage_system: system.into(),
        file_category: category,
        file_name: "clip.mp4".into(),
        file_size_bytes: 2 * 1024 * 1024,
        file_type: ".mp4".into(),
        upload_time_sec: 2.0 / speed,
        upload_speed_mb_sec: speed,
        retrieval_time_sec: 1.0 / speed,
        retrieval_speed_mb_sec: speed * 2.0,
        upload_success: success,
        retrieval_success: success,
        download_verified: success,
        cpu_usage: 20.0,
        memory_usage: 60.0,
        timestamp: "2025-03-04 10:11:12".into(),
        run_id: None,
    }
}

fn write_run(results_root: &Path, run_id: u32, rows: &[ExperimentResult]) {
    let contents = record::encode_results(rows).unwrap();
    fs::write(results_root.join(runs::run_file_name(run_id)), contents).unwrap();
}

#[tokio::test]
async fn every_run_writes_its_own_file() {
    storebench_test::tracing::init();
    let data = tempfile::tempdir().unwrap();
    let results = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();

    let hdfs = InMemoryClient::new("HDFS");
    let minio = InMemoryClient::new("MinIO");
    let backends = TestBackends::new(vec![hdfs.clone(), minio.clone()]);

    let outcomes = aggregator(results.path(), scratch.path(), 3)
        .run(&backends, &dataset(data.path()), &mut SystemStats::default())
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().all(|outcome| outcome.is_completed()));
    for run_id in 1..=3 {
        let rows = record::read_results(&results.path().join(format!("run{run_id}.csv"))).unwrap();
        assert_eq!(rows.len(), 8);
    }
    assert!(!results.path().join(RESULTS_FILE).exists());

    // cleaned before every run
    assert_eq!(hdfs.cleanup_count(), 3);
    assert_eq!(minio.cleanup_count(), 3);
    assert_eq!(hdfs.object_names().len(), 4);
}

#[tokio::test]
async fn unreachable_backends_abort_only_their_run() {
    let data = tempfile::tempdir().unwrap();
    let results = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();

    // left over from an earlier invocation
    fs::write(results.path().join("run2.csv"), "garbage").unwrap();
    fs::write(results.path().join("run5.csv"), "garbage").unwrap();

    let backends = TestBackends::new(vec![InMemoryClient::new("MinIO")]).failing_on(2);
    let outcomes = aggregator(results.path(), scratch.path(), 3)
        .run(&backends, &dataset(data.path()), &mut SystemStats::default())
        .await
        .unwrap();

    let completed: Vec<_> = outcomes.iter().map(|o| o.is_completed()).collect();
    assert_eq!(completed, [true, false, true]);
    assert!(results.path().join("run1.csv").exists());
    assert!(!results.path().join("run2.csv").exists());
    assert!(results.path().join("run3.csv").exists());
    // outside the configured run count
    assert!(results.path().join("run5.csv").exists());
}

#[tokio::test]
async fn failed_cleanup_does_not_abort_a_run() {
    let data = tempfile::tempdir().unwrap();
    let results = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();

    let sticky = InMemoryClient::new("GridFS").with_faults(Faults {
        fail_cleanup: true,
        ..Default::default()
    });
    let backends = TestBackends::new(vec![sticky.clone()]);

    let outcomes = aggregator(results.path(), scratch.path(), 2)
        .run(&backends, &dataset(data.path()), &mut SystemStats::default())
        .await
        .unwrap();

    assert!(outcomes.iter().all(|outcome| outcome.is_completed()));
    assert_eq!(sticky.cleanup_count(), 2);
}

#[test]
fn combines_runs_into_a_summary() {
    storebench_test::tracing::init();
    let results = tempfile::tempdir().unwrap();

    let successes: Vec<_> = (0..8)
        .map(|_| row("MinIO", FileCategory::Small, 4.0, true))
        .collect();
    let failures: Vec<_> = (0..8)
        .map(|_| row("MinIO", FileCategory::Small, 4.0, false))
        .collect();
    write_run(results.path(), 1, &successes);
    write_run(results.path(), 2, &failures);

    let combined = runs::combine_runs(results.path()).unwrap();

    assert_eq!(combined.runs, [1, 2]);
    assert_eq!(combined.rows.len(), 16);
    assert_eq!(combined.combined_path, results.path().join(COMBINED_FILE));
    assert_eq!(
        combined.summary_path,
        results.path().join(ANALYSIS_DIR).join(SUMMARY_FILE)
    );

    let rows = record::read_results(&combined.combined_path).unwrap();
    let run_ids: Vec<_> = rows.iter().map(|r| r.run_id).collect();
    assert_eq!(&run_ids[..8], [Some(1); 8]);
    assert_eq!(&run_ids[8..], [Some(2); 8]);

    let summary = fs::read_to_string(&combined.summary_path).unwrap();
    assert!(summary.contains("Total data points: 16\n"));
    assert!(summary.contains("Overall success rate: 50.0%\n"));
}

#[test]
fn combining_twice_is_stable() {
    let results = tempfile::tempdir().unwrap();
    write_run(
        results.path(),
        1,
        &[
            row("HDFS", FileCategory::Large, 3.0, true),
            row("GridFS", FileCategory::Medium, 1.5, false),
        ],
    );
    write_run(results.path(), 2, &[row("HDFS", FileCategory::Large, 5.0, true)]);

    let first = runs::combine_runs(results.path()).unwrap();
    let combined = fs::read(&first.combined_path).unwrap();
    let summary = fs::read(&first.summary_path).unwrap();

    let second = runs::combine_runs(results.path()).unwrap();
    assert_eq!(fs::read(&second.combined_path).unwrap(), combined);
    assert_eq!(fs::read(&second.summary_path).unwrap(), summary);
}

#[test]
fn combining_skips_missing_and_unreadable_runs() {
    let results = tempfile::tempdir().unwrap();
    write_run(results.path(), 1, &[row("HDFS", FileCategory::Small, 2.0, true)]);
    write_run(results.path(), 4, &[row("HDFS", FileCategory::Small, 6.0, true)]);
    fs::write(results.path().join("run3.csv"), "not,a\nrun,file\n").unwrap();

    let combined = runs::combine_runs(results.path()).unwrap();

    assert_eq!(combined.runs, [1, 4]);
    assert_eq!(combined.summary.runs, [1, 4]);
    let text = fs::read_to_string(&combined.summary_path).unwrap();
    assert!(text.contains("Runs combined: [1, 4]\n"));
    assert!(text.contains("Run 4 | Avg Speed:    6.0 MB/s\n"));
}

#[test]
fn combined_means_weight_runs_by_row_count() {
    let results = tempfile::tempdir().unwrap();
    let first = [1.0, 2.0, 3.0].map(|speed| row("MinIO", FileCategory::Small, speed, true));
    let second = [row("MinIO", FileCategory::Small, 10.0, true)];
    write_run(results.path(), 1, &first);
    write_run(results.path(), 2, &second);

    let combined = runs::combine_runs(results.path()).unwrap();

    let one = GroupStats::from_rows(&first);
    let two = GroupStats::from_rows(&second);
    let expected = (one.mean_upload_speed * 3.0 + two.mean_upload_speed) / 4.0;

    let (system, stats) = &combined.summary.by_system[0];
    assert_eq!(system, "MinIO");
    assert_eq!(stats.count, 4);
    assert!((stats.mean_upload_speed - expected).abs() < 1e-9);
}

#[test]
fn analysis_renders_charts_from_combined_results() {
    let results = tempfile::tempdir().unwrap();
    write_run(
        results.path(),
        1,
        &[
            row("HDFS", FileCategory::Small, 2.0, true),
            row("MinIO", FileCategory::Medium, 8.0, true),
            row("GridFS", FileCategory::Large, 4.0, false),
        ],
    );

    let err = analysis::analyze(results.path()).unwrap_err();
    assert!(err.to_string().contains("storebench combine"));

    runs::combine_runs(results.path()).unwrap();
    let (summary, charts) = analysis::analyze(results.path()).unwrap();

    assert_eq!(summary.overall.count, 3);
    assert_eq!(summary.by_system.len(), 3);
    for chart in [&charts.by_system, &charts.by_category] {
        let svg = fs::read_to_string(chart).unwrap();
        assert!(svg.starts_with("<svg"));
    }
}
