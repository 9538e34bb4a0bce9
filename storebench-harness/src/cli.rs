use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use argh::FromArgs;
use indicatif::{ProgressBar, ProgressStyle};
use yansi::Paint;

use crate::analysis;
use crate::backends::Connect;
use crate::config::Config;
use crate::dataset::Dataset;
use crate::experiment::{self, ExperimentRunner, RESULTS_FILE};
use crate::observability;
use crate::record;
use crate::report;
use crate::runs::{self, RunAggregator, RunOutcome};
use crate::stats::SystemStatsProbe;

/// Upload and retrieval benchmarks for HDFS, MinIO and MongoDB GridFS.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,

    #[argh(subcommand)]
    pub command: Command,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Run(RunCommand),
    Experiment(ExperimentCommand),
    Combine(CombineCommand),
    Analyze(AnalyzeCommand),
    Cleanup(CleanupCommand),
    Check(CheckCommand),
    Version(VersionCommand),
}

/// run the benchmark several times, then combine the runs
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "run")]
struct RunCommand {
    /// number of runs, overriding the configuration
    #[argh(option)]
    runs: Option<u32>,
}

/// run a single benchmark sweep into experiment_results.csv
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "experiment")]
struct ExperimentCommand {}

/// merge all run files and write the performance summary
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "combine")]
struct CombineCommand {}

/// render charts and print the summary of the combined results
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "analyze")]
struct AnalyzeCommand {}

/// delete all benchmark objects from every backend
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "cleanup")]
struct CleanupCommand {}

/// connect to every backend and report whether it is reachable
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "check")]
struct CheckCommand {}

/// print the storebench version
#[derive(Default, Debug, FromArgs)]
#[argh(subcommand, name = "version")]
struct VersionCommand {}

/// Bootstrap the runtime and execute the CLI command.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();

    // Special switch to just print the version and exit.
    if let Command::Version(_) = args.command {
        println!("storebench {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = Config::load(args.config.as_deref())?;

    // Measurements are strictly sequential, a single thread is all we need.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::init_tracing(&config);
    tracing::debug!(?config);

    runtime.block_on(async move {
        match args.command {
            Command::Run(RunCommand { runs }) => run(config, runs).await,
            Command::Experiment(ExperimentCommand {}) => experiment(config).await,
            Command::Combine(CombineCommand {}) => combine(config),
            Command::Analyze(AnalyzeCommand {}) => analyze(config),
            Command::Cleanup(CleanupCommand {}) => cleanup(config).await,
            Command::Check(CheckCommand {}) => check(config).await,
            Command::Version(VersionCommand {}) => unreachable!(),
        }
    })
}

fn spinner(message: &str) -> Result<ProgressBar> {
    let bar = ProgressBar::new(0)
        .with_style(ProgressStyle::with_template(
            "{spinner} {prefix} [{pos}/{len}] {msg} {elapsed}",
        )?)
        .with_prefix(message.to_owned());
    bar.enable_steady_tick(Duration::from_millis(100));
    Ok(bar)
}

fn runner(config: &Config, progress: ProgressBar) -> ExperimentRunner {
    ExperimentRunner::new(&config.scratch_root)
        .sampling(config.sampling.clone())
        .pacing(config.pacing)
        .progress(progress)
}

fn log_dataset(dataset: &Dataset) {
    for (category, count) in dataset.counts() {
        tracing::info!(%category, files = count, "found dataset files");
    }
}

async fn run(config: Config, runs: Option<u32>) -> Result<()> {
    let dataset = Dataset::scan(&config.dataset_root)?;
    log_dataset(&dataset);

    let runs = runs.unwrap_or(config.runs);
    let bar = spinner("Running benchmark:")?;
    let aggregator = RunAggregator::new(&config.results_root, runner(&config, bar.clone()))
        .runs(runs)
        .pacing(config.pacing);

    let mut probe = SystemStatsProbe::new();
    let outcomes = aggregator
        .run(&config.backends, &dataset, &mut probe)
        .await?;
    bar.finish_and_clear();

    let aborted: Vec<_> = outcomes
        .iter()
        .filter_map(|outcome| match outcome {
            RunOutcome::Aborted { run_id, .. } => Some(*run_id),
            RunOutcome::Completed { .. } => None,
        })
        .collect();

    if aborted.len() < outcomes.len() {
        let combined = runs::combine_runs(&config.results_root)?;
        print!("{}", report::render_text(&combined.summary, &combined.runs));
        println!();
        println!(
            "{} {}",
            "Summary saved to".bold(),
            combined.summary_path.display()
        );
    }

    if !aborted.is_empty() {
        bail!("{} of {runs} runs aborted: {aborted:?}", aborted.len());
    }
    Ok(())
}

async fn experiment(config: Config) -> Result<()> {
    let dataset = Dataset::scan(&config.dataset_root)?;
    log_dataset(&dataset);

    let clients = config.backends.connect().await?;
    let bar = spinner("Running experiment:")?;
    let mut probe = SystemStatsProbe::new();
    let results = runner(&config, bar.clone())
        .sweep(&clients, &dataset, &mut probe)
        .await?;
    bar.finish_and_clear();

    let path = config.results_root.join(RESULTS_FILE);
    record::write_results(&path, &results).await?;
    experiment::log_summary(&results);
    println!("{} {}", "Results saved to".bold(), path.display());

    Ok(())
}

fn combine(config: Config) -> Result<()> {
    let combined = runs::combine_runs(&config.results_root)?;
    print!("{}", report::render_text(&combined.summary, &combined.runs));
    println!();
    println!(
        "{} {}",
        "Combined results saved to".bold(),
        combined.combined_path.display()
    );
    println!(
        "{} {}",
        "Summary saved to".bold(),
        combined.summary_path.display()
    );
    Ok(())
}

fn analyze(config: Config) -> Result<()> {
    let (summary, charts) = analysis::analyze(&config.results_root)?;
    report::print_summary(&summary);
    println!();
    println!(
        "{} {}, {}",
        "Charts saved to".bold(),
        charts.by_system.display(),
        charts.by_category.display()
    );
    Ok(())
}

async fn cleanup(config: Config) -> Result<()> {
    for (kind, outcome) in config.backends.connect_each().await {
        let result = match outcome {
            Ok(client) => client.cleanup().await,
            Err(error) => Err(error),
        };

        match result {
            Ok(()) => println!("{} {kind}", "cleaned".green()),
            Err(error) => {
                tracing::warn!(error = &error as &dyn Error, %kind, "cleanup failed");
                println!("{} {kind}: {error}", "not cleaned".red());
            }
        }
    }
    Ok(())
}

async fn check(config: Config) -> Result<()> {
    let mut unreachable = Vec::new();
    for (kind, outcome) in config.backends.connect_each().await {
        match outcome {
            Ok(client) => println!("{} {kind} ({})", "reachable".green(), client.name()),
            Err(error) => {
                println!("{} {kind}: {error}", "unreachable".red());
                unreachable.push(kind);
            }
        }
    }

    if !unreachable.is_empty() {
        bail!("unreachable backends: {unreachable:?}");
    }
    Ok(())
}
