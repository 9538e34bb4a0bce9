//! Textual renderings of a [`Summary`].

use std::fmt::Write;

use yansi::Paint;

use crate::analysis::{GroupStats, Summary};

const MIB: f64 = 1024.0 * 1024.0;

/// Renders the performance summary written next to the combined results.
///
/// The output only depends on the summary and the run ids, so it is stable across invocations.
pub fn render_text(summary: &Summary, runs: &[u32]) -> String {
    let mut out = String::new();
    // writing into a String cannot fail
    let _ = write_text(&mut out, summary, runs);
    out
}

fn write_text(out: &mut String, summary: &Summary, runs: &[u32]) -> std::fmt::Result {
    let total = summary.overall.count;

    writeln!(out, "Storage Benchmark - Performance Summary")?;
    writeln!(out, "{}", "=".repeat(50))?;
    writeln!(out)?;
    writeln!(out, "Total data points: {total}")?;
    writeln!(out, "Runs combined: {runs:?}")?;
    writeln!(
        out,
        "Overall success rate: {:.1}%",
        summary.overall.upload_success_rate * 100.0
    )?;
    writeln!(out)?;

    section(out, "STORAGE SYSTEM PERFORMANCE")?;
    for (system, stats) in &summary.by_system {
        writeln!(out, "{system}:")?;
        writeln!(out, "  Tests: {}", stats.count)?;
        writeln!(
            out,
            "  Success Rate: {:.1}% upload, {:.1}% download",
            stats.upload_success_rate * 100.0,
            stats.retrieval_success_rate * 100.0
        )?;
        writeln!(
            out,
            "  Average Speed: {:.1} MB/s upload, {:.1} MB/s download",
            stats.mean_upload_speed, stats.mean_retrieval_speed
        )?;
        writeln!(out)?;
    }

    section(out, "PERFORMANCE BY FILE CATEGORY")?;
    for (category, stats) in &summary.by_category {
        writeln!(
            out,
            "{:8} | Tests: {:3} | Avg Size: {:6.1} MB | Avg Speed: {:5.1} MB/s",
            category.as_str(),
            stats.count,
            stats.mean_size_bytes / MIB,
            stats.mean_upload_speed
        )?;
    }
    writeln!(out)?;

    section(out, "FILE TYPE DISTRIBUTION")?;
    for (file_type, count) in &summary.file_types {
        let share = if total > 0 {
            *count as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        writeln!(out, "{file_type:8} | {count:3} files ({share:5.1}%)")?;
    }
    writeln!(out)?;

    section(out, "PERFORMANCE CONSISTENCY ACROSS RUNS")?;
    for (run_id, stats) in &summary.by_run {
        writeln!(
            out,
            "Run {run_id} | Avg Speed: {:6.1} MB/s",
            stats.mean_upload_speed
        )?;
    }

    Ok(())
}

fn section(out: &mut String, title: &str) -> std::fmt::Result {
    writeln!(out, "{title}:")?;
    writeln!(out, "{}", "-".repeat(30))
}

/// Prints the per-backend summary of an analysis to stdout.
pub fn print_summary(summary: &Summary) {
    println!(
        "{} {} data points, runs {:?}",
        "## ANALYSIS".bold(),
        summary.overall.count.bold(),
        summary.runs
    );

    for (system, stats) in &summary.by_system {
        println!();
        println!("{}", system.bold().blue());
        print_stats(stats);
    }
}

fn print_stats(stats: &GroupStats) {
    println!(
        "  upload:   {:.2} MB/s, {}",
        stats.mean_upload_speed.bold(),
        rate(stats.upload_success_rate)
    );
    println!(
        "  download: {:.2} MB/s, {}",
        stats.mean_retrieval_speed.bold(),
        rate(stats.retrieval_success_rate)
    );
    println!("  verified: {}", rate(stats.verified_rate));
}

fn rate(rate: f64) -> String {
    let text = format!("{:.1}% success", rate * 100.0);
    if rate >= 1.0 {
        text.green().to_string()
    } else if rate > 0.0 {
        text.yellow().to_string()
    } else {
        text.red().to_string()
    }
}

#[cfg(test)]
mod tests {
    use crate::dataset::FileCategory;
    use crate::record::tests::row;

    use super::*;

    #[test]
    fn renders_summary_text() {
        let mut rows = Vec::new();
        for (run_id, success) in [(1, true), (2, false)] {
            let mut r = row("HDFS", FileCategory::Small, 2.0);
            r.run_id = Some(run_id);
            r.upload_success = success;
            rows.push(r);
        }
        let summary = Summary::new(&rows);

        let text = render_text(&summary, &[1, 2]);

        assert!(text.starts_with("Storage Benchmark - Performance Summary\n"));
        assert!(text.contains("Total data points: 2\n"));
        assert!(text.contains("Runs combined: [1, 2]\n"));
        assert!(text.contains("Overall success rate: 50.0%\n"));
        assert!(text.contains("HDFS:\n  Tests: 2\n  Success Rate: 50.0% upload, 100.0% download\n"));
        assert!(text.contains("small    | Tests:   2 | Avg Size:    1.0 MB | Avg Speed:   2.0 MB/s\n"));
        assert!(text.contains(".mp4     |   2 files (100.0%)\n"));
        assert!(text.contains("Run 2 | Avg Speed:    2.0 MB/s\n"));
    }

    #[test]
    fn renders_empty_summary() {
        let text = render_text(&Summary::default(), &[]);
        assert!(text.contains("Total data points: 0\n"));
        assert!(text.contains("Runs combined: []\n"));
    }
}
