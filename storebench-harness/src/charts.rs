//! SVG bar charts of the analysis summary.

use std::path::Path;

use anyhow::Result;
use plotters::coord::Shift;
use plotters::prelude::*;

use crate::analysis::{GroupStats, Summary};
use crate::dataset::FileCategory;

pub const BY_SYSTEM_FILE: &str = "performance_by_system.svg";
pub const BY_CATEGORY_FILE: &str = "performance_by_category.svg";

const PALETTE: [RGBColor; 3] = [
    RGBColor(0xff, 0x6b, 0x6b),
    RGBColor(0x4e, 0xcd, 0xc4),
    RGBColor(0x45, 0xb7, 0xd1),
];

fn color(index: usize) -> RGBColor {
    PALETTE[index % PALETTE.len()]
}

/// One bar group on the x axis, with one value per series.
struct Group {
    label: String,
    values: Vec<f64>,
}

/// Renders mean upload and download speed per backend, side by side.
pub fn render_by_system(summary: &Summary, path: &Path) -> Result<()> {
    let root = SVGBackend::new(path, (1200, 600)).into_drawing_area();
    root.fill(&WHITE)?;
    let panels = root.split_evenly((1, 2));

    for (panel, title, upload) in [
        (&panels[0], "Average Upload Speed by Storage System", true),
        (&panels[1], "Average Download Speed by Storage System", false),
    ] {
        let groups = summary
            .by_system
            .iter()
            .map(|(system, stats)| Group {
                label: system.clone(),
                values: vec![speed(stats, upload)],
            })
            .collect();
        draw_bars(panel, title, &[], groups)?;
    }

    root.present()?;
    Ok(())
}

/// Renders upload and download speed per file category, grouped by backend.
pub fn render_by_category(summary: &Summary, path: &Path) -> Result<()> {
    let root = SVGBackend::new(path, (1000, 600)).into_drawing_area();
    root.fill(&WHITE)?;
    let panels = root.split_evenly((1, 2));

    let systems: Vec<String> = summary.by_system.iter().map(|(s, _)| s.clone()).collect();
    let categories: Vec<FileCategory> = FileCategory::ALL
        .into_iter()
        .filter(|c| summary.by_category.iter().any(|(category, _)| category == c))
        .collect();

    for (panel, title, upload) in [
        (&panels[0], "Upload Speed by File Category", true),
        (&panels[1], "Download Speed by File Category", false),
    ] {
        let groups = categories
            .iter()
            .map(|category| Group {
                label: category.to_string(),
                values: systems
                    .iter()
                    .map(|system| {
                        summary
                            .by_system_category
                            .iter()
                            .find(|((s, c), _)| s == system && c == category)
                            .map(|(_, stats)| speed(stats, upload))
                            .unwrap_or_default()
                    })
                    .collect(),
            })
            .collect();
        draw_bars(panel, title, &systems, groups)?;
    }

    root.present()?;
    Ok(())
}

fn speed(stats: &GroupStats, upload: bool) -> f64 {
    if upload {
        stats.mean_upload_speed
    } else {
        stats.mean_retrieval_speed
    }
}

/// Draws a bar chart into one panel.
///
/// Without named series, every group is a single bar colored by its position. With series, every
/// group holds one bar per series, colored by series and explained in a legend.
fn draw_bars(
    area: &DrawingArea<SVGBackend<'_>, Shift>,
    title: &str,
    series: &[String],
    groups: Vec<Group>,
) -> Result<()> {
    let slots = groups.len().max(1);
    let max = groups
        .iter()
        .flat_map(|g| g.values.iter().copied())
        .fold(0.0_f64, f64::max);
    let y_max = if max > 0.0 { max * 1.1 } else { 1.0 };

    let labels: Vec<&str> = groups.iter().map(|g| g.label.as_str()).collect();
    let label_at = |x: &f64| {
        let slot = x.round();
        if (x - slot).abs() > f64::EPSILON || slot < 0.0 {
            return String::new();
        }
        labels
            .get(slot as usize)
            .map(|l| l.to_string())
            .unwrap_or_default()
    };

    let mut chart = ChartBuilder::on(area)
        .caption(title, ("sans-serif", 22))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(-0.5_f64..(slots as f64 - 0.5), 0.0_f64..y_max)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(slots)
        .x_label_formatter(&label_at)
        .y_desc("Speed (MB/s)")
        .draw()?;

    if series.is_empty() {
        chart.draw_series(groups.iter().enumerate().filter_map(|(slot, group)| {
            let value = group.values.first().copied()?;
            let x0 = slot as f64 - 0.4;
            Some(Rectangle::new(
                [(x0, 0.0), (x0 + 0.8, value)],
                color(slot).filled(),
            ))
        }))?;
        return Ok(());
    }

    let width = 0.8 / series.len() as f64;
    for (index, name) in series.iter().enumerate() {
        let bars = groups.iter().enumerate().filter_map(|(slot, group)| {
            let value = group.values.get(index).copied()?;
            let x0 = slot as f64 - 0.4 + index as f64 * width;
            Some(Rectangle::new(
                [(x0, 0.0), (x0 + width, value)],
                color(index).filled(),
            ))
        });

        chart
            .draw_series(bars)?
            .label(name.as_str())
            .legend(move |(x, y)| {
                Rectangle::new([(x, y - 5), (x + 10, y + 5)], color(index).filled())
            });
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::record::tests::row;

    use super::*;

    #[test]
    fn renders_svg_files() {
        let rows = [
            row("HDFS", FileCategory::Small, 2.0),
            row("MinIO", FileCategory::Small, 4.0),
            row("MinIO", FileCategory::Large, 8.0),
        ];
        let summary = Summary::new(&rows);
        let dir = tempfile::tempdir().unwrap();

        let by_system = dir.path().join(BY_SYSTEM_FILE);
        let by_category = dir.path().join(BY_CATEGORY_FILE);
        render_by_system(&summary, &by_system).unwrap();
        render_by_category(&summary, &by_category).unwrap();

        let svg = std::fs::read_to_string(&by_system).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("Average Download Speed by Storage System"));
        // the legend names every backend
        let svg = std::fs::read_to_string(&by_category).unwrap();
        assert!(svg.contains("HDFS"));
        assert!(svg.contains("MinIO"));
    }

    #[test]
    fn renders_empty_summary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(BY_SYSTEM_FILE);
        render_by_system(&Summary::default(), &path).unwrap();
        assert!(path.exists());
    }
}
