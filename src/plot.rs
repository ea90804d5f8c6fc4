//! Report rendering for a loaded simulation run.
//!
//! One figure, three stacked panels: transfer progress over time (with a
//! concurrency overlay for parallel-mode runs), transfers per node, and a
//! summary-statistics block. Single and parallel mode share the same
//! rendering path; the mode only changes the super-title and whether the
//! concurrency features appear.

use crate::analysis::{
    self, ConcurrencySeries, NodeTransferCounts, SummaryStats, OVERLAY_SAMPLE_TARGET,
    SECONDS_PER_DAY,
};
use crate::metrics::SimulationRecord;
use anyhow::Result;
use num_format::{Locale, ToFormattedString};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters::style::{FontStyle, FontTransform};
use std::path::Path;

const FIGURE_SIZE: (u32, u32) = (1200, 1600);

const CUMULATIVE_COLOR: RGBColor = RGBColor(0x2e, 0x8b, 0x57);
const CONCURRENT_COLOR: RGBColor = RGBColor(0xff, 0x6b, 0x6b);
const UPLOAD_COLOR: RGBColor = GREEN;
const DOWNLOAD_COLOR: RGBColor = BLUE;

/// Half of one grouped-bar slot, in node-index units.
const BAR_WIDTH: f64 = 0.35;

type Panel<'a> = DrawingArea<SVGBackend<'a>, Shift>;

/// Render the full analysis report to a single SVG file.
///
/// Overwrites whatever is at `path`.
pub fn render_report<P: AsRef<Path>>(record: &SimulationRecord, path: P) -> Result<()> {
    let counts = analysis::transfers_by_node(&record.transfers);
    let stats = analysis::summarize(record);
    let overlay = if record.metadata.parallel_enabled {
        analysis::concurrency_series(&record.series, OVERLAY_SAMPLE_TARGET)
    } else {
        None
    };

    let root = SVGBackend::new(path.as_ref(), FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mode_name = if record.metadata.parallel_enabled {
        "Parallel"
    } else {
        "Single"
    };
    let body = root.titled(
        &format!(
            "{} Transfer Mode Analysis ({:.2} years)",
            mode_name, stats.simulation_years
        ),
        ("sans-serif", 32).into_font().style(FontStyle::Bold),
    )?;

    let panels = body.split_evenly((3, 1));
    draw_progress_panel(&panels[0], record, overlay.as_ref())?;
    draw_node_panel(&panels[1], &counts)?;
    draw_stats_panel(&panels[2], &stats)?;

    root.present()?;
    Ok(())
}

/// Panel 1: cumulative transfers over time, plus the concurrent-transfer
/// overlay on a secondary axis when the run sampled concurrency.
///
/// The cumulative curve trusts archive order; completions are plotted as
/// stored, never re-sorted.
fn draw_progress_panel(
    panel: &Panel<'_>,
    record: &SimulationRecord,
    overlay: Option<&ConcurrencySeries>,
) -> Result<()> {
    if record.transfers.is_empty() {
        return Ok(());
    }

    let days: Vec<f64> = record
        .transfers
        .iter()
        .map(|t| t.time / SECONDS_PER_DAY)
        .collect();
    let total = record.transfers.len();

    let mut max_day = days.iter().copied().fold(0.0, f64::max);
    if let Some(concurrency) = overlay {
        max_day = concurrency
            .times
            .iter()
            .map(|t| t / SECONDS_PER_DAY)
            .fold(max_day, f64::max);
    }
    if max_day <= 0.0 {
        max_day = 1.0;
    }
    let y_max = total as f64 * 1.05;

    let cumulative = days
        .iter()
        .enumerate()
        .map(|(i, day)| (*day, (i + 1) as f64));

    if let Some(concurrency) = overlay {
        let caption = format!(
            "Transfer Progress Over Time - Total: {} transfers | Max Concurrent: {}",
            total,
            concurrency.max() as u64
        );
        let concurrent_max = concurrency.max().max(1.0) * 1.1;

        let mut chart = ChartBuilder::on(panel)
            .caption(caption, ("sans-serif", 20))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .right_y_label_area_size(60)
            .build_cartesian_2d(0f64..max_day, 0f64..y_max)?
            .set_secondary_coord(0f64..max_day, 0f64..concurrent_max);

        chart
            .configure_mesh()
            .x_desc("Time (days)")
            .y_desc("Cumulative Transfers")
            .draw()?;
        chart
            .configure_secondary_axes()
            .y_desc("Concurrent Transfers")
            .label_style(("sans-serif", 12).into_font().color(&CONCURRENT_COLOR))
            .draw()?;

        chart
            .draw_series(LineSeries::new(
                cumulative,
                CUMULATIVE_COLOR.mix(0.8).stroke_width(2),
            ))?
            .label("Cumulative Transfers")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], CUMULATIVE_COLOR));

        chart
            .draw_secondary_series(DashedLineSeries::new(
                concurrency
                    .times
                    .iter()
                    .zip(concurrency.total.iter())
                    .map(|(time, count)| (time / SECONDS_PER_DAY, *count)),
                6,
                4,
                CONCURRENT_COLOR.mix(0.6).stroke_width(1),
            ))?
            .label("Concurrent Transfers")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], CONCURRENT_COLOR));

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperLeft)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    } else {
        let caption = format!("Transfer Progress Over Time - Total: {total} transfers");

        let mut chart = ChartBuilder::on(panel)
            .caption(caption, ("sans-serif", 20))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(0f64..max_day, 0f64..y_max)?;

        chart
            .configure_mesh()
            .x_desc("Time (days)")
            .y_desc("Cumulative Transfers")
            .draw()?;

        chart
            .draw_series(LineSeries::new(
                cumulative,
                CUMULATIVE_COLOR.mix(0.8).stroke_width(2),
            ))?
            .label("Cumulative Transfers")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], CUMULATIVE_COLOR));

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperLeft)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }

    Ok(())
}

/// Panel 2: grouped bars of upload and download counts per node.
fn draw_node_panel(panel: &Panel<'_>, counts: &NodeTransferCounts) -> Result<()> {
    let node_count = counts.nodes.len();
    let y_max = counts
        .uploads
        .iter()
        .chain(counts.downloads.iter())
        .copied()
        .max()
        .unwrap_or(0)
        .max(1) as f64
        * 1.1;
    let x_max = node_count.max(1) as f64 - 0.5;

    let mut chart = ChartBuilder::on(panel)
        .caption("Transfers per Node", ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(70)
        .y_label_area_size(60)
        .build_cartesian_2d(-0.5f64..x_max, 0f64..y_max)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(node_count.clamp(1, 40))
        .x_label_formatter(&|x| {
            let index = x.round();
            if (x - index).abs() < 1e-6 && index >= 0.0 && (index as usize) < node_count {
                counts.nodes[index as usize].clone()
            } else {
                String::new()
            }
        })
        .x_label_style(
            ("sans-serif", 12)
                .into_font()
                .transform(FontTransform::Rotate90),
        )
        .x_desc("Node")
        .y_desc("Transfer Count")
        .draw()?;

    chart
        .draw_series(counts.uploads.iter().enumerate().map(|(i, count)| {
            let x = i as f64;
            Rectangle::new(
                [(x - BAR_WIDTH, 0.0), (x, *count as f64)],
                UPLOAD_COLOR.mix(0.8).filled(),
            )
        }))?
        .label("Uploads")
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], UPLOAD_COLOR.filled()));

    chart
        .draw_series(counts.downloads.iter().enumerate().map(|(i, count)| {
            let x = i as f64;
            Rectangle::new(
                [(x, 0.0), (x + BAR_WIDTH, *count as f64)],
                DOWNLOAD_COLOR.mix(0.8).filled(),
            )
        }))?
        .label("Downloads")
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], DOWNLOAD_COLOR.filled()));

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    Ok(())
}

/// Panel 3: the summary-statistics text block.
///
/// Figures without data (absent bandwidth samples, single-mode runs)
/// read as zero or are left out entirely rather than failing the render.
fn draw_stats_panel(panel: &Panel<'_>, stats: &SummaryStats) -> Result<()> {
    let (width, _) = panel.dim_in_pixel();
    panel.draw(&Text::new(
        "Summary Statistics",
        (width as i32 / 2, 14),
        TextStyle::from(("sans-serif", 22).into_font()).pos(Pos::new(HPos::Center, VPos::Top)),
    ))?;

    let mut lines = vec![
        "Simulation Statistics:".to_string(),
        format!(
            "• Total Transfers: {}",
            stats.total_transfers.to_formatted_string(&Locale::en)
        ),
        format!("• Simulation Time: {:.2} years", stats.simulation_years),
        format!("• Total Nodes: {}", stats.total_nodes),
        format!("• Avg Transfers/Node: {:.1}", stats.avg_transfers_per_node),
        format!("• Transfers/Year: {:.1}", stats.transfers_per_year),
        format!(
            "• Avg Transfer Duration: {:.1} s",
            stats.avg_transfer_duration
        ),
        format!("• Data Loss Events: {}", stats.data_loss_events),
        format!("• Nodes With Data Loss: {}", stats.nodes_with_data_loss),
        format!(
            "• Avg Upload Utilization: {:.1}%",
            stats.avg_upload_utilization
        ),
        format!(
            "• Avg Download Utilization: {:.1}%",
            stats.avg_download_utilization
        ),
    ];
    if !stats.transfer_type_counts.is_empty() {
        let breakdown = stats
            .transfer_type_counts
            .iter()
            .map(|(name, count)| format!("{name}: {count}"))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!("• By Type: {breakdown}"));
    }
    if let Some(concurrency) = &stats.concurrency {
        lines.push(format!("• Max Concurrent: {}", concurrency.max));
        lines.push(format!("• Avg Concurrent: {:.1}", concurrency.mean));
    }

    let style = TextStyle::from(("sans-serif", 16).into_font());
    for (i, line) in lines.iter().enumerate() {
        panel.draw(&Text::new(
            line.as_str(),
            (60, 70 + 26 * i as i32),
            style.clone(),
        ))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{Metadata, RawSeries, TransferCompletion};

    fn base_record(parallel: bool) -> SimulationRecord {
        SimulationRecord {
            metadata: Metadata {
                parallel_enabled: parallel,
                total_nodes: 3,
                simulation_end_time: 10.0 * SECONDS_PER_DAY,
                data_loss_events: 0,
                nodes_with_data_loss: 0,
            },
            transfers: (0..5)
                .map(|i| TransferCompletion {
                    time: i as f64 * SECONDS_PER_DAY,
                    transfer_type: "backup".to_string(),
                    duration: 30.0,
                    uploader: format!("node_{i}"),
                    downloader: format!("node_{}", (i + 1) % 3),
                })
                .collect(),
            series: RawSeries::default(),
        }
    }

    fn rendered_svg(record: &SimulationRecord) -> String {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.svg");
        render_report(record, &path).unwrap();
        std::fs::read_to_string(&path).unwrap()
    }

    #[test]
    fn renders_single_mode_report() {
        let svg = rendered_svg(&base_record(false));
        assert!(svg.contains("Single Transfer Mode Analysis"));
        assert!(svg.contains("Transfers per Node"));
        assert!(svg.contains("Summary Statistics"));
    }

    #[test]
    fn renders_parallel_overlay_when_sampled() {
        let mut record = base_record(true);
        record.series = RawSeries {
            sim_times: Some(vec![0.0, SECONDS_PER_DAY, 2.0 * SECONDS_PER_DAY]),
            sim_uploads: Some(vec![1.0, 2.0, 1.0]),
            sim_downloads: Some(vec![0.0, 2.0, 1.0]),
            ..RawSeries::default()
        };

        let svg = rendered_svg(&record);
        assert!(svg.contains("Parallel Transfer Mode Analysis"));
        assert!(svg.contains("Max Concurrent: 4"));
        assert!(svg.contains("Concurrent Transfers"));
    }

    #[test]
    fn parallel_mode_without_samples_degrades_to_plain_progress() {
        let svg = rendered_svg(&base_record(true));
        assert!(svg.contains("Parallel Transfer Mode Analysis"));
        assert!(!svg.contains("Max Concurrent"));
    }

    #[test]
    fn renders_report_for_empty_record() {
        let mut record = base_record(false);
        record.transfers.clear();

        let svg = rendered_svg(&record);
        // Progress panel is skipped; statistics still present, zeroed.
        assert!(!svg.contains("Transfer Progress Over Time"));
        assert!(svg.contains("Summary Statistics"));
        assert!(svg.contains("Transfers/Year: 0.0"));
    }
}
