//! Rendering and persistence for window results.
//!
//! Supports a plain-text table, JSON serialization, and CSV append of rows.

use anyhow::Result;
use tracing::{debug, info};

use crate::analyzers::distances::DistanceSummary;
use crate::analyzers::types::{WindowReport, WindowStats};
use crate::rows::FlattenedRow;
use csv::WriterBuilder;
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::path::Path;

/// Logs a report as pretty-printed JSON.
pub fn print_json(report: &WindowReport) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

/// Renders statistics as a fixed-width text table, one partition per line.
pub fn render_table(stats: &[WindowStats]) -> String {
    let mut out = String::new();

    let label_width = stats
        .iter()
        .map(|s| s.label().chars().count())
        .chain(std::iter::once(5))
        .max()
        .unwrap_or(5);
    let with_delays = stats.iter().any(|s| s.delay.is_some());

    let _ = write!(
        out,
        "{:<label_width$}  {:>5}  {:>6}  {:>6}  {:>5}  {:>5}",
        "group", "count", "mean", "std", "min", "max"
    );
    if with_delays {
        let _ = write!(out, "  {:>7}  {:>10}  {}", "delayed", "mean_delay", "severity");
    }
    out.push('\n');

    for s in stats {
        let std = s.std.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"));
        let _ = write!(
            out,
            "{:<label_width$}  {:>5}  {:>6.2}  {:>6}  {:>5}  {:>5}",
            s.label(),
            s.count,
            s.mean,
            std,
            s.min,
            s.max
        );
        if let Some(d) = &s.delay {
            let _ = write!(
                out,
                "  {:>7}  {:>10.2}  {}",
                d.delayed_count, d.mean_delay, d.severity
            );
        }
        out.push('\n');
    }

    out
}

/// Renders both sections of a report.
pub fn render_report(report: &WindowReport) -> String {
    let mut out = format!(
        "{} rows ({} with a wait time) at {}\n\nWait time per group\n",
        report.rows,
        report.rows_with_wait,
        report.generated_at.format("%Y-%m-%d %H:%M:%S")
    );

    if report.waits.is_empty() {
        out.push_str("(no data)\n");
    } else {
        out.push_str(&render_table(&report.waits));
    }

    out.push_str("\nDelays per line and stop\n");
    if report.delays.is_empty() {
        out.push_str("(none)\n");
    } else {
        out.push_str(&render_table(&report.delays));
    }

    out
}

/// Renders a distance summary followed by its histogram, one bar per bucket.
pub fn render_distances(summary: &DistanceSummary) -> String {
    let std = summary
        .std
        .map_or_else(|| "-".to_string(), |v| format!("{v:.1}"));
    let mut out = format!(
        "{} stops, mean {:.1} m, std {} m, min {:.0} m, max {:.0} m\n",
        summary.stops, summary.mean, std, summary.min, summary.max
    );

    for bucket in &summary.histogram {
        let _ = writeln!(
            out,
            "{:>5}-{:<5} {:>3} {}",
            bucket.from,
            bucket.to,
            bucket.count,
            "#".repeat(bucket.count)
        );
    }

    out
}

/// Appends rows to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_rows(path: &Path, rows: &[FlattenedRow]) -> Result<()> {
    let file_exists = path.exists();
    debug!(path = %path.display(), file_exists, rows = rows.len(), "Appending CSV rows");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    Ok(())
}
