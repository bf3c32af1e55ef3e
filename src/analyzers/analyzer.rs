use crate::analyzers::aggregate::aggregate;
use crate::analyzers::delays::detect_delays;
use crate::analyzers::types::{GroupKey, StatField, WindowReport};
use crate::config::DelayConfig;
use crate::error::Result;
use crate::rows::FlattenedRow;
use anyhow::Context;
use chrono::Utc;
use std::fs::{self, File};
use std::path::Path;
use tracing::{debug, info};

/// Runs both aggregations over one set of rows.
pub fn analyze(
    rows: &[FlattenedRow],
    group_by: &[GroupKey],
    delays: &DelayConfig,
) -> Result<WindowReport> {
    let waits = aggregate(rows, group_by, StatField::WaitMinutes)?;
    let flagged = detect_delays(rows, delays.typical_wait, delays.threshold_ratio);

    let rows_with_wait = rows.iter().filter(|r| r.wait_minutes.is_some()).count();
    debug!(
        rows = rows.len(),
        rows_with_wait,
        groups = waits.len(),
        delayed_groups = flagged.len(),
        "Window analyzed"
    );

    Ok(WindowReport {
        generated_at: Utc::now(),
        rows: rows.len(),
        rows_with_wait,
        waits,
        delays: flagged,
    })
}

/// Loads rows previously exported with
/// [`append_rows`](crate::output::append_rows), from a single CSV file or from
/// every `.csv` file of a directory.
pub fn load_rows(path: &Path) -> anyhow::Result<Vec<FlattenedRow>> {
    if !path.is_dir() {
        return read_rows_csv(path);
    }

    let mut rows = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let file = entry.path();

        if file.extension().and_then(|e| e.to_str()) != Some("csv") {
            continue;
        }

        rows.extend(read_rows_csv(&file)?);
    }

    info!(path = %path.display(), rows = rows.len(), "Rows loaded");
    Ok(rows)
}

fn read_rows_csv(path: &Path) -> anyhow::Result<Vec<FlattenedRow>> {
    let file =
        File::open(path).with_context(|| format!("cannot open rows file {}", path.display()))?;
    let mut rdr = csv::Reader::from_reader(file);
    let mut rows = Vec::new();

    for result in rdr.deserialize() {
        let record: FlattenedRow = result?;
        rows.push(record);
    }

    Ok(rows)
}
