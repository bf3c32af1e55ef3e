use crate::analyzers::types::{GroupKey, GroupValue, StatField, WindowStats};
use crate::analyzers::utility::{mean, min_max, sample_stddev};
use crate::error::{Error, Result};
use crate::rows::FlattenedRow;
use std::collections::BTreeMap;

/// Partitions rows by `group_keys` and summarises `stat_field` per partition.
///
/// Rows with a missing stat value, or a missing value for any group key, are
/// dropped first, so partitions without a qualifying row never appear. The
/// result is ordered by mean, largest first.
///
/// # Errors
///
/// Returns [`Error::NoGroupKeys`] when `group_keys` is empty.
pub fn aggregate(
    rows: &[FlattenedRow],
    group_keys: &[GroupKey],
    stat_field: StatField,
) -> Result<Vec<WindowStats>> {
    if group_keys.is_empty() {
        return Err(Error::NoGroupKeys);
    }
    Ok(summarize(rows, group_keys, stat_field))
}

/// Mean wait per line, keeping the `n` lines with the longest waits.
pub fn top_lines(rows: &[FlattenedRow], n: usize) -> Vec<WindowStats> {
    let mut stats = summarize(rows, &[GroupKey::Line], StatField::WaitMinutes);
    stats.truncate(n);
    stats
}

pub(crate) fn summarize(
    rows: &[FlattenedRow],
    group_keys: &[GroupKey],
    stat_field: StatField,
) -> Vec<WindowStats> {
    let mut stats: Vec<WindowStats> = partition(rows, group_keys, stat_field)
        .into_iter()
        .filter_map(|(values, series)| window_stats(group_keys, values, &series))
        .collect();

    // Stable sort: equal means keep the key order of the BTreeMap
    stats.sort_by(|a, b| b.mean.total_cmp(&a.mean));
    stats
}

/// Collects the stat values of each partition, keyed by group values.
pub(crate) fn partition(
    rows: &[FlattenedRow],
    group_keys: &[GroupKey],
    stat_field: StatField,
) -> BTreeMap<Vec<String>, Vec<f64>> {
    let mut partitions: BTreeMap<Vec<String>, Vec<f64>> = BTreeMap::new();

    for row in rows {
        let Some(value) = stat_field.value(row) else {
            continue;
        };
        let Some(group) = group_keys
            .iter()
            .map(|key| key.value(row).map(str::to_string))
            .collect::<Option<Vec<_>>>()
        else {
            continue;
        };

        partitions.entry(group).or_default().push(value);
    }

    partitions
}

pub(crate) fn window_stats(
    group_keys: &[GroupKey],
    values: Vec<String>,
    series: &[f64],
) -> Option<WindowStats> {
    let (min, max) = min_max(series)?;
    let avg = mean(series);

    Some(WindowStats {
        group: group_keys
            .iter()
            .zip(values)
            .map(|(&key, value)| GroupValue { key, value })
            .collect(),
        count: series.len(),
        mean: avg,
        std: sample_stddev(series, avg),
        min,
        max,
        delay: None,
    })
}
