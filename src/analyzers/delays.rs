use crate::analyzers::aggregate::{partition, window_stats};
use crate::analyzers::severity::Severity;
use crate::analyzers::types::{DelaySummary, GroupKey, StatField, WindowStats};
use crate::analyzers::utility::mean;
use crate::rows::FlattenedRow;

/// Delays are tracked per line at each stop.
pub const DELAY_GROUP_KEYS: [GroupKey; 2] = [GroupKey::Line, GroupKey::StopCode];

/// Partitions with fewer delayed rows than this are not reported.
pub const MIN_DELAYED_ROWS: usize = 2;

/// Flags partitions whose waits run well past `typical_value`.
///
/// A row is delayed when its wait is strictly greater than
/// `typical_value * threshold_ratio`; its delay magnitude is then
/// `wait - typical_value`, otherwise 0. The mean delay is taken over every row
/// of the partition. Only partitions with at least [`MIN_DELAYED_ROWS`]
/// delayed rows are kept, largest mean delay first.
pub fn detect_delays(
    rows: &[FlattenedRow],
    typical_value: f64,
    threshold_ratio: f64,
) -> Vec<WindowStats> {
    let threshold = typical_value * threshold_ratio;

    let mut flagged: Vec<WindowStats> =
        partition(rows, &DELAY_GROUP_KEYS, StatField::WaitMinutes)
            .into_iter()
            .filter_map(|(values, series)| {
                let delays: Vec<f64> = series
                    .iter()
                    .map(|&v| if v > threshold { v - typical_value } else { 0.0 })
                    .collect();
                let delayed_count = series.iter().filter(|&&v| v > threshold).count();
                if delayed_count < MIN_DELAYED_ROWS {
                    return None;
                }

                let mean_delay = mean(&delays);
                let mut stats = window_stats(&DELAY_GROUP_KEYS, values, &series)?;
                stats.delay = Some(DelaySummary {
                    delayed_count,
                    mean_delay,
                    severity: Severity::classify(mean_delay),
                });
                Some(stats)
            })
            .collect();

    flagged.sort_by(|a, b| b.mean_delay().total_cmp(&a.mean_delay()));
    flagged
}
