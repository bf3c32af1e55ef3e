//! Data types produced by the window aggregators.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::analyzers::severity::Severity;
use crate::rows::FlattenedRow;

/// Categorical row field used to partition rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum GroupKey {
    Line,
    StopCode,
    StopName,
    Direction,
    Terminus,
}

impl GroupKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupKey::Line => "line",
            GroupKey::StopCode => "stop_code",
            GroupKey::StopName => "stop_name",
            GroupKey::Direction => "direction",
            GroupKey::Terminus => "terminus",
        }
    }

    /// Value of this key on `row`; `None` drops the row from grouping.
    pub fn value<'a>(&self, row: &'a FlattenedRow) -> Option<&'a str> {
        match self {
            GroupKey::Line => row.line.as_deref(),
            GroupKey::StopCode => Some(row.stop_code.as_str()),
            GroupKey::StopName => row.stop_name.as_deref(),
            GroupKey::Direction => row.direction.as_deref(),
            GroupKey::Terminus => row.terminus.as_deref(),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Numeric row field the statistics are computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatField {
    WaitMinutes,
}

impl StatField {
    pub fn value(&self, row: &FlattenedRow) -> Option<f64> {
        match self {
            StatField::WaitMinutes => row.wait_minutes.map(f64::from),
        }
    }
}

/// One key/value pair identifying a partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupValue {
    pub key: GroupKey,
    pub value: String,
}

/// Delay figures attached to a partition by [`detect_delays`](crate::analyzers::delays::detect_delays).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelaySummary {
    pub delayed_count: usize,
    pub mean_delay: f64,
    pub severity: Severity,
}

/// Statistics for a single partition of rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowStats {
    pub group: Vec<GroupValue>,
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; `None` for a single observation.
    pub std: Option<f64>,
    pub min: f64,
    pub max: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay: Option<DelaySummary>,
}

impl WindowStats {
    /// Value of `key` in this partition's group, if it was grouped on.
    pub fn group_value(&self, key: GroupKey) -> Option<&str> {
        self.group
            .iter()
            .find(|g| g.key == key)
            .map(|g| g.value.as_str())
    }

    /// Group values joined for display, e.g. `C5 / HBLI2`.
    pub fn label(&self) -> String {
        self.group
            .iter()
            .map(|g| g.value.as_str())
            .collect::<Vec<_>>()
            .join(" / ")
    }

    pub fn mean_delay(&self) -> f64 {
        self.delay.as_ref().map_or(0.0, |d| d.mean_delay)
    }
}

/// Result of one sample-and-aggregate pass.
#[derive(Debug, Serialize)]
pub struct WindowReport {
    pub generated_at: DateTime<Utc>,
    pub rows: usize,
    pub rows_with_wait: usize,
    pub waits: Vec<WindowStats>,
    pub delays: Vec<WindowStats>,
}
