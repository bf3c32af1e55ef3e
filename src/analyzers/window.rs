//! Rows retained across sampling passes, pruned by age.
//!
//! Off by default: each watch iteration normally aggregates only the rows it
//! just sampled.

use chrono::{DateTime, Duration, Utc};

use crate::rows::FlattenedRow;

#[derive(Debug)]
pub struct RowWindow {
    rows: Vec<FlattenedRow>,
    max_age: Duration,
}

impl RowWindow {
    pub fn new(max_age: Duration) -> Self {
        Self {
            rows: Vec::new(),
            max_age,
        }
    }

    pub fn extend(&mut self, rows: impl IntoIterator<Item = FlattenedRow>) {
        self.rows.extend(rows);
    }

    /// Drops rows processed before `now - max_age`. Returns how many were dropped.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let Some(cutoff) = now.checked_sub_signed(self.max_age) else {
            return 0;
        };
        let before = self.rows.len();
        self.rows.retain(|row| row.processed_at >= cutoff);
        before - self.rows.len()
    }

    pub fn rows(&self) -> &[FlattenedRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
