use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{ArrivalEntry, ArrivalMessage};

/// Wait text the feed uses for a vehicle that is about to arrive.
pub const APPROACHING: &str = "proche";

/// One arrival denormalised with its parent message's stop fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlattenedRow {
    pub timestamp: Option<String>,
    pub stop_code: String,
    pub stop_name: Option<String>,
    pub direction: Option<String>,
    pub terminus: Option<String>,
    pub line: Option<String>,
    pub real_time: bool,
    pub wait_text: Option<String>,
    pub wait_minutes: Option<u32>,

    /// Local clock at expansion time, not the emission timestamp.
    pub processed_at: DateTime<Utc>,
}

impl FlattenedRow {
    pub fn from_entry(
        message: &ArrivalMessage,
        entry: &ArrivalEntry,
        processed_at: DateTime<Utc>,
    ) -> Self {
        FlattenedRow {
            timestamp: message.timestamp.clone(),
            stop_code: message.stop_code.clone(),
            stop_name: message.stop_name.clone(),
            direction: entry.sens.clone(),
            terminus: entry.terminus.clone(),
            line: entry.line().map(str::to_string),
            real_time: entry.temps_reel,
            wait_text: entry.temps.clone(),
            wait_minutes: parse_wait(entry.temps.as_deref()),
            processed_at,
        }
    }
}

/// Expands every arrival of `message` into its own row.
pub fn flatten(message: &ArrivalMessage) -> Vec<FlattenedRow> {
    message
        .arrivals
        .iter()
        .map(|entry| FlattenedRow::from_entry(message, entry, Utc::now()))
        .collect()
}

/// Converts wait text into minutes.
///
/// Missing text is `None`, [`APPROACHING`] is 0, an all-digit string is its
/// value, anything else uses the first run of digits found in it. Text with no
/// digits at all is `None`, and so is a digit run too large for a `u32`
/// (over 4294967295 minutes).
pub fn parse_wait(text: Option<&str>) -> Option<u32> {
    let text = text?;

    if text == APPROACHING {
        return Some(0);
    }

    if !text.is_empty() && text.chars().all(|c| c.is_ascii_digit()) {
        return text.parse().ok();
    }

    let start = text.find(|c: char| c.is_ascii_digit())?;
    let run = &text[start..];
    let end = run.find(|c: char| !c.is_ascii_digit()).unwrap_or(run.len());
    run[..end].parse().ok()
}
