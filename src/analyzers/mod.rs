//! Window aggregation over flattened arrival rows.
//!
//! Rows are grouped by categorical keys (line, stop, ...) and summarised into
//! [`WindowStats`](types::WindowStats): mean, sample standard deviation, min,
//! max and count of the wait time. The delay variant additionally flags
//! partitions whose waits exceed a typical value and grades them by severity.
//! Stop distances around a point get their own summary in [`distances`].

pub mod aggregate;
pub mod analyzer;
pub mod delays;
pub mod distances;
pub mod severity;
pub mod types;
pub mod utility;
pub mod window;
