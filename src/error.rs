//! Error types for sampling and aggregation.

use thiserror::Error;

/// Result type alias for aggregation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the aggregators.
#[derive(Error, Debug)]
pub enum Error {
    #[error("at least one group key is required")]
    NoGroupKeys,
}

/// Outcome of a failed sampling call.
///
/// Per-message decode failures never show up here: the sampler skips those
/// and keeps reading.
#[derive(Error, Debug)]
pub enum SampleError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("broker unavailable at {address}: {reason}")]
    ConnectionUnavailable { address: String, reason: String },

    #[error("connection lost while reading: {0}")]
    ConnectionLost(String),

    #[error("subscription to {topic} failed: {reason}")]
    Subscription { topic: String, reason: String },
}

impl SampleError {
    /// Returns `true` when the broker could not be reached at all.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, SampleError::ConnectionUnavailable { .. })
    }
}
