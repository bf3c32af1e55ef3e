//! Bounded ingestion: read a handful of messages from the topic and flatten
//! them into rows.

use std::time::Duration;

use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use crate::config::SampleConfig;
use crate::error::SampleError;
use crate::parser::parse_message;
use crate::rows::{FlattenedRow, flatten};
use crate::services::{Broker, Subscription};

/// Reads up to `max_messages` messages from `topic`, or whatever arrives
/// within `timeout` of the call, and flattens them into rows.
///
/// A fresh subscription is opened on every call and closed before returning,
/// whatever the outcome. Messages that fail to decode are logged and skipped.
/// Nothing arriving in time yields an empty vector.
///
/// The whole call, connecting and closing included, is bound by `timeout`.
/// A close still running at the deadline is cut short and the connection
/// dropped without a clean disconnect.
///
/// # Errors
///
/// - [`SampleError::InvalidArgument`] if `max_messages` or `timeout` is zero.
/// - [`SampleError::ConnectionUnavailable`] if the broker cannot be reached,
///   or has not accepted the subscription by the deadline.
/// - [`SampleError::Subscription`] if the broker refuses the subscription.
/// - [`SampleError::ConnectionLost`] if the connection drops mid-read.
#[tracing::instrument(skip(broker), fields(timeout_secs = timeout.as_secs_f64()))]
pub async fn sample<B>(
    broker: &B,
    topic: &str,
    max_messages: usize,
    timeout: Duration,
) -> Result<Vec<FlattenedRow>, SampleError>
where
    B: Broker + ?Sized,
{
    if max_messages == 0 {
        return Err(SampleError::InvalidArgument(
            "max_messages must be greater than zero".to_string(),
        ));
    }
    if timeout.is_zero() {
        return Err(SampleError::InvalidArgument(
            "timeout must be greater than zero".to_string(),
        ));
    }

    let deadline = Instant::now() + timeout;
    let mut subscription = match timeout_at(deadline, broker.subscribe(topic)).await {
        Ok(subscription) => subscription?,
        Err(_) => {
            warn!(address = %broker.address(), "No subscription before the deadline");
            return Err(SampleError::ConnectionUnavailable {
                address: broker.address(),
                reason: format!("not subscribed within {}s", timeout.as_secs_f64()),
            });
        }
    };

    let outcome = drain(subscription.as_mut(), max_messages, deadline).await;
    if timeout_at(deadline, subscription.close()).await.is_err() {
        debug!("Close cut short at the deadline");
    }

    let rows = outcome?;
    info!(rows = rows.len(), "Sample complete");
    Ok(rows)
}

/// [`sample`] with its bounds taken from a [`SampleConfig`].
pub async fn sample_with<B>(broker: &B, config: &SampleConfig) -> Result<Vec<FlattenedRow>, SampleError>
where
    B: Broker + ?Sized,
{
    sample(broker, &config.topic, config.max_messages, config.timeout).await
}

async fn drain(
    subscription: &mut dyn Subscription,
    max_messages: usize,
    deadline: Instant,
) -> Result<Vec<FlattenedRow>, SampleError> {
    let mut rows = Vec::new();
    let mut received = 0usize;
    let mut skipped = 0usize;

    while received < max_messages {
        let payload = match timeout_at(deadline, subscription.next_payload()).await {
            Err(_) => {
                debug!(received, "Sample window elapsed");
                break;
            }
            Ok(Ok(Some(payload))) => payload,
            Ok(Ok(None)) => {
                debug!(received, "Topic exhausted");
                break;
            }
            Ok(Err(e)) => return Err(e),
        };

        received += 1;
        match parse_message(&payload) {
            Ok(message) => {
                debug!(stop_code = %message.stop_code, arrivals = message.arrivals.len(), "Message decoded");
                rows.extend(flatten(&message));
            }
            Err(e) => {
                skipped += 1;
                warn!(error = %e, bytes = payload.len(), "Skipping undecodable message");
            }
        }
    }

    debug!(received, skipped, rows = rows.len(), "Read loop finished");
    Ok(rows)
}
