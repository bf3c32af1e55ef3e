//! Traits for reading raw payloads from a publish/subscribe topic.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::SampleError;

/// Opens fresh subscriptions on a message broker.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Where the broker lives, for error reports.
    fn address(&self) -> String;

    /// Connects and subscribes to `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::ConnectionUnavailable`] when the broker cannot be
    /// reached. Implementations never retry.
    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>, SampleError>;
}

/// A live subscription owned by a single sampling call.
#[async_trait]
pub trait Subscription: Send {
    /// Waits for the next payload. `Ok(None)` means the topic has nothing more
    /// to deliver.
    async fn next_payload(&mut self) -> Result<Option<Bytes>, SampleError>;

    /// Releases the underlying connection.
    async fn close(&mut self);
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory broker; once its queue is drained, reads wait forever.
    #[derive(Default)]
    pub(crate) struct MemoryBroker {
        payloads: Vec<Result<Bytes, String>>,
        pub(crate) unreachable: bool,
        pub(crate) stalled: bool,
        pub(crate) opened: Arc<AtomicUsize>,
        pub(crate) closed: Arc<AtomicUsize>,
    }

    impl MemoryBroker {
        pub(crate) fn with_payloads<I, P>(payloads: I) -> Self
        where
            I: IntoIterator<Item = P>,
            P: Into<Bytes>,
        {
            Self {
                payloads: payloads.into_iter().map(|p| Ok(p.into())).collect(),
                ..Default::default()
            }
        }

        pub(crate) fn unreachable() -> Self {
            Self {
                unreachable: true,
                ..Default::default()
            }
        }

        /// A broker that accepts the connection but never confirms it.
        pub(crate) fn stalled() -> Self {
            Self {
                stalled: true,
                ..Default::default()
            }
        }

        /// Appends a read error after the queued payloads.
        pub(crate) fn failing_after(mut self, reason: &str) -> Self {
            self.payloads.push(Err(reason.to_string()));
            self
        }

        pub(crate) fn opened(&self) -> usize {
            self.opened.load(Ordering::SeqCst)
        }

        pub(crate) fn closed(&self) -> usize {
            self.closed.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Broker for MemoryBroker {
        fn address(&self) -> String {
            "memory".to_string()
        }

        async fn subscribe(&self, _topic: &str) -> Result<Box<dyn Subscription>, SampleError> {
            if self.stalled {
                std::future::pending::<()>().await;
            }
            if self.unreachable {
                return Err(SampleError::ConnectionUnavailable {
                    address: self.address(),
                    reason: "connection refused".to_string(),
                });
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MemorySubscription {
                queue: self.payloads.iter().cloned().collect(),
                closed: self.closed.clone(),
            }))
        }
    }

    struct MemorySubscription {
        queue: VecDeque<Result<Bytes, String>>,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Subscription for MemorySubscription {
        async fn next_payload(&mut self) -> Result<Option<Bytes>, SampleError> {
            match self.queue.pop_front() {
                Some(Ok(payload)) => Ok(Some(payload)),
                Some(Err(reason)) => Err(SampleError::ConnectionLost(reason)),
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}
