//! Offline broker that replays a JSON-lines capture as if it were the topic.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::error::SampleError;
use crate::services::{Broker, Subscription};

/// Every subscription replays the whole file from the first line, one
/// non-blank line per message. The topic name is not checked.
pub struct ReplayBroker {
    path: PathBuf,
}

impl ReplayBroker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Broker for ReplayBroker {
    fn address(&self) -> String {
        self.path.display().to_string()
    }

    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>, SampleError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| SampleError::ConnectionUnavailable {
                address: self.address(),
                reason: e.to_string(),
            })?;

        let queue: VecDeque<Bytes> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| Bytes::copy_from_slice(line.as_bytes()))
            .collect();

        info!(topic, path = %self.path.display(), messages = queue.len(), "Replay opened");
        Ok(Box::new(ReplaySubscription { queue }))
    }
}

struct ReplaySubscription {
    queue: VecDeque<Bytes>,
}

#[async_trait]
impl Subscription for ReplaySubscription {
    async fn next_payload(&mut self) -> Result<Option<Bytes>, SampleError> {
        Ok(self.queue.pop_front())
    }

    async fn close(&mut self) {
        debug!(unread = self.queue.len(), "Replay closed");
        self.queue.clear();
    }
}
