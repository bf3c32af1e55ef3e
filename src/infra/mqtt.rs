//! MQTT transport for the arrivals topic.
//!
//! Each subscription is its own connection with a clean session, so nothing
//! persists between sampling calls. MQTT has no replayable offsets: the
//! earliest message a new subscriber sees is the topic's retained message,
//! followed by live traffic.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use rumqttc::{
    AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
    SubscribeReasonCode,
};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::BrokerConfig;
use crate::error::SampleError;
use crate::services::{Broker, Subscription};

/// Upper bound on flushing the DISCONNECT packet when closing.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

pub struct MqttBroker {
    config: BrokerConfig,
}

impl MqttBroker {
    pub fn new(config: BrokerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Broker for MqttBroker {
    fn address(&self) -> String {
        self.config.address()
    }

    /// Returns once the broker has granted the subscription.
    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>, SampleError> {
        let (client, mut eventloop) = connect(&self.config).await?;

        let rejected = |reason: String| SampleError::Subscription {
            topic: topic.to_string(),
            reason,
        };

        client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| rejected(e.to_string()))?;

        let mut early = VecDeque::new();
        let return_codes = wait_for_suback(&mut eventloop, &mut early)
            .await
            .map_err(|e| SampleError::ConnectionLost(e.to_string()))?;

        if return_codes
            .iter()
            .any(|code| matches!(code, SubscribeReasonCode::Failure))
        {
            warn!(topic, address = %self.config.address(), "MQTT subscription rejected");
            disconnect(&client, &mut eventloop).await;
            return Err(rejected("broker refused the subscription".to_string()));
        }

        info!(topic, address = %self.config.address(), "MQTT subscription opened");

        Ok(Box::new(MqttSubscription {
            client,
            eventloop,
            early,
            topic: topic.to_string(),
        }))
    }
}

struct MqttSubscription {
    client: AsyncClient,
    eventloop: EventLoop,
    /// Publishes that arrived ahead of the SUBACK.
    early: VecDeque<Bytes>,
    topic: String,
}

#[async_trait]
impl Subscription for MqttSubscription {
    async fn next_payload(&mut self) -> Result<Option<Bytes>, SampleError> {
        if let Some(payload) = self.early.pop_front() {
            return Ok(Some(payload));
        }

        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => return Ok(Some(publish.payload)),
                Ok(_) => {}
                Err(e) => return Err(SampleError::ConnectionLost(e.to_string())),
            }
        }
    }

    async fn close(&mut self) {
        disconnect(&self.client, &mut self.eventloop).await;
        debug!(topic = %self.topic, "MQTT subscription closed");
    }
}

/// Publishes JSON payloads; used by the feed producer.
pub struct MqttPublisher {
    client: AsyncClient,
    eventloop: EventLoop,
}

impl MqttPublisher {
    pub async fn connect(config: &BrokerConfig) -> Result<Self, SampleError> {
        let (client, eventloop) = connect(config).await?;
        info!(address = %config.address(), "MQTT publisher connected");
        Ok(Self { client, eventloop })
    }

    /// Serializes `value` and waits until the broker acknowledges it.
    pub async fn publish_json(&mut self, topic: &str, value: &impl Serialize) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(value)?;
        let bytes = payload.len();

        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await?;

        loop {
            match self.eventloop.poll().await? {
                Event::Incoming(Packet::PubAck(_)) => break,
                _ => continue,
            }
        }

        debug!(topic, bytes, "Payload published");
        Ok(())
    }

    pub async fn close(mut self) {
        disconnect(&self.client, &mut self.eventloop).await;
    }
}

fn options(config: &BrokerConfig) -> MqttOptions {
    // Unique per connection so concurrent runs don't kick each other off
    let client_id = format!("{}-{}", config.client_id, Utc::now().timestamp_millis());
    let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
    options.set_keep_alive(config.keep_alive);
    options.set_clean_session(true);
    options
}

/// Opens a connection and drives the event loop until CONNACK.
async fn connect(config: &BrokerConfig) -> Result<(AsyncClient, EventLoop), SampleError> {
    let (client, mut eventloop) = AsyncClient::new(options(config), 100);

    let unavailable = |reason: String| SampleError::ConnectionUnavailable {
        address: config.address(),
        reason,
    };

    match tokio::time::timeout(config.connect_timeout, wait_for_connack(&mut eventloop)).await {
        Ok(Ok(())) => Ok((client, eventloop)),
        Ok(Err(e)) => {
            warn!(address = %config.address(), error = %e, "MQTT connect failed");
            Err(unavailable(e.to_string()))
        }
        Err(_) => Err(unavailable(format!(
            "no CONNACK within {}s",
            config.connect_timeout.as_secs_f64()
        ))),
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<(), ConnectionError> {
    loop {
        if let Event::Incoming(Packet::ConnAck(_)) = eventloop.poll().await? {
            return Ok(());
        }
    }
}

async fn wait_for_suback(
    eventloop: &mut EventLoop,
    early: &mut VecDeque<Bytes>,
) -> Result<Vec<SubscribeReasonCode>, ConnectionError> {
    loop {
        match eventloop.poll().await? {
            Event::Incoming(Packet::SubAck(ack)) => {
                debug!(return_codes = ?ack.return_codes, "Subscription acknowledged");
                return Ok(ack.return_codes);
            }
            Event::Incoming(Packet::Publish(publish)) => early.push_back(publish.payload),
            _ => {}
        }
    }
}

/// Sends DISCONNECT and gives the event loop up to [`CLOSE_GRACE`] to flush
/// it. The socket is dropped with the event loop either way.
async fn disconnect(client: &AsyncClient, eventloop: &mut EventLoop) {
    if let Err(e) = client.disconnect().await {
        debug!(error = %e, "MQTT disconnect request failed");
        return;
    }

    let flush = async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    };
    if tokio::time::timeout(CLOSE_GRACE, flush).await.is_err() {
        debug!("MQTT disconnect not flushed in time, dropping connection");
    }
}
