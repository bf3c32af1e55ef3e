//! Explicit configuration values passed into the sampler, aggregators and
//! watch loop. The binary fills these from CLI flags and environment.

use std::time::Duration;

use crate::analyzers::types::GroupKey;

pub const DEFAULT_BROKER_HOST: &str = "localhost";
pub const DEFAULT_BROKER_PORT: u16 = 1883;
pub const DEFAULT_TOPIC: &str = "tan/arrivals";

/// Connection settings for the MQTT broker.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    /// Prefix of the client id; a per-connection suffix is appended.
    pub client_id: String,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
}

impl BrokerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_BROKER_HOST.to_string(),
            port: DEFAULT_BROKER_PORT,
            client_id: "tan-waits".to_string(),
            keep_alive: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Bounds of one sampling call.
#[derive(Debug, Clone)]
pub struct SampleConfig {
    pub topic: String,
    pub max_messages: usize,
    pub timeout: Duration,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            topic: DEFAULT_TOPIC.to_string(),
            max_messages: 100,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Thresholds for delay detection.
#[derive(Debug, Clone, Copy)]
pub struct DelayConfig {
    /// Expected wait in minutes.
    pub typical_wait: f64,
    pub threshold_ratio: f64,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            typical_wait: 10.0,
            threshold_ratio: 1.5,
        }
    }
}

/// Settings of the repeated sample/aggregate loop.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Number of passes; 0 runs until interrupted.
    pub iterations: usize,
    pub interval: Duration,
    pub group_by: Vec<GroupKey>,
    /// Keep rows across passes for this long instead of starting fresh.
    pub retain: Option<Duration>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            iterations: 10,
            interval: Duration::from_secs(30),
            group_by: vec![GroupKey::Line],
            retain: None,
        }
    }
}
