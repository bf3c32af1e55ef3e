//! Broker implementations: a live MQTT connection and a file replay.

pub mod mqtt;
pub mod replay;

pub use mqtt::{MqttBroker, MqttPublisher};
pub use replay::ReplayBroker;
