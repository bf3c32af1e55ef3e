pub mod broker;

pub use broker::{Broker, Subscription};
