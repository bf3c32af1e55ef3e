pub mod analyzers;
pub mod config;
pub mod error;
pub mod fetch;
pub mod infra;
pub mod model;
pub mod output;
pub mod parser;
pub mod rows;
pub mod sampler;
pub mod services;
pub mod tan;
pub mod watch;
