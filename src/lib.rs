//! Passive DNS monitor: pairs every DNS answer seen on the wire with the
//! query that asked for it and emits one JSON record per answer.

pub mod cli;
pub mod config;
pub mod correlator;
pub mod dns;
pub mod error;
pub mod executor;
pub mod logging;
pub mod parser;
pub mod record;
pub mod shared_data;
pub mod sharder;
pub mod sink;
pub mod sniffer;
pub mod stats;

#[cfg(test)]
mod testutil;

pub use config::Config;
pub use error::SnifferError;
pub use record::LogRecord;
