//! slirc-relay - IRC connection relay.
//!
//! Keeps one persistent, registered connection per remote IRC server
//! identity and shares it between any number of short-lived API clients
//! holding lease tokens.

pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod pool;
pub mod telemetry;
pub mod upstream;

pub use config::Config;
pub use pool::{ConnectionPool, LeaseToken, PoolError, PoolStats};
pub use upstream::{ServerIdentity, Upstream};
