//! Core configuration struct definitions.

use super::defaults::*;
use super::{ConfigError, validation};
use crate::upstream::{
    HandshakeSettings, HeartbeatSettings, LinkSettings, ReconnectPolicy, RelaySettings,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Relay configuration.
///
/// Every section is optional; an empty file yields the built-in defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Registration API listener.
    #[serde(default)]
    pub http: HttpConfig,
    /// Upstream registration (PASS/NICK/USER) behaviour.
    #[serde(default)]
    pub handshake: HandshakeConfig,
    /// Liveness detection on established upstreams.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    /// Recovery after an upstream is lost.
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    /// Hand-off between the reader task and subscribers.
    #[serde(default)]
    pub relay: RelayConfig,
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        validation::validate(&config).map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Runtime settings for every upstream link.
    pub fn link_settings(&self) -> LinkSettings {
        LinkSettings {
            handshake: HandshakeSettings {
                timeout: Duration::from_secs(self.handshake.timeout_secs),
                max_nick_attempts: self.handshake.max_nick_attempts,
            },
            heartbeat: HeartbeatSettings {
                read_timeout: Duration::from_secs(self.heartbeat.read_timeout_secs),
                pong_timeout: Duration::from_secs(self.heartbeat.pong_timeout_secs),
                write_timeout: Duration::from_secs(self.heartbeat.write_timeout_secs),
                missed_deadline_limit: self.heartbeat.missed_deadline_limit,
            },
            reconnect: ReconnectPolicy {
                max_attempts: self.reconnect.max_attempts,
                max_jitter: Duration::from_millis(self.reconnect.max_jitter_ms),
            },
            relay: RelaySettings {
                inbound_queue: self.relay.inbound_queue,
                subscriber_capacity: self.relay.subscriber_capacity,
            },
        }
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    /// Address to bind the registration API to.
    #[serde(default = "default_http_listen")]
    pub listen: SocketAddr,
    /// Serve `/metrics` alongside the API.
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: default_http_listen(),
            metrics: true,
        }
    }
}

/// Upstream registration configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandshakeConfig {
    /// Overall deadline for dial + registration, in seconds.
    #[serde(default = "default_handshake_timeout")]
    pub timeout_secs: u64,
    /// Nickname collisions tolerated before giving up on one attempt.
    #[serde(default = "default_max_nick_attempts")]
    pub max_nick_attempts: u32,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_handshake_timeout(),
            max_nick_attempts: default_max_nick_attempts(),
        }
    }
}

/// Heartbeat configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeartbeatConfig {
    /// Read deadline while traffic is flowing.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    /// Read deadline after a PING probe was sent.
    #[serde(default = "default_pong_timeout")]
    pub pong_timeout_secs: u64,
    /// Deadline for a single outgoing write.
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,
    /// Consecutive read deadlines missed before probing.
    #[serde(default = "default_missed_deadline_limit")]
    pub missed_deadline_limit: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            read_timeout_secs: default_read_timeout(),
            pong_timeout_secs: default_pong_timeout(),
            write_timeout_secs: default_write_timeout(),
            missed_deadline_limit: default_missed_deadline_limit(),
        }
    }
}

/// Reconnect configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconnectConfig {
    /// Handshake attempts per outage before the upstream is abandoned.
    #[serde(default = "default_reconnect_attempts")]
    pub max_attempts: u32,
    /// Upper bound (exclusive) of the random jitter added to each delay.
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_reconnect_attempts(),
            max_jitter_ms: default_max_jitter_ms(),
        }
    }
}

/// Relay queue configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    /// Capacity of the reader -> consumer queue.
    #[serde(default = "default_inbound_queue")]
    pub inbound_queue: usize,
    /// Messages buffered per subscriber before it starts lagging.
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            inbound_queue: default_inbound_queue(),
            subscriber_capacity: default_subscriber_capacity(),
        }
    }
}
