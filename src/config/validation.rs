//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use thiserror::Error;

/// Longest accepted timeout, in seconds (one day).
pub const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Validation errors for configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("{field} ({value}) exceeds the maximum of {max}")]
    TooLarge {
        field: &'static str,
        value: u64,
        max: u64,
    },
    #[error("heartbeat.pong_timeout_secs ({pong}) should not exceed read_timeout_secs ({read})")]
    PongLongerThanRead { pong: u64, read: u64 },
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let non_zero: [(&'static str, u64); 9] = [
        ("handshake.timeout_secs", config.handshake.timeout_secs),
        ("handshake.max_nick_attempts", config.handshake.max_nick_attempts.into()),
        ("heartbeat.read_timeout_secs", config.heartbeat.read_timeout_secs),
        ("heartbeat.pong_timeout_secs", config.heartbeat.pong_timeout_secs),
        ("heartbeat.write_timeout_secs", config.heartbeat.write_timeout_secs),
        ("heartbeat.missed_deadline_limit", config.heartbeat.missed_deadline_limit.into()),
        ("reconnect.max_attempts", config.reconnect.max_attempts.into()),
        ("relay.inbound_queue", config.relay.inbound_queue as u64),
        ("relay.subscriber_capacity", config.relay.subscriber_capacity as u64),
    ];
    for (field, value) in non_zero {
        if value == 0 {
            errors.push(ValidationError::Zero(field));
        }
    }

    let bounded: [(&'static str, u64, u64); 5] = [
        ("handshake.timeout_secs", config.handshake.timeout_secs, MAX_TIMEOUT_SECS),
        ("heartbeat.read_timeout_secs", config.heartbeat.read_timeout_secs, MAX_TIMEOUT_SECS),
        ("heartbeat.pong_timeout_secs", config.heartbeat.pong_timeout_secs, MAX_TIMEOUT_SECS),
        ("heartbeat.write_timeout_secs", config.heartbeat.write_timeout_secs, MAX_TIMEOUT_SECS),
        ("reconnect.max_jitter_ms", config.reconnect.max_jitter_ms, MAX_TIMEOUT_SECS * 1000),
    ];
    for (field, value, max) in bounded {
        if value > max {
            errors.push(ValidationError::TooLarge { field, value, max });
        }
    }

    let hb = &config.heartbeat;
    if hb.pong_timeout_secs > hb.read_timeout_secs {
        errors.push(ValidationError::PongLongerThanRead {
            pong: hb.pong_timeout_secs,
            read: hb.read_timeout_secs,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
