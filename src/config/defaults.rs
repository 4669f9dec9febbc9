//! Default value functions for configuration.
//!
//! Separated into its own module for clarity and reuse.

use std::net::SocketAddr;

/// Returns `true` (for serde defaults).
pub fn default_true() -> bool {
    true
}

// =============================================================================
// HTTP Defaults
// =============================================================================

pub fn default_http_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9667))
}

// =============================================================================
// Handshake Defaults
// =============================================================================

pub fn default_handshake_timeout() -> u64 {
    15
}

pub fn default_max_nick_attempts() -> u32 {
    16
}

// =============================================================================
// Heartbeat Defaults
// =============================================================================

pub fn default_read_timeout() -> u64 {
    30
}

pub fn default_pong_timeout() -> u64 {
    15
}

pub fn default_write_timeout() -> u64 {
    30
}

pub fn default_missed_deadline_limit() -> u32 {
    5
}

// =============================================================================
// Reconnect Defaults
// =============================================================================

pub fn default_reconnect_attempts() -> u32 {
    300
}

pub fn default_max_jitter_ms() -> u64 {
    1000
}

// =============================================================================
// Relay Defaults
// =============================================================================

pub fn default_inbound_queue() -> usize {
    10
}

pub fn default_subscriber_capacity() -> usize {
    256
}
