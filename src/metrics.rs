//! Prometheus metrics collection for slirc-relay.
//!
//! Everything here is a no-op until [`init`] has been called, so library
//! users and unit tests can run without a registry.
//!
//! - `relay_upstream_connections` - live supervised upstreams
//! - `relay_leases` - outstanding lease tokens
//! - `relay_handshakes_total{result}` - registration outcomes
//! - `relay_reconnect_attempts_total` - handshakes retried by the supervisor
//! - `relay_heartbeat_probes_total` - PINGs sent after missed deadlines
//! - `relay_link_failures_total{cause}` - terminal read loop exits
//! - `relay_messages_relayed_total` - messages published to subscribers

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Gauges
// ========================================================================

/// Supervised upstream connections currently alive.
pub static UPSTREAM_CONNECTIONS: OnceLock<IntGauge> = OnceLock::new();

/// Lease tokens currently mapped to an upstream.
pub static LEASES: OnceLock<IntGauge> = OnceLock::new();

// ========================================================================
// Counters
// ========================================================================

/// Handshake outcomes by result label.
pub static HANDSHAKES: OnceLock<IntCounterVec> = OnceLock::new();

pub static RECONNECT_ATTEMPTS: OnceLock<IntCounter> = OnceLock::new();

pub static HEARTBEAT_PROBES: OnceLock<IntCounter> = OnceLock::new();

/// Terminal read loop failures by cause.
pub static LINK_FAILURES: OnceLock<IntCounterVec> = OnceLock::new();

pub static MESSAGES_RELAYED: OnceLock<IntCounter> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Call once at startup. Later calls are harmless.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            if $metric.get().is_none() {
                match $init {
                    Ok(m) => {
                        if let Err(e) = r.register(Box::new(m.clone())) {
                            tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
                        }
                        let _ = $metric.set(m);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, concat!("Failed to create metric ", stringify!($metric)));
                    }
                }
            }
        };
    }

    register!(UPSTREAM_CONNECTIONS, IntGauge::new("relay_upstream_connections", "Live supervised upstream connections"));
    register!(LEASES, IntGauge::new("relay_leases", "Outstanding lease tokens"));
    register!(HANDSHAKES, IntCounterVec::new(Opts::new("relay_handshakes_total", "Upstream handshakes by result"), &["result"]));
    register!(RECONNECT_ATTEMPTS, IntCounter::new("relay_reconnect_attempts_total", "Reconnect handshakes attempted"));
    register!(HEARTBEAT_PROBES, IntCounter::new("relay_heartbeat_probes_total", "Heartbeat PING probes sent"));
    register!(LINK_FAILURES, IntCounterVec::new(Opts::new("relay_link_failures_total", "Terminal upstream read failures by cause"), &["cause"]));
    register!(MESSAGES_RELAYED, IntCounter::new("relay_messages_relayed_total", "Messages published to subscribers"));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

#[inline]
pub fn upstream_opened() {
    if let Some(g) = UPSTREAM_CONNECTIONS.get() {
        g.inc();
    }
}

#[inline]
pub fn upstream_closed() {
    if let Some(g) = UPSTREAM_CONNECTIONS.get() {
        g.dec();
    }
}

#[inline]
pub fn set_leases(count: usize) {
    if let Some(g) = LEASES.get() {
        g.set(i64::try_from(count).unwrap_or(i64::MAX));
    }
}

/// Record a handshake outcome (`ok`, `timeout`, `nick_exhausted`, ...).
#[inline]
pub fn record_handshake(result: &str) {
    if let Some(c) = HANDSHAKES.get() {
        c.with_label_values(&[result]).inc();
    }
}

#[inline]
pub fn record_reconnect_attempt() {
    if let Some(c) = RECONNECT_ATTEMPTS.get() {
        c.inc();
    }
}

#[inline]
pub fn record_heartbeat_probe() {
    if let Some(c) = HEARTBEAT_PROBES.get() {
        c.inc();
    }
}

#[inline]
pub fn record_link_failure(cause: &str) {
    if let Some(c) = LINK_FAILURES.get() {
        c.with_label_values(&[cause]).inc();
    }
}

#[inline]
pub fn record_relayed() {
    if let Some(c) = MESSAGES_RELAYED.get() {
        c.inc();
    }
}
