//! Telemetry utilities: the wire observer hook and span constructors.

use slirc_proto::Message;
use std::fmt;
use std::sync::Arc;

/// Which way a message crossed the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Received from the upstream server.
    Inbound,
    /// Written to the upstream server.
    Outbound,
}

impl Direction {
    /// Arrow used in wire logs.
    pub fn arrow(self) -> &'static str {
        match self {
            Self::Inbound => "<--",
            Self::Outbound => "-->",
        }
    }
}

/// Hook invoked with every message read from or written to an upstream.
///
/// Runs inline on the I/O path, so implementations must not block.
#[derive(Clone)]
pub struct Observer(Arc<dyn Fn(Direction, &Message) + Send + Sync>);

impl Observer {
    /// Wrap an arbitrary callback.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Direction, &Message) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Observer that does nothing.
    pub fn noop() -> Self {
        Self::new(|_, _| {})
    }

    /// Observer that writes `<--`/`-->` wire lines at TRACE level.
    pub fn tracing() -> Self {
        Self::new(|direction, msg| {
            tracing::trace!(target: "slirc_relay::wire", "{} {}", direction.arrow(), msg);
        })
    }

    #[inline]
    pub fn observe(&self, direction: Direction, msg: &Message) {
        (self.0)(direction, msg)
    }
}

impl Default for Observer {
    fn default() -> Self {
        Self::tracing()
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Observer(..)")
    }
}

/// Standardized span constructors for relay observability.
pub mod spans {
    use tracing::{Span, info_span};

    /// Span covering the whole life of one supervised upstream.
    pub fn upstream(address: &str, nickname: &str) -> Span {
        info_span!("upstream", addr = %address, nick = %nickname)
    }

    /// Span for dialing and registering.
    pub fn handshake(address: &str) -> Span {
        info_span!("handshake", addr = %address)
    }

    /// Span for one step of the reconnect sequence.
    pub fn reconnect(attempt: u32) -> Span {
        info_span!("reconnect", attempt = attempt)
    }
}
