//! The upstream connection engine.
//!
//! One [`Upstream`] is one logical, supervised connection to a remote IRC
//! server on behalf of a [`ServerIdentity`]:
//!
//! - [`io`]: message-level read/write capabilities with absolute deadlines
//! - [`handshake`]: the PASS/NICK/USER registration state machine
//! - [`heartbeat`]: the read loop and its deadline/PING liveness probe
//! - [`connector`]: dial + handshake, producing a ready [`Transport`]
//! - [`supervisor`]: relay, PING answering and reconnect with backoff

pub mod connector;
pub mod handshake;
pub mod heartbeat;
pub mod identity;
pub mod io;
pub mod supervisor;

pub use connector::{ConnectError, Connector, TcpConnector, Transport};
pub use handshake::{HandshakeError, HandshakeMachine, HandshakeState};
pub use heartbeat::LinkFailure;
pub use identity::{ServerIdentity, ValidationError};
pub use io::{MessageReader, MessageWriter, TransportError};
pub use supervisor::{LinkStatus, Upstream, backoff_delay};

use std::time::Duration;

/// Registration behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeSettings {
    /// Deadline for the whole exchange, dial included.
    pub timeout: Duration,
    /// Nickname collisions tolerated before the attempt fails.
    pub max_nick_attempts: u32,
}

impl Default for HandshakeSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            max_nick_attempts: 16,
        }
    }
}

/// Liveness detection on an established link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatSettings {
    pub read_timeout: Duration,
    pub pong_timeout: Duration,
    pub write_timeout: Duration,
    /// Consecutive missed read deadlines before a PING probe is sent.
    pub missed_deadline_limit: u32,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(15),
            write_timeout: Duration::from_secs(30),
            missed_deadline_limit: 5,
        }
    }
}

/// Retry policy after a link is lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    /// Exclusive upper bound of the jitter added to each backoff step.
    pub max_jitter: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 300,
            max_jitter: Duration::from_millis(1000),
        }
    }
}

/// Queue sizes between the reader task, the supervisor and subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelaySettings {
    pub inbound_queue: usize,
    pub subscriber_capacity: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            inbound_queue: 10,
            subscriber_capacity: 256,
        }
    }
}

/// Everything an upstream link needs at runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkSettings {
    pub handshake: HandshakeSettings,
    pub heartbeat: HeartbeatSettings,
    pub reconnect: ReconnectPolicy,
    pub relay: RelaySettings,
}
