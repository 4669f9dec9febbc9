//! Liveness detection for a registered upstream.
//!
//! The read loop reads with a bounded deadline. Every message is handed to
//! the consumer and pushes the deadline out. Missed deadlines are counted;
//! at the limit a PING carrying a time-derived nonce is sent and the short
//! pong-wait deadline armed. Missing that deadline as well ends the loop.

use super::HeartbeatSettings;
use super::io::{MessageReader, SharedWriter, TransportError};
use crate::metrics;
use slirc_proto::Message;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Why a read loop stopped. Reported exactly once.
#[derive(Debug, Error)]
pub enum LinkFailure {
    #[error("no PONG received for heartbeat probe")]
    PongTimeout,
    #[error("read failed: {0}")]
    Transport(TransportError),
    #[error("failed to send heartbeat probe: {0}")]
    ProbeFailed(TransportError),
    #[error("message consumer went away")]
    ConsumerGone,
}

impl LinkFailure {
    /// Short label for metrics.
    pub fn cause(&self) -> &'static str {
        match self {
            Self::PongTimeout => "pong_timeout",
            Self::Transport(_) => "transport",
            Self::ProbeFailed(_) => "probe_failed",
            Self::ConsumerGone => "consumer_gone",
        }
    }
}

/// What to do after a read deadline passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeoutAction {
    /// Keep reading until the new deadline.
    Rearm,
    /// Send this PING and wait for its PONG.
    Probe(Message),
    /// The outstanding probe went unanswered.
    Fail,
}

/// Deadline bookkeeping for one read loop.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    settings: HeartbeatSettings,
    missed: u32,
    awaiting: Option<String>,
    deadline: Instant,
}

impl Heartbeat {
    pub fn new(settings: HeartbeatSettings, now: Instant) -> Self {
        Self {
            settings,
            missed: 0,
            awaiting: None,
            deadline: now + settings.read_timeout,
        }
    }

    /// Deadline for the next read.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn missed(&self) -> u32 {
        self.missed
    }

    /// Nonce of the PING still waiting for its PONG.
    pub fn awaiting_pong(&self) -> Option<&str> {
        self.awaiting.as_deref()
    }

    /// A message arrived.
    ///
    /// Only the awaited PONG leaves the deadline where it is; anything else,
    /// including a PONG with the wrong nonce, extends it.
    pub fn on_message(&mut self, msg: &Message, now: Instant) {
        self.missed = 0;

        let awaited = msg.is_command("PONG")
            && self.awaiting.is_some()
            && msg.last_param() == self.awaiting.as_deref();
        if awaited {
            self.awaiting = None;
        } else {
            self.deadline = now + self.settings.read_timeout;
        }
    }

    /// The current deadline passed without a message.
    pub fn on_timeout(&mut self, now: Instant) -> TimeoutAction {
        if self.awaiting.is_some() {
            return TimeoutAction::Fail;
        }

        self.missed += 1;
        if self.missed >= self.settings.missed_deadline_limit {
            let nonce = nonce();
            self.awaiting = Some(nonce.clone());
            self.deadline = now + self.settings.pong_timeout;
            TimeoutAction::Probe(Message::ping(nonce))
        } else {
            self.deadline = now + self.settings.read_timeout;
            TimeoutAction::Rearm
        }
    }
}

/// Current UNIX time in nanoseconds.
fn nonce() -> String {
    let now = chrono::Utc::now();
    now.timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros().saturating_mul(1000))
        .to_string()
}

/// Read messages into `inbound` until the link fails.
///
/// Messages are delivered in read order; a full queue stalls the loop. Probes
/// are written through `writer` under the configured write deadline.
pub async fn read_loop(
    mut reader: Box<dyn MessageReader>,
    writer: SharedWriter,
    inbound: mpsc::Sender<Message>,
    settings: HeartbeatSettings,
) -> LinkFailure {
    let failure = run(reader.as_mut(), &writer, &inbound, settings).await;
    metrics::record_link_failure(failure.cause());
    warn!(cause = failure.cause(), error = %failure, "Upstream read loop stopped");
    failure
}

async fn run(
    reader: &mut dyn MessageReader,
    writer: &SharedWriter,
    inbound: &mpsc::Sender<Message>,
    settings: HeartbeatSettings,
) -> LinkFailure {
    let mut heartbeat = Heartbeat::new(settings, Instant::now());

    loop {
        match reader.read_message(heartbeat.deadline()).await {
            Ok(msg) => {
                heartbeat.on_message(&msg, Instant::now());
                if inbound.send(msg).await.is_err() {
                    return LinkFailure::ConsumerGone;
                }
            }
            Err(e) if e.is_timeout() => match heartbeat.on_timeout(Instant::now()) {
                TimeoutAction::Rearm => {
                    debug!(missed = heartbeat.missed(), "Read deadline missed");
                }
                TimeoutAction::Probe(ping) => {
                    debug!(missed = heartbeat.missed(), "Sending heartbeat probe");
                    metrics::record_heartbeat_probe();
                    let deadline = Instant::now() + settings.write_timeout;
                    if let Err(e) = writer.lock().await.write_message(&ping, deadline).await {
                        return LinkFailure::ProbeFailed(e);
                    }
                }
                TimeoutAction::Fail => return LinkFailure::PongTimeout,
            },
            Err(e) => return LinkFailure::Transport(e),
        }
    }
}
