//! Supervised upstream: relay loop and reconnect with backoff.
//!
//! Each [`Upstream`] runs two tasks. The reader task owns the socket's read
//! half and runs the heartbeat read loop, pushing messages into a small
//! queue. The supervisor task is the queue's single consumer: it answers
//! PING, publishes every message to subscribers in arrival order and, once
//! the reader reports a terminal failure, dials again with exponential
//! backoff and swaps the new link in under the same [`Upstream`].

use super::connector::{Connector, Transport};
use super::heartbeat::{self, LinkFailure};
use super::identity::ServerIdentity;
use super::io::{ClosedWriter, MessageReader, SharedWriter, TransportError, shared};
use super::{LinkSettings, ReconnectPolicy};
use crate::metrics;
use crate::telemetry::spans;
use parking_lot::RwLock;
use rand::Rng;
use slirc_proto::Message;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{Instrument, debug, error, info, warn};

/// Externally visible state of a supervised link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// Registered and relaying.
    Ready,
    /// Link lost; `attempt` is the 0-based step of the current retry sequence.
    Reconnecting { attempt: u32 },
    /// Retries exhausted. Terminal.
    Closed,
}

/// One pooled, supervised logical connection.
pub struct Upstream {
    identity: ServerIdentity,
    nick: RwLock<String>,
    writer: SharedWriter,
    status: watch::Sender<LinkStatus>,
    relay: broadcast::Sender<Message>,
    write_timeout: Duration,
}

impl std::fmt::Debug for Upstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upstream")
            .field("addr", &self.identity.address())
            .field("nick", &*self.nick.read())
            .field("status", &self.status())
            .finish()
    }
}

impl Upstream {
    /// Take ownership of a registered transport and start supervising it.
    pub fn spawn(
        identity: ServerIdentity,
        transport: Transport,
        connector: Arc<dyn Connector>,
        settings: LinkSettings,
    ) -> Arc<Self> {
        let Transport {
            reader,
            writer,
            nick,
        } = transport;
        let (status, _) = watch::channel(LinkStatus::Ready);
        let (relay, _) = broadcast::channel(settings.relay.subscriber_capacity);

        let span = spans::upstream(&identity.address(), &identity.nickname);
        let upstream = Arc::new(Self {
            identity,
            nick: RwLock::new(nick),
            writer: shared(writer),
            status,
            relay,
            write_timeout: settings.heartbeat.write_timeout,
        });
        metrics::upstream_opened();

        tokio::spawn(supervise(Arc::clone(&upstream), reader, connector, settings).instrument(span));
        upstream
    }

    pub fn identity(&self) -> &ServerIdentity {
        &self.identity
    }

    /// Nickname currently registered upstream.
    pub fn current_nick(&self) -> String {
        self.nick.read().clone()
    }

    pub fn status(&self) -> LinkStatus {
        *self.status.borrow()
    }

    /// Follow status changes.
    pub fn watch_status(&self) -> watch::Receiver<LinkStatus> {
        self.status.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.status() == LinkStatus::Closed
    }

    /// Receive every message read from the server from now on, in order.
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.relay.subscribe()
    }

    /// Write a message to the current link under the write deadline.
    pub async fn send(&self, msg: &Message) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let deadline = Instant::now() + self.write_timeout;
        self.writer.lock().await.write_message(msg, deadline).await
    }

    async fn dispatch(&self, msg: Message) {
        if msg.is_command("PING") {
            let pong = Message::pong(msg.last_param().unwrap_or_default());
            if let Err(e) = self.send(&pong).await {
                warn!(error = %e, "Failed to answer PING");
            }
        }
        metrics::record_relayed();
        // No subscribers is not an error.
        let _ = self.relay.send(msg);
    }

    /// Drain the reader's queue until it hangs up, then collect its verdict.
    async fn drain(
        &self,
        mut inbound: mpsc::Receiver<Message>,
        reader: JoinHandle<LinkFailure>,
    ) -> String {
        while let Some(msg) = inbound.recv().await {
            self.dispatch(msg).await;
        }
        match reader.await {
            Ok(failure) => failure.to_string(),
            Err(e) => format!("reader task aborted: {e}"),
        }
    }

    async fn install(&self, transport: Transport) -> Box<dyn MessageReader> {
        *self.writer.lock().await = transport.writer;
        *self.nick.write() = transport.nick;
        self.status.send_replace(LinkStatus::Ready);
        transport.reader
    }

    /// Mark the upstream closed and drop the last link's write half.
    async fn retire(&self) {
        *self.writer.lock().await = Box::new(ClosedWriter);
        self.status.send_replace(LinkStatus::Closed);
    }
}

async fn supervise(
    upstream: Arc<Upstream>,
    mut reader: Box<dyn MessageReader>,
    connector: Arc<dyn Connector>,
    settings: LinkSettings,
) {
    loop {
        let (tx, rx) = mpsc::channel(settings.relay.inbound_queue);
        let reader_task = tokio::spawn(
            heartbeat::read_loop(reader, Arc::clone(&upstream.writer), tx, settings.heartbeat)
                .in_current_span(),
        );

        let reason = upstream.drain(rx, reader_task).await;
        warn!(reason = %reason, "Upstream link lost");

        match reconnect(&upstream, connector.as_ref(), &settings).await {
            Some(transport) => {
                info!(nick = %transport.nick, "Upstream link restored");
                reader = upstream.install(transport).await;
            }
            None => {
                error!(
                    attempts = settings.reconnect.max_attempts,
                    "Giving up on upstream"
                );
                upstream.retire().await;
                metrics::upstream_closed();
                return;
            }
        }
    }
}

async fn reconnect(
    upstream: &Upstream,
    connector: &dyn Connector,
    settings: &LinkSettings,
) -> Option<Transport> {
    let policy = settings.reconnect;
    for attempt in 0..policy.max_attempts {
        upstream.status.send_replace(LinkStatus::Reconnecting { attempt });

        let delay = backoff_delay(attempt, jitter(&policy));
        debug!(attempt, delay_ms = delay.as_millis() as u64, "Waiting before reconnect");
        tokio::time::sleep(delay).await;

        metrics::record_reconnect_attempt();
        let result = connector
            .connect(&upstream.identity, &settings.handshake)
            .instrument(spans::reconnect(attempt))
            .await;
        match result {
            Ok(transport) => return Some(transport),
            Err(e) => warn!(attempt, error = %e, "Reconnect attempt failed"),
        }
    }
    None
}

/// `2^(attempt + 1)` seconds plus `jitter`, saturating instead of overflowing.
pub fn backoff_delay(attempt: u32, jitter: Duration) -> Duration {
    let secs = 1u64
        .checked_shl(attempt.saturating_add(1))
        .unwrap_or(u64::MAX);
    Duration::from_secs(secs).saturating_add(jitter)
}

fn jitter(policy: &ReconnectPolicy) -> Duration {
    let max_ms = u64::try_from(policy.max_jitter.as_millis()).unwrap_or(u64::MAX);
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::upstream::connector::ConnectError;
    use crate::upstream::handshake::tests::{CaptureWriter, identity};
    use crate::upstream::{HandshakeSettings, ReconnectPolicy};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{timeout, timeout_at};

    /// Reader fed from a channel; dropping the sender closes the link.
    pub(crate) struct ChannelReader(pub mpsc::UnboundedReceiver<Message>);

    #[async_trait]
    impl MessageReader for ChannelReader {
        async fn read_message(&mut self, deadline: Instant) -> Result<Message, TransportError> {
            match timeout_at(deadline, self.0.recv()).await {
                Err(_) => Err(TransportError::Timeout),
                Ok(None) => Err(TransportError::Closed),
                Ok(Some(msg)) => Ok(msg),
            }
        }
    }

    /// A scripted link: push server lines in, read client lines out.
    pub(crate) struct FakeLink {
        pub server: mpsc::UnboundedSender<Message>,
        pub written: CaptureWriter,
    }

    pub(crate) fn fake_transport(nick: &str) -> (Transport, FakeLink) {
        let (server, rx) = mpsc::unbounded_channel();
        let written = CaptureWriter::default();
        let transport = Transport {
            reader: Box::new(ChannelReader(rx)),
            writer: Box::new(written.clone()),
            nick: nick.to_string(),
        };
        (transport, FakeLink { server, written })
    }

    /// Connector that hands out queued links and counts calls.
    #[derive(Default)]
    struct QueueConnector {
        links: Mutex<VecDeque<Transport>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Connector for QueueConnector {
        async fn connect(
            &self,
            _: &ServerIdentity,
            _: &HandshakeSettings,
        ) -> Result<Transport, ConnectError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.links.lock().pop_front().ok_or(ConnectError::DialTimeout {
                addr: "localhost:6667".into(),
            })
        }
    }

    fn msg(raw: &str) -> Message {
        Message::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_relays_in_order_and_answers_ping() {
        let (transport, link) = fake_transport("bot");
        let upstream = Upstream::spawn(
            identity(),
            transport,
            Arc::new(QueueConnector::default()),
            LinkSettings::default(),
        );
        let mut sub = upstream.subscribe();

        link.server.send(msg(":a!b@c PRIVMSG #x :one")).unwrap();
        link.server.send(msg("PING :irc.local")).unwrap();
        link.server.send(msg(":a!b@c PRIVMSG #x :two")).unwrap();

        let mut got = Vec::new();
        for _ in 0..3 {
            got.push(sub.recv().await.unwrap().last_param().unwrap().to_string());
        }
        assert_eq!(got, vec!["one", "irc.local", "two"]);
        assert_eq!(link.written.lines(), vec!["PONG :irc.local"]);
        assert_eq!(upstream.status(), LinkStatus::Ready);
    }

    #[tokio::test]
    async fn test_send_uses_current_writer() {
        let (transport, link) = fake_transport("bot");
        let upstream = Upstream::spawn(
            identity(),
            transport,
            Arc::new(QueueConnector::default()),
            LinkSettings::default(),
        );

        upstream.send(&msg("PRIVMSG #x :hello")).await.unwrap();
        assert_eq!(link.written.lines(), vec!["PRIVMSG #x :hello"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_swaps_link_in_place() {
        let (first, first_link) = fake_transport("bot");
        let (second, second_link) = fake_transport("bot_42");
        let connector = Arc::new(QueueConnector::default());
        connector.links.lock().push_back(second);

        let upstream = Upstream::spawn(
            identity(),
            first,
            Arc::clone(&connector) as Arc<dyn Connector>,
            LinkSettings::default(),
        );
        let mut status = upstream.watch_status();
        let mut sub = upstream.subscribe();

        drop(first_link.server);
        timeout(Duration::from_secs(60), status.wait_for(|s| *s != LinkStatus::Ready))
            .await
            .unwrap()
            .unwrap();
        timeout(Duration::from_secs(60), status.wait_for(|s| *s == LinkStatus::Ready))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(connector.calls.load(Ordering::SeqCst), 1);
        assert_eq!(upstream.current_nick(), "bot_42");

        upstream.send(&msg("PRIVMSG #x :after")).await.unwrap();
        assert_eq!(second_link.written.lines(), vec!["PRIVMSG #x :after"]);
        assert!(first_link.written.lines().is_empty());

        second_link.server.send(msg("NOTICE bot_42 :still here")).unwrap();
        assert_eq!(sub.recv().await.unwrap().last_param(), Some("still here"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let (transport, link) = fake_transport("bot");
        assert_eq!(Arc::strong_count(&link.written.sent), 2);
        let connector = Arc::new(QueueConnector::default());
        let settings = LinkSettings {
            reconnect: ReconnectPolicy {
                max_attempts: 3,
                max_jitter: Duration::from_millis(1000),
            },
            ..LinkSettings::default()
        };
        let upstream = Upstream::spawn(
            identity(),
            transport,
            Arc::clone(&connector) as Arc<dyn Connector>,
            settings,
        );
        let mut status = upstream.watch_status();
        let started = Instant::now();

        drop(link.server);
        timeout(Duration::from_secs(600), status.wait_for(|s| *s == LinkStatus::Closed))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(connector.calls.load(Ordering::SeqCst), 3);
        // 2 + 4 + 8 seconds of backoff, plus under a second of jitter each
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(14), "{waited:?}");
        assert!(waited < Duration::from_secs(17), "{waited:?}");
        assert!(upstream.is_closed());
        // the abandoned link's writer is gone
        assert_eq!(Arc::strong_count(&link.written.sent), 1);
        assert!(matches!(
            upstream.send(&msg("PRIVMSG #x :late")).await,
            Err(TransportError::Closed)
        ));
    }

    #[test]
    fn test_backoff_delay() {
        assert_eq!(backoff_delay(0, Duration::ZERO), Duration::from_secs(2));
        assert_eq!(backoff_delay(1, Duration::from_millis(500)), Duration::from_millis(4500));
        assert_eq!(backoff_delay(3, Duration::ZERO), Duration::from_secs(16));
        assert_eq!(backoff_delay(62, Duration::ZERO), Duration::from_secs(1 << 63));
        assert!(backoff_delay(299, Duration::from_millis(999)) > Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_jitter_bounds() {
        let policy = ReconnectPolicy::default();
        for _ in 0..200 {
            assert!(jitter(&policy) < Duration::from_millis(1000));
        }
        let none = ReconnectPolicy {
            max_jitter: Duration::ZERO,
            ..policy
        };
        assert_eq!(jitter(&none), Duration::ZERO);
    }
}
