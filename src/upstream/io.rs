//! Message-level read/write capabilities over an upstream socket.
//!
//! The connection engine only ever talks to [`MessageReader`] and
//! [`MessageWriter`], so the handshake and heartbeat logic run unchanged
//! against scripted in-memory implementations. Deadlines are absolute
//! instants, the same way a socket deadline would be armed.

use crate::telemetry::{Direction, Observer};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use slirc_proto::{IrcCodec, Message, ProtocolError};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{Instant, timeout_at};
use tokio_util::codec::{FramedRead, FramedWrite};

/// Errors at the transport boundary.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The armed deadline passed before the operation finished.
    #[error("deadline elapsed")]
    Timeout,
    /// The peer closed the stream.
    #[error("connection closed by peer")]
    Closed,
    /// Framing or decoding failed, including I/O errors under the codec.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// Dialing or another raw socket operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether this error is a deadline expiry rather than a broken link.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::TimedOut,
            Self::Protocol(ProtocolError::Io(e)) => e.kind() == std::io::ErrorKind::TimedOut,
            _ => false,
        }
    }
}

/// Reads one complete message at a time.
#[async_trait]
pub trait MessageReader: Send {
    /// Wait for the next message until `deadline`.
    async fn read_message(&mut self, deadline: Instant) -> Result<Message, TransportError>;
}

/// Writes one complete message at a time.
#[async_trait]
pub trait MessageWriter: Send {
    /// Serialize and flush `msg`, giving up at `deadline`.
    async fn write_message(&mut self, msg: &Message, deadline: Instant)
    -> Result<(), TransportError>;
}

/// The writer half shared by the relay's senders and the heartbeat probe.
///
/// The supervisor replaces the boxed writer in place after a reconnect.
pub type SharedWriter = Arc<tokio::sync::Mutex<Box<dyn MessageWriter>>>;

/// Wrap a writer for sharing.
pub fn shared(writer: Box<dyn MessageWriter>) -> SharedWriter {
    Arc::new(tokio::sync::Mutex::new(writer))
}

/// Writer left behind once an upstream is abandoned. Every write fails.
#[derive(Debug, Default)]
pub struct ClosedWriter;

#[async_trait]
impl MessageWriter for ClosedWriter {
    async fn write_message(&mut self, _: &Message, _: Instant) -> Result<(), TransportError> {
        Err(TransportError::Closed)
    }
}

/// [`MessageReader`] over any async byte stream.
pub struct FramedReader<R> {
    inner: FramedRead<R, IrcCodec>,
    observer: Observer,
}

impl<R: AsyncRead + Unpin + Send> FramedReader<R> {
    pub fn new(io: R, observer: Observer) -> Self {
        Self {
            inner: FramedRead::new(io, IrcCodec::new()),
            observer,
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> MessageReader for FramedReader<R> {
    async fn read_message(&mut self, deadline: Instant) -> Result<Message, TransportError> {
        // FramedRead keeps partial lines in its own buffer, so dropping the
        // pending read on timeout loses nothing.
        let msg = match timeout_at(deadline, self.inner.next()).await {
            Err(_) => return Err(TransportError::Timeout),
            Ok(None) => return Err(TransportError::Closed),
            Ok(Some(result)) => result?,
        };
        self.observer.observe(Direction::Inbound, &msg);
        Ok(msg)
    }
}

/// [`MessageWriter`] over any async byte sink.
pub struct FramedWriter<W> {
    inner: FramedWrite<W, IrcCodec>,
    observer: Observer,
}

impl<W: AsyncWrite + Unpin + Send> FramedWriter<W> {
    pub fn new(io: W, observer: Observer) -> Self {
        Self {
            inner: FramedWrite::new(io, IrcCodec::new()),
            observer,
        }
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> MessageWriter for FramedWriter<W> {
    async fn write_message(
        &mut self,
        msg: &Message,
        deadline: Instant,
    ) -> Result<(), TransportError> {
        self.observer.observe(Direction::Outbound, msg);
        match timeout_at(deadline, self.inner.send(msg)).await {
            Err(_) => Err(TransportError::Timeout),
            Ok(result) => result.map_err(TransportError::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;
    use tokio::io::{AsyncWriteExt, duplex};

    fn recording() -> (Observer, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let observer = Observer::new(move |dir, msg| {
            sink.lock().push(format!("{} {}", dir.arrow(), msg));
        });
        (observer, log)
    }

    fn soon() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[tokio::test]
    async fn test_reads_and_observes() {
        let (mut server, client) = duplex(1024);
        let (observer, log) = recording();
        let mut reader = FramedReader::new(client, observer);

        server.write_all(b":srv 001 bot :hi\r\n").await.unwrap();
        let msg = reader.read_message(soon()).await.unwrap();

        assert_eq!(msg.command, "001");
        assert_eq!(*log.lock(), vec!["<-- :srv 001 bot :hi".to_string()]);
    }

    #[tokio::test]
    async fn test_eof_is_closed() {
        let (server, client) = duplex(64);
        drop(server);
        let mut reader = FramedReader::new(client, Observer::noop());
        assert!(matches!(
            reader.read_message(soon()).await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_blank_frame_is_a_parse_error() {
        let (mut server, client) = duplex(64);
        let (observer, log) = recording();
        let mut reader = FramedReader::new(client, observer);

        server.write_all(b"\r\n").await.unwrap();
        let err = reader.read_message(soon()).await.unwrap_err();

        assert!(matches!(
            err,
            TransportError::Protocol(ProtocolError::InvalidMessage { .. })
        ));
        assert!(!err.is_timeout());
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn test_non_utf8_line_keeps_stream_alive() {
        let (mut server, client) = duplex(1024);
        let mut reader = FramedReader::new(client, Observer::noop());

        server
            .write_all(b":a!u@h PRIVMSG #x :caf\xe9\r\nPING :still-alive\r\n")
            .await
            .unwrap();

        let first = reader.read_message(soon()).await.unwrap();
        assert!(first.is_command("PRIVMSG"));
        assert_eq!(first.trailing.as_deref(), Some("caf\u{FFFD}"));

        let second = reader.read_message(soon()).await.unwrap();
        assert!(second.is_command("PING"));
        assert_eq!(second.last_param(), Some("still-alive"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expiry_is_timeout() {
        let (_server, client) = duplex(64);
        let mut reader = FramedReader::new(client, Observer::noop());

        let deadline = Instant::now() + Duration::from_secs(30);
        let err = reader.read_message(deadline).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_dropping_writer_closes_peer() {
        let (server, client) = duplex(1024);
        let shared = shared(Box::new(FramedWriter::new(client, Observer::noop())));
        let mut peer = FramedReader::new(server, Observer::noop());

        *shared.lock().await = Box::new(ClosedWriter);

        assert!(matches!(peer.read_message(soon()).await, Err(TransportError::Closed)));
        assert!(matches!(
            shared.lock().await.write_message(&Message::nick("bot"), soon()).await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_write_observes_then_encodes() {
        let (server, client) = duplex(1024);
        let (observer, log) = recording();
        let mut writer = FramedWriter::new(client, observer);
        let mut echo = FramedReader::new(server, Observer::noop());

        writer.write_message(&Message::nick("bot"), soon()).await.unwrap();

        assert_eq!(*log.lock(), vec!["--> NICK bot".to_string()]);
        assert_eq!(echo.read_message(soon()).await.unwrap(), Message::nick("bot"));
    }
}
