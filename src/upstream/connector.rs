//! Producing registered upstream links.

use super::handshake::{self, HandshakeError};
use super::identity::ServerIdentity;
use super::io::{FramedReader, FramedWriter, MessageReader, MessageWriter};
use super::HandshakeSettings;
use crate::telemetry::{Observer, spans};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout_at};
use tracing::Instrument;

/// A socket that completed registration.
pub struct Transport {
    pub reader: Box<dyn MessageReader>,
    pub writer: Box<dyn MessageWriter>,
    /// Nickname the server accepted, possibly derived after collisions.
    pub nick: String,
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport").field("nick", &self.nick).finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("failed to connect to {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("timed out connecting to {addr}")]
    DialTimeout { addr: String },
    #[error(transparent)]
    Handshake(#[from] HandshakeError),
}

/// Dials and registers one upstream. The pool and the supervisor only ever
/// obtain connections through this.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        identity: &ServerIdentity,
        settings: &HandshakeSettings,
    ) -> Result<Transport, ConnectError>;
}

/// Plain TCP connector.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    observer: Observer,
}

impl TcpConnector {
    pub fn new(observer: Observer) -> Self {
        Self { observer }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(
        &self,
        identity: &ServerIdentity,
        settings: &HandshakeSettings,
    ) -> Result<Transport, ConnectError> {
        let addr = identity.address();
        let span = spans::handshake(&addr);

        async {
            let deadline = Instant::now() + settings.timeout;
            let stream = match timeout_at(deadline, TcpStream::connect(addr.clone())).await {
                Err(_) => return Err(ConnectError::DialTimeout { addr }),
                Ok(Err(source)) => return Err(ConnectError::Dial { addr, source }),
                Ok(Ok(stream)) => stream,
            };
            if let Err(e) = stream.set_nodelay(true) {
                tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
            }

            let (read, write) = stream.into_split();
            let mut reader = FramedReader::new(read, self.observer.clone());
            let mut writer = FramedWriter::new(write, self.observer.clone());

            let nick = handshake::perform(&mut reader, &mut writer, identity, settings).await?;
            Ok(Transport {
                reader: Box::new(reader),
                writer: Box::new(writer),
                nick,
            })
        }
        .instrument(span)
        .await
    }
}
