//! IRC message codec for tokio.
//!
//! Wraps [`LineCodec`] and parses each line into a [`Message`].

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{ProtocolError, Result};
use crate::line::LineCodec;
use crate::message::Message;

/// Tokio codec for owned IRC messages.
#[derive(Debug, Default)]
pub struct IrcCodec {
    inner: LineCodec,
}

impl IrcCodec {
    /// Codec with the default line length ceiling.
    pub fn new() -> Self {
        Self::default()
    }

    /// Codec with a custom line length ceiling in bytes.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            inner: LineCodec::with_max_len(max_len),
        }
    }

    /// Refuse parameters that would smuggle extra lines onto the wire.
    fn check_params(msg: &Message) -> Result<()> {
        for ch in msg.all_params().flat_map(str::chars) {
            if matches!(ch, '\r' | '\n' | '\0') {
                return Err(ProtocolError::IllegalControlChar(ch));
            }
        }
        Ok(())
    }
}

impl Decoder for IrcCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        let Some(line) = self.inner.decode(src)? else {
            return Ok(None);
        };
        Message::parse(&line)
            .map(Some)
            .map_err(|cause| ProtocolError::InvalidMessage {
                string: line,
                cause,
            })
    }
}

impl Encoder<Message> for IrcCodec {
    type Error = ProtocolError;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> Result<()> {
        Self::check_params(&msg)?;
        self.inner.encode(msg.to_string(), dst)
    }
}

impl Encoder<&Message> for IrcCodec {
    type Error = ProtocolError;

    fn encode(&mut self, msg: &Message, dst: &mut BytesMut) -> Result<()> {
        Self::check_params(msg)?;
        self.inner.encode(msg.to_string(), dst)
    }
}
