//! # slirc-proto
//!
//! The small slice of the IRC protocol the relay needs: an owned message
//! model with a tolerant parser and a strict serializer, the numerics the
//! connection engine reacts to, and tokio codecs for framing.
//!
//! ```rust
//! use slirc_proto::{Message, Response};
//!
//! let msg: Message = ":irc.example 433 * bot :Nickname is already in use"
//!     .parse()
//!     .expect("valid line");
//! assert_eq!(msg.response(), Some(Response::ERR_NICKNAMEINUSE));
//! assert_eq!(Message::nick("bot_42").to_string(), "NICK bot_42");
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod error;
#[cfg(feature = "tokio")]
pub mod irc;
#[cfg(feature = "tokio")]
pub mod line;
pub mod message;
pub mod response;

pub use self::error::{MessageParseError, ProtocolError};
#[cfg(feature = "tokio")]
pub use self::irc::IrcCodec;
#[cfg(feature = "tokio")]
pub use self::line::{LineCodec, MAX_IRC_LINE_LEN};
pub use self::message::{Message, Tag};
pub use self::response::Response;
