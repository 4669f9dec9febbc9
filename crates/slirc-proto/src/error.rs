//! Error types for the IRC protocol library.

use thiserror::Error;

/// Convenience type alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Errors raised while framing, decoding or encoding IRC lines.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// I/O error from the underlying byte stream.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The line exceeded the configured maximum length.
    #[error("message too long: {actual} bytes (limit: {limit})")]
    MessageTooLong {
        /// Actual length seen so far.
        actual: usize,
        /// Maximum allowed length.
        limit: usize,
    },

    /// An outgoing parameter contained a line break or NUL.
    #[error("illegal control character: {0:?}")]
    IllegalControlChar(char),

    /// A complete line was read but did not yield a message.
    #[error("invalid message: {string:?}")]
    InvalidMessage {
        /// The offending line, terminator stripped.
        string: String,
        /// Why parsing failed.
        #[source]
        cause: MessageParseError,
    },
}

/// Errors encountered when parsing a single IRC line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum MessageParseError {
    /// The line carried no command (blank, or only tags/prefix).
    #[error("empty message")]
    EmptyMessage,

    /// The command token contained characters other than letters or digits.
    #[error("invalid command: {0:?}")]
    InvalidCommand(String),
}
