//! Owned IRC message model, parser and serializer.
//!
//! Only the framing is understood here: tags, prefix, command, middle
//! parameters and the trailing parameter. Commands are kept as strings so
//! traffic the relay does not care about passes through untouched.

use std::fmt;
use std::str::FromStr;

use crate::error::MessageParseError;
use crate::response::Response;

/// A single IRCv3 message tag, relayed without unescaping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tag(pub String, pub Option<String>);

/// An owned IRC message.
///
/// ```
/// use slirc_proto::Message;
///
/// let msg: Message = ":irc.example 001 bot :Welcome".parse().unwrap();
/// assert_eq!(msg.command, "001");
/// assert_eq!(msg.params, vec!["bot"]);
/// assert_eq!(msg.trailing.as_deref(), Some("Welcome"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// IRCv3 message tags.
    pub tags: Option<Vec<Tag>>,
    /// Source of the message, without the leading `:`.
    pub prefix: Option<String>,
    /// Command name or three-digit numeric.
    pub command: String,
    /// Middle parameters, in order.
    pub params: Vec<String>,
    /// Free-text final parameter.
    pub trailing: Option<String>,
}

impl Message {
    /// Create a message with middle parameters and no trailing part.
    pub fn new<C, I, P>(command: C, params: I) -> Self
    where
        C: Into<String>,
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            tags: None,
            prefix: None,
            command: command.into(),
            params: params.into_iter().map(Into::into).collect(),
            trailing: None,
        }
    }

    /// Attach a trailing parameter.
    #[must_use]
    pub fn with_trailing(mut self, trailing: impl Into<String>) -> Self {
        self.trailing = Some(trailing.into());
        self
    }

    /// Attach a prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// `PASS <password>`
    pub fn pass(password: impl Into<String>) -> Self {
        Self::new("PASS", [password.into()])
    }

    /// `NICK <nickname>`
    pub fn nick(nickname: impl Into<String>) -> Self {
        Self::new("NICK", [nickname.into()])
    }

    /// `USER <username> <hostname> <servername> :<realname>`
    pub fn user(username: impl Into<String>, realname: impl Into<String>) -> Self {
        Self::new("USER", [username.into(), "host".into(), "server".into()]).with_trailing(realname)
    }

    /// `PING :<token>`
    pub fn ping(token: impl Into<String>) -> Self {
        Self::new("PING", Vec::<String>::new()).with_trailing(token)
    }

    /// `PONG :<token>`
    pub fn pong(token: impl Into<String>) -> Self {
        Self::new("PONG", Vec::<String>::new()).with_trailing(token)
    }

    /// Parse a single line. Any `\r\n` terminator is ignored.
    pub fn parse(line: &str) -> Result<Self, MessageParseError> {
        let mut rest = line.trim_end_matches(&['\r', '\n'][..]);

        let mut tags = None;
        if let Some(raw) = rest.strip_prefix('@') {
            let (raw_tags, tail) = raw.split_once(' ').unwrap_or((raw, ""));
            tags = Some(parse_tags(raw_tags));
            rest = tail;
        }
        rest = rest.trim_start_matches(' ');

        let mut prefix = None;
        if let Some(raw) = rest.strip_prefix(':') {
            let (source, tail) = raw.split_once(' ').unwrap_or((raw, ""));
            prefix = Some(source.to_string());
            rest = tail.trim_start_matches(' ');
        }

        let (command, mut rest) = rest.split_once(' ').unwrap_or((rest, ""));
        if command.is_empty() {
            return Err(MessageParseError::EmptyMessage);
        }
        if !command.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(MessageParseError::InvalidCommand(command.to_string()));
        }

        let mut params = Vec::new();
        let mut trailing = None;
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(text) = rest.strip_prefix(':') {
                trailing = Some(text.to_string());
                break;
            }
            let (param, tail) = rest.split_once(' ').unwrap_or((rest, ""));
            params.push(param.to_string());
            rest = tail;
        }

        Ok(Self {
            tags,
            prefix,
            command: command.to_string(),
            params,
            trailing,
        })
    }

    /// Whether this message carries the given command (ASCII case-insensitive).
    pub fn is_command(&self, command: &str) -> bool {
        self.command.eq_ignore_ascii_case(command)
    }

    /// The numeric reply this message carries, if it is one we know.
    pub fn response(&self) -> Option<Response> {
        self.command.parse().ok()
    }

    /// The final parameter: trailing if present, else the last middle one.
    pub fn last_param(&self) -> Option<&str> {
        self.trailing
            .as_deref()
            .or_else(|| self.params.last().map(String::as_str))
    }

    /// Iterate over every parameter, trailing last.
    pub fn all_params(&self) -> impl Iterator<Item = &str> {
        self.params
            .iter()
            .map(String::as_str)
            .chain(self.trailing.as_deref())
    }
}

fn parse_tags(raw: &str) -> Vec<Tag> {
    raw.split(';')
        .filter(|t| !t.is_empty())
        .map(|t| match t.split_once('=') {
            Some((k, v)) => Tag(k.to_string(), Some(v.to_string())),
            None => Tag(t.to_string(), None),
        })
        .collect()
}

fn needs_trailing(param: &str) -> bool {
    param.is_empty() || param.starts_with(':') || param.contains(' ')
}

impl FromStr for Message {
    type Err = MessageParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Message::parse(s)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(tags) = self.tags.as_ref().filter(|t| !t.is_empty()) {
            f.write_str("@")?;
            for (i, Tag(key, value)) in tags.iter().enumerate() {
                if i > 0 {
                    f.write_str(";")?;
                }
                f.write_str(key)?;
                if let Some(value) = value {
                    write!(f, "={value}")?;
                }
            }
            f.write_str(" ")?;
        }
        if let Some(prefix) = &self.prefix {
            write!(f, ":{prefix} ")?;
        }
        f.write_str(&self.command)?;

        let count = self.params.len();
        for (i, param) in self.params.iter().enumerate() {
            let last = i + 1 == count && self.trailing.is_none();
            if last && needs_trailing(param) {
                write!(f, " :{param}")?;
            } else {
                write!(f, " {param}")?;
            }
        }
        if let Some(trailing) = &self.trailing {
            write!(f, " :{trailing}")?;
        }
        Ok(())
    }
}
