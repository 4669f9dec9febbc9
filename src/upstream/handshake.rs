//! Upstream registration: PASS, NICK, USER and the wait for the welcome.
//!
//! [`HandshakeMachine`] is sans-IO: it consumes parsed messages and yields
//! [`HandshakeAction`]s. [`perform`] drives it over a reader/writer pair
//! under a single deadline.

use super::HandshakeSettings;
use super::identity::ServerIdentity;
use super::io::{MessageReader, MessageWriter, TransportError};
use crate::metrics;
use rand::Rng;
use slirc_proto::{Message, Response};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Longest nickname the derived form may produce.
const MAX_NICK_LEN: usize = 9;

/// Where the registration exchange currently stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum HandshakeState {
    /// Socket open, nothing sent yet.
    #[default]
    Dialing,
    PassSent,
    NickSent,
    UserSent,
    /// NICK/USER are out, waiting for 001.
    AwaitingWelcome,
    /// 001 received; the session is registered.
    Ready,
}

/// Why a handshake attempt failed.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("transport error during handshake: {0}")]
    Transport(#[from] TransportError),
    #[error("gave up after {attempts} nickname collisions")]
    NicknameExhausted { attempts: u32 },
    #[error("server error: {0}")]
    ServerError(String),
}

impl HandshakeError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(e) if e.is_timeout() => "timeout",
            Self::Transport(_) => "transport",
            Self::NicknameExhausted { .. } => "nick_exhausted",
            Self::ServerError(_) => "server_error",
        }
    }
}

/// Output of the state machine.
#[derive(Debug)]
pub enum HandshakeAction {
    /// Write this message to the server.
    Send(Message),
    /// The welcome arrived; registration is complete.
    Complete,
    /// Registration cannot succeed on this connection.
    Error(HandshakeError),
}

/// Sans-IO registration state machine.
#[derive(Clone, Debug)]
pub struct HandshakeMachine {
    nickname: String,
    realname: String,
    password: Option<String>,
    max_nick_attempts: u32,
    state: HandshakeState,
    current_nick: String,
    collisions: u32,
}

impl HandshakeMachine {
    #[must_use]
    pub fn new(identity: &ServerIdentity, max_nick_attempts: u32) -> Self {
        Self {
            nickname: identity.nickname.clone(),
            realname: identity.realname.clone(),
            password: identity.server_password().map(str::to_owned),
            max_nick_attempts,
            state: HandshakeState::Dialing,
            current_nick: identity.nickname.clone(),
            collisions: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// The nickname most recently sent; final once [`HandshakeState::Ready`].
    #[must_use]
    pub fn current_nick(&self) -> &str {
        &self.current_nick
    }

    /// Begin registration. Returns PASS (only with a password), NICK and USER.
    #[must_use]
    pub fn start(&mut self) -> Vec<HandshakeAction> {
        let mut actions = Vec::with_capacity(3);

        if let Some(pass) = &self.password {
            self.state = HandshakeState::PassSent;
            actions.push(HandshakeAction::Send(Message::pass(pass.clone())));
        }

        self.state = HandshakeState::NickSent;
        actions.push(HandshakeAction::Send(Message::nick(self.current_nick.clone())));

        self.state = HandshakeState::UserSent;
        actions.push(HandshakeAction::Send(Message::user(
            self.nickname.clone(),
            self.realname.clone(),
        )));

        self.state = HandshakeState::AwaitingWelcome;
        actions
    }

    /// Feed a message received from the server.
    #[must_use]
    pub fn feed(&mut self, msg: &Message) -> Vec<HandshakeAction> {
        if self.state != HandshakeState::AwaitingWelcome {
            return vec![];
        }

        match msg.response() {
            Some(Response::RPL_WELCOME) => {
                self.state = HandshakeState::Ready;
                return vec![HandshakeAction::Complete];
            }
            Some(Response::ERR_NICKNAMEINUSE) => return self.on_collision(),
            None => {}
        }

        if msg.is_command("PING") {
            let token = msg.last_param().unwrap_or_default();
            vec![HandshakeAction::Send(Message::pong(token))]
        } else if msg.is_command("ERROR") {
            let reason = msg.last_param().unwrap_or("connection closed").to_string();
            vec![HandshakeAction::Error(HandshakeError::ServerError(reason))]
        } else {
            vec![]
        }
    }

    fn on_collision(&mut self) -> Vec<HandshakeAction> {
        if self.collisions >= self.max_nick_attempts {
            return vec![HandshakeAction::Error(HandshakeError::NicknameExhausted {
                attempts: self.collisions,
            })];
        }
        self.collisions += 1;
        self.current_nick = random_nick(&self.nickname);
        debug!(nick = %self.current_nick, attempt = self.collisions, "Nickname in use, retrying");
        vec![HandshakeAction::Send(Message::nick(self.current_nick.clone()))]
    }
}

/// Derive a fallback nickname: `base` cut to six characters, `_`, two digits.
pub fn random_nick(base: &str) -> String {
    let short: String = base.chars().take(MAX_NICK_LEN - 3).collect();
    let suffix = rand::thread_rng().gen_range(0..100u8);
    format!("{short}_{suffix:02}")
}

/// Run registration over an already-connected reader/writer pair.
///
/// The whole exchange shares one deadline, `settings.timeout` from now.
/// Returns the nickname the server accepted.
pub async fn perform(
    reader: &mut dyn MessageReader,
    writer: &mut dyn MessageWriter,
    identity: &ServerIdentity,
    settings: &HandshakeSettings,
) -> Result<String, HandshakeError> {
    let deadline = Instant::now() + settings.timeout;
    let result = drive(reader, writer, identity, settings, deadline).await;

    match &result {
        Ok(nick) => {
            metrics::record_handshake("ok");
            info!(addr = %identity.address(), nick = %nick, "Upstream registered");
        }
        Err(e) => {
            metrics::record_handshake(e.kind());
            warn!(addr = %identity.address(), error = %e, "Upstream handshake failed");
        }
    }
    result
}

async fn drive(
    reader: &mut dyn MessageReader,
    writer: &mut dyn MessageWriter,
    identity: &ServerIdentity,
    settings: &HandshakeSettings,
    deadline: Instant,
) -> Result<String, HandshakeError> {
    let mut machine = HandshakeMachine::new(identity, settings.max_nick_attempts);
    let mut pending = machine.start();

    loop {
        for action in pending {
            match action {
                HandshakeAction::Send(msg) => writer.write_message(&msg, deadline).await?,
                HandshakeAction::Complete => return Ok(machine.current_nick().to_string()),
                HandshakeAction::Error(e) => return Err(e),
            }
        }
        let msg = reader.read_message(deadline).await?;
        pending = machine.feed(&msg);
    }
}
