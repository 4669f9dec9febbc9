//! Upstream server identity: the pool's deduplication key.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Everything that determines one logical upstream connection.
///
/// Two identities with identical fields are the same connection target, so
/// this type is hashed and compared structurally and used directly as a
/// map key. It is never mutated once a connection exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerIdentity {
    /// Host to dial.
    pub host: String,
    /// TCP port to dial.
    pub port: u16,
    /// Server password sent with PASS. Empty means none.
    pub password: Option<String>,
    /// Desired nickname. The server may force a derived one.
    pub nickname: String,
    /// Real name, sent in USER.
    pub realname: String,
    /// Human-readable name of the registering application.
    pub appname: String,
    /// Where the registrant wants messages delivered.
    pub messageurl: String,
}

/// A required identity field was missing or empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("missing required field: {0}")]
pub struct ValidationError(pub &'static str);

impl ServerIdentity {
    /// Check that every mandatory field is present. Only the password may
    /// be left out.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let required = [
            ("host", self.host.is_empty()),
            ("port", self.port == 0),
            ("nickname", self.nickname.is_empty()),
            ("realname", self.realname.is_empty()),
            ("appname", self.appname.is_empty()),
            ("messageurl", self.messageurl.is_empty()),
        ];
        match required.into_iter().find(|(_, missing)| *missing) {
            Some((field, _)) => Err(ValidationError(field)),
            None => Ok(()),
        }
    }

    /// `host:port`, as handed to the dialer.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The password to send, treating an empty one as absent.
    pub fn server_password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }

    /// Canonical form used as a pool key: `Some("")` collapses to `None`.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.server_password().is_none() {
            self.password = None;
        }
        self
    }
}
