//! Multi-tenant connection pool.
//!
//! One supervised [`Upstream`] per distinct [`ServerIdentity`]; any number
//! of [`LeaseToken`]s may point at it. Both maps live behind a single lock.
//! Dialing a new identity happens outside that lock, serialized per identity
//! so two callers registering the same new identity cannot both dial.

use crate::metrics;
use crate::upstream::{
    ConnectError, Connector, LinkSettings, ServerIdentity, TransportError, Upstream,
    ValidationError,
};
use parking_lot::Mutex;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use slirc_proto::Message;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Opaque handle a caller holds for one lease on a pooled upstream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaseToken(String);

impl LeaseToken {
    /// 16 bytes from the OS CSPRNG as 32 lowercase hex characters.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LeaseToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for LeaseToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for LeaseToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("invalid identity: {0}")]
    InvalidIdentity(#[from] ValidationError),
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error("unknown token")]
    UnknownToken,
    #[error("send failed: {0}")]
    Send(#[from] TransportError),
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PoolStats {
    pub connections: usize,
    pub leases: usize,
}

type Gate = Arc<tokio::sync::Mutex<()>>;

#[derive(Default)]
struct PoolState {
    conns: HashMap<ServerIdentity, Arc<Upstream>>,
    tokens: HashMap<LeaseToken, Arc<Upstream>>,
    /// Identities with a dial in progress.
    pending: HashMap<ServerIdentity, Gate>,
}

pub struct ConnectionPool {
    connector: Arc<dyn Connector>,
    settings: LinkSettings,
    state: Mutex<PoolState>,
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// Holds a per-identity gate; removes it from `pending` once unused.
struct PendingGate<'a> {
    pool: &'a ConnectionPool,
    identity: &'a ServerIdentity,
    gate: Gate,
}

impl Drop for PendingGate<'_> {
    fn drop(&mut self) {
        let mut state = self.pool.state.lock();
        // Gates are only cloned under this lock: the map's copy plus ours
        // means nobody else is queued.
        if Arc::strong_count(&self.gate) <= 2 {
            state.pending.remove(self.identity);
        }
    }
}

impl ConnectionPool {
    pub fn new(connector: Arc<dyn Connector>, settings: LinkSettings) -> Self {
        Self {
            connector,
            settings,
            state: Mutex::new(PoolState::default()),
        }
    }

    /// Lease a connection for `identity`, dialing only if no live one exists.
    ///
    /// A failed dial leaves the pool untouched.
    pub async fn connect(&self, identity: ServerIdentity) -> Result<LeaseToken, PoolError> {
        identity.validate()?;
        let identity = identity.normalized();

        if let Some(token) = self.lease_existing(&identity) {
            return Ok(token);
        }

        let pending = self.gate(&identity);
        let _held = pending.gate.lock().await;

        // Someone else may have finished dialing while we queued.
        if let Some(token) = self.lease_existing(&identity) {
            return Ok(token);
        }
        self.create(&identity).await
    }

    /// Drop a lease. The upstream keeps running even with no leases left.
    pub fn unregister(&self, token: &LeaseToken) -> Result<(), PoolError> {
        let mut state = self.state.lock();
        let upstream = state.tokens.remove(token).ok_or(PoolError::UnknownToken)?;
        metrics::set_leases(state.tokens.len());

        let remaining = state
            .tokens
            .values()
            .filter(|u| Arc::ptr_eq(u, &upstream))
            .count();
        if remaining == 0 {
            // TODO: close upstreams whose last lease is gone once a shutdown
            // path for Upstream exists.
            warn!(
                addr = %upstream.identity().address(),
                nick = %upstream.identity().nickname,
                "Last lease released; upstream stays connected"
            );
        } else {
            debug!(remaining, "Lease released");
        }
        Ok(())
    }

    /// The upstream a token refers to.
    pub fn upstream(&self, token: &LeaseToken) -> Option<Arc<Upstream>> {
        self.state.lock().tokens.get(token).cloned()
    }

    /// Write a message through the token's upstream.
    pub async fn send(&self, token: &LeaseToken, msg: &Message) -> Result<(), PoolError> {
        let upstream = self.upstream(token).ok_or(PoolError::UnknownToken)?;
        upstream.send(msg).await?;
        Ok(())
    }

    /// Follow the message stream of the token's upstream.
    pub fn subscribe(&self, token: &LeaseToken) -> Result<broadcast::Receiver<Message>, PoolError> {
        self.upstream(token)
            .map(|u| u.subscribe())
            .ok_or(PoolError::UnknownToken)
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            connections: state.conns.values().filter(|u| !u.is_closed()).count(),
            leases: state.tokens.len(),
        }
    }

    fn lease_existing(&self, identity: &ServerIdentity) -> Option<LeaseToken> {
        let mut state = self.state.lock();
        let upstream = state
            .conns
            .get(identity)
            .filter(|u| !u.is_closed())
            .cloned()?;

        let token = LeaseToken::generate();
        state.tokens.insert(token.clone(), upstream);
        metrics::set_leases(state.tokens.len());
        debug!(addr = %identity.address(), "Reusing pooled upstream");
        Some(token)
    }

    fn gate<'a>(&'a self, identity: &'a ServerIdentity) -> PendingGate<'a> {
        let gate = Arc::clone(
            self.state
                .lock()
                .pending
                .entry(identity.clone())
                .or_default(),
        );
        PendingGate {
            pool: self,
            identity,
            gate,
        }
    }

    async fn create(&self, identity: &ServerIdentity) -> Result<LeaseToken, PoolError> {
        info!(addr = %identity.address(), nick = %identity.nickname, "Opening upstream");
        let transport = self
            .connector
            .connect(identity, &self.settings.handshake)
            .await?;
        let upstream = Upstream::spawn(
            identity.clone(),
            transport,
            Arc::clone(&self.connector),
            self.settings,
        );

        let token = LeaseToken::generate();
        let mut state = self.state.lock();
        if let Some(old) = state.conns.insert(identity.clone(), Arc::clone(&upstream)) {
            debug!(status = ?old.status(), "Replaced closed upstream");
        }
        state.tokens.insert(token.clone(), upstream);
        metrics::set_leases(state.tokens.len());
        Ok(token)
    }
}
